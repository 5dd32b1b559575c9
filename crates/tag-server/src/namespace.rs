/// Group prefix under which namespace names themselves are translated (`n:artist`).
pub const NAMESPACE_GROUP_PREFIX: &str = "n";

/// Search operators that may precede a tag in a query string. Stripped in
/// this order before suggesting and re-attached to every suggestion.
pub const SEARCH_OPERATORS: [&str; 4] = ["-", "~", "tag:", "weak:"];

pub fn namespace_to_prefix(namespace: &str) -> Option<&'static str> {
    let prefix = match namespace {
        "artist" => "a",
        "cosplayer" => "cos",
        "character" => "c",
        "female" => "f",
        "group" => "g",
        "language" => "l",
        "male" => "m",
        "mixed" => "x",
        "other" => "o",
        "parody" => "p",
        "reclass" => "r",
        _ => return None,
    };
    Some(prefix)
}

/// Splits `namespace:name` at the first colon. Bare tags have no namespace.
pub fn split_tag(tag: &str) -> (Option<&str>, &str) {
    match tag.split_once(':') {
        Some((namespace, name)) => (Some(namespace), name),
        None => (None, tag),
    }
}

/// Builds the packed lookup key for a tag shown under `namespace`.
///
/// Known namespaces are abbreviated, anything else is used verbatim so that
/// already-abbreviated input (`f:foo`) resolves to the same key.
pub fn lookup_key(namespace: &str, name: &str) -> String {
    let prefix = namespace_to_prefix(namespace).unwrap_or(namespace);
    format!("{prefix}:{name}")
}
