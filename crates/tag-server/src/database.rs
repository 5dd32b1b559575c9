//! Packed, sorted tag → translation table.
//!
//! The whole table is one UTF-8 buffer laid out as
//! `\n tag \r translation \n tag \r translation \n ...`, sorted byte-wise by
//! tag. Lookups binary search the buffer directly, walking back to the
//! record boundary around each probe, so no per-record index is allocated.
//!
//! On disk the buffer is prefixed with its length as a big-endian `u32`.

use std::{
    cmp::Ordering,
    collections::{BTreeMap, HashSet},
    io::{Read, Write},
};

use anyhow::{Context, Result, anyhow, bail};
use serde::Serialize;
use tracing::warn;

use crate::namespace::{
    NAMESPACE_GROUP_PREFIX, SEARCH_OPERATORS, lookup_key, namespace_to_prefix,
};

const RECORD_SEPARATOR: u8 = b'\n';
const FIELD_SEPARATOR: u8 = b'\r';

pub const MAX_SUGGESTIONS: usize = 20;
const MAX_PACKED_BYTES: u32 = 256 * 1024 * 1024;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct Suggestion {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub translation: Option<String>,
    pub tag: String,
}

#[derive(Debug)]
pub struct TagDatabase {
    name: String,
    buffer: String,
    len: usize,
}

impl TagDatabase {
    /// Adopts an already packed buffer after checking its layout and order.
    pub fn from_packed(name: impl Into<String>, bytes: Vec<u8>) -> Result<Self> {
        let buffer =
            String::from_utf8(bytes).map_err(|e| anyhow!("Packed tags are not UTF-8: {e}"))?;
        let len = validate_packed(buffer.as_bytes())?;
        Ok(Self {
            name: name.into(),
            buffer,
            len,
        })
    }

    /// Reads the length-prefixed on-disk form.
    pub fn from_reader<R: Read>(name: impl Into<String>, mut reader: R) -> Result<Self> {
        let mut header = [0u8; 4];
        reader
            .read_exact(&mut header)
            .context("Tag data is missing its length header")?;
        let total = u32::from_be_bytes(header);
        if total > MAX_PACKED_BYTES {
            bail!("Tag data is too large ({total} bytes, max {MAX_PACKED_BYTES})");
        }

        let mut bytes = Vec::new();
        reader
            .by_ref()
            .take(u64::from(total))
            .read_to_end(&mut bytes)?;
        if bytes.len() != total as usize {
            bail!(
                "Tag data is truncated ({} of {total} bytes)",
                bytes.len()
            );
        }

        let mut trailing = [0u8; 1];
        if reader.read(&mut trailing)? != 0 {
            bail!("Tag data has trailing bytes after {total} byte payload");
        }

        Self::from_packed(name, bytes)
    }

    /// Sorts and packs arbitrary entries. The first of several entries with
    /// the same tag wins.
    pub fn from_entries<I, K, V>(name: impl Into<String>, entries: I) -> Result<Self>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let mut entries: Vec<(String, String)> = entries
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();

        for (tag, translation) in &entries {
            if tag.is_empty() {
                bail!("Tag keys must not be empty");
            }
            if has_separator(tag) || has_separator(translation) {
                bail!("Tag entry '{}' contains a record separator", tag.escape_debug());
            }
        }

        entries.sort_by(|a, b| a.0.cmp(&b.0));
        entries.dedup_by(|later, earlier| later.0 == earlier.0);

        let capacity = entries.iter().map(|(k, v)| k.len() + v.len() + 2).sum::<usize>() + 1;
        let mut buffer = String::with_capacity(capacity);
        buffer.push(RECORD_SEPARATOR as char);
        for (tag, translation) in &entries {
            buffer.push_str(tag);
            buffer.push(FIELD_SEPARATOR as char);
            buffer.push_str(translation);
            buffer.push(RECORD_SEPARATOR as char);
        }

        Ok(Self {
            name: name.into(),
            len: entries.len(),
            buffer,
        })
    }

    /// Builds the table from grouped JSON, `{ "<prefix>": { "<name>": "<translation>" } }`.
    ///
    /// Translations are trimmed; empty ones and entries carrying separators
    /// are skipped.
    pub fn from_json<R: Read>(name: impl Into<String>, reader: R) -> Result<Self> {
        let groups: BTreeMap<String, BTreeMap<String, String>> =
            serde_json::from_reader(reader).context("Tag data is not valid grouped JSON")?;

        let mut entries = Vec::new();
        let mut skipped = 0usize;
        for (prefix, tags) in groups {
            for (tag, translation) in tags {
                let translation = translation.trim();
                let key = format!("{prefix}:{tag}");
                if tag.is_empty() || translation.is_empty() {
                    continue;
                }
                if has_separator(&key) || has_separator(translation) {
                    skipped += 1;
                    continue;
                }
                entries.push((key, translation.to_string()));
            }
        }
        if skipped > 0 {
            warn!("[Tags] Skipped {skipped} JSON entries containing line breaks");
        }

        Self::from_entries(name, entries)
    }

    /// Decodes a data file in whichever form it was published: grouped JSON
    /// when it starts with `{`, the length-prefixed packed form otherwise.
    pub fn load(name: impl Into<String>, bytes: &[u8]) -> Result<Self> {
        let starts_with_brace = bytes
            .iter()
            .find(|b| !b.is_ascii_whitespace())
            .is_some_and(|b| *b == b'{');
        if starts_with_brace {
            Self::from_json(name, bytes)
        } else {
            Self::from_reader(name, bytes)
        }
    }

    pub fn write_to<W: Write>(&self, mut writer: W) -> Result<()> {
        let total = u32::try_from(self.buffer.len())
            .map_err(|_| anyhow!("Packed tags exceed the on-disk size limit"))?;
        writer.write_all(&total.to_be_bytes())?;
        writer.write_all(self.buffer.as_bytes())?;
        Ok(())
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Records in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.buffer[1..]
            .split_terminator(RECORD_SEPARATOR as char)
            .filter_map(|record| record.split_once(FIELD_SEPARATOR as char))
    }

    /// Exact lookup of a packed key such as `f:glasses`.
    pub fn get_translation(&self, tag: &str) -> Option<&str> {
        let bytes = self.buffer.as_bytes();
        let key = tag.as_bytes();

        // Record starts in [low, high); each start directly follows a '\n'.
        let mut low = 1;
        let mut high = bytes.len();

        while low < high {
            let probe = low + (high - low) / 2;

            let mut start = probe;
            while bytes[start - 1] != RECORD_SEPARATOR {
                start -= 1;
            }
            let middle = start + find_byte(&bytes[start..], FIELD_SEPARATOR)?;
            let end = middle + find_byte(&bytes[middle..], RECORD_SEPARATOR)?;

            match key.cmp(&bytes[start..middle]) {
                Ordering::Less => high = start,
                Ordering::Greater => low = end + 1,
                Ordering::Equal => return Some(&self.buffer[middle + 1..end]),
            }
        }

        None
    }

    /// Looks up `name` under a full or abbreviated namespace. Blank
    /// translations count as missing.
    pub fn translate(&self, namespace: &str, name: &str) -> Option<&str> {
        self.get_translation(&lookup_key(namespace, name))
            .map(str::trim)
            .filter(|t| !t.is_empty())
    }

    /// Translation of a namespace name itself (`artist` → `n:artist`).
    pub fn translate_namespace(&self, namespace: &str) -> Option<&str> {
        self.translate(NAMESPACE_GROUP_PREFIX, namespace)
    }

    /// Substring suggestions over every record, ignoring case and spaces.
    ///
    /// The keyword is matched against the part of the tag after its prefix
    /// (the whole tag when the keyword itself has a colon) and, when
    /// `translate` is set, against the translation.
    pub fn suggest(&self, keyword: &str, translate: bool) -> Vec<Suggestion> {
        let whole_tag = keyword.contains(':');
        self.scan(keyword, translate, None, whole_tag)
    }

    /// Suggestions for a raw search-box query.
    ///
    /// Leading search operators are kept on every suggested tag. A
    /// `namespace:keyword` query only looks inside that namespace when the
    /// table has such a group; otherwise every group is searched with the
    /// whole keyword, and namespace names come back as `name:`.
    pub fn suggest_query(&self, query: &str, translate: bool) -> Vec<Suggestion> {
        let mut rest = query;
        for operator in SEARCH_OPERATORS {
            rest = rest.strip_prefix(operator).unwrap_or(rest);
        }
        let operator = &query[..query.len() - rest.len()];

        let scoped = rest.split_once(':').and_then(|(namespace, keyword)| {
            let prefix = namespace_to_prefix(namespace).unwrap_or(namespace);
            (!keyword.is_empty() && prefix != NAMESPACE_GROUP_PREFIX && self.has_group(prefix))
                .then(|| self.scan(keyword, translate, Some(prefix), false))
        });

        let mut results = match scoped {
            Some(results) => results,
            None => {
                let mut results = self.scan(rest, translate, None, false);
                for suggestion in &mut results {
                    if let Some(name) = suggestion
                        .tag
                        .strip_prefix(NAMESPACE_GROUP_PREFIX)
                        .and_then(|rest| rest.strip_prefix(':'))
                    {
                        suggestion.tag = format!("{name}:");
                    }
                }
                results
            }
        };

        if !operator.is_empty() {
            for suggestion in &mut results {
                suggestion.tag.insert_str(0, operator);
            }
        }
        results
    }

    fn has_group(&self, prefix: &str) -> bool {
        self.iter().any(|(tag, _)| {
            tag.strip_prefix(prefix)
                .is_some_and(|rest| rest.starts_with(':'))
        })
    }

    fn scan(
        &self,
        keyword: &str,
        translate: bool,
        group: Option<&str>,
        whole_tag: bool,
    ) -> Vec<Suggestion> {
        let needle = fold(keyword);
        if needle.is_empty() {
            return Vec::new();
        }

        let mut results = Vec::new();
        let mut seen = HashSet::new();

        for (tag, translation) in self.iter() {
            let local = match group {
                Some(prefix) => match tag
                    .strip_prefix(prefix)
                    .and_then(|rest| rest.strip_prefix(':'))
                {
                    Some(local) => local,
                    None => continue,
                },
                None if whole_tag => tag,
                None => match tag.split_once(':') {
                    Some((_, local)) if !local.is_empty() => local,
                    _ => tag,
                },
            };

            let hint = translate.then_some(translation);
            let matched = fold(local).contains(&needle)
                || hint.is_some_and(|h| fold(h).contains(&needle));
            if !matched {
                continue;
            }

            let suggestion = Suggestion {
                translation: hint.map(str::to_string),
                tag: tag.to_string(),
            };
            if seen.insert(suggestion.clone()) {
                results.push(suggestion);
            }
            if results.len() >= MAX_SUGGESTIONS {
                break;
            }
        }

        results
    }
}

fn fold(text: &str) -> String {
    text.chars()
        .filter(|c| *c != ' ')
        .flat_map(char::to_lowercase)
        .collect()
}

fn has_separator(text: &str) -> bool {
    text.bytes()
        .any(|b| b == RECORD_SEPARATOR || b == FIELD_SEPARATOR)
}

fn find_byte(haystack: &[u8], needle: u8) -> Option<usize> {
    haystack.iter().position(|b| *b == needle)
}

/// Checks framing and strict key order, returning the record count.
fn validate_packed(bytes: &[u8]) -> Result<usize> {
    if bytes.first() != Some(&RECORD_SEPARATOR) || bytes.last() != Some(&RECORD_SEPARATOR) {
        bail!("Packed tags must start and end with a record separator");
    }

    if bytes.len() == 1 {
        return Ok(0);
    }

    let mut count = 0usize;
    let mut previous: Option<&[u8]> = None;
    for record in bytes[1..bytes.len() - 1].split(|b| *b == RECORD_SEPARATOR) {
        let middle = find_byte(record, FIELD_SEPARATOR)
            .ok_or_else(|| anyhow!("Record {count} has no field separator"))?;
        let (tag, translation) = (&record[..middle], &record[middle + 1..]);
        if tag.is_empty() {
            bail!("Record {count} has an empty tag");
        }
        if translation.contains(&FIELD_SEPARATOR) {
            bail!("Record {count} has more than one field separator");
        }
        if let Some(previous) = previous
            && previous >= tag
        {
            bail!(
                "Packed tags are not strictly sorted at record {count} ('{}')",
                String::from_utf8_lossy(tag)
            );
        }
        previous = Some(tag);
        count += 1;
    }

    Ok(count)
}
