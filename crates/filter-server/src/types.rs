use std::fmt;

use serde::{Deserialize, Serialize};

/// Field a filter applies to. The numeric codes are what the table stores.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterMode {
    Title,
    Uploader,
    Tag,
    TagNamespace,
    Commenter,
    Comment,
}

impl FilterMode {
    pub const ALL: [FilterMode; 6] = [
        FilterMode::Title,
        FilterMode::Uploader,
        FilterMode::Tag,
        FilterMode::TagNamespace,
        FilterMode::Commenter,
        FilterMode::Comment,
    ];

    pub fn code(self) -> i64 {
        match self {
            FilterMode::Title => 0,
            FilterMode::Uploader => 1,
            FilterMode::Tag => 2,
            FilterMode::TagNamespace => 3,
            FilterMode::Commenter => 4,
            FilterMode::Comment => 5,
        }
    }

    pub fn from_code(code: i64) -> Option<Self> {
        Self::ALL.into_iter().find(|mode| mode.code() == code)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            FilterMode::Title => "title",
            FilterMode::Uploader => "uploader",
            FilterMode::Tag => "tag",
            FilterMode::TagNamespace => "tag_namespace",
            FilterMode::Commenter => "commenter",
            FilterMode::Comment => "comment",
        }
    }

    /// Title, tag and namespace filters compare case-insensitively, so their
    /// text is stored lowercased. The other modes keep the text verbatim.
    pub fn normalize(self, text: &str) -> String {
        match self {
            FilterMode::Title | FilterMode::Tag | FilterMode::TagNamespace => text.to_lowercase(),
            FilterMode::Uploader | FilterMode::Commenter | FilterMode::Comment => text.to_string(),
        }
    }
}

impl fmt::Display for FilterMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Filter {
    pub id: i64,
    pub mode: FilterMode,
    pub text: String,
    pub enabled: bool,
}

/// A filter that has not been stored yet, as submitted or imported.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewFilter {
    pub mode: FilterMode,
    pub text: String,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_enabled() -> bool {
    true
}

impl From<Filter> for NewFilter {
    fn from(filter: Filter) -> Self {
        Self {
            mode: filter.mode,
            text: filter.text,
            enabled: filter.enabled,
        }
    }
}

/// The gallery fields filters look at.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GalleryInfo {
    pub title: Option<String>,
    pub uploader: Option<String>,
    /// `namespace:name` or bare `name` strings.
    pub simple_tags: Option<Vec<String>>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ImportReport {
    pub added: usize,
    pub duplicates: usize,
    pub rejected: usize,
}
