//! In-memory filter lists and the checks run against galleries and comments.
//!
//! Every check walks the enabled entries of its own list and stops at the
//! first hit. `true` means the item is filtered out.

use std::collections::HashMap;

use regex::Regex;
use tracing::{debug, warn};

use crate::types::{Filter, FilterMode, GalleryInfo};

#[derive(Debug, Default)]
pub struct FilterLists {
    title: Vec<Filter>,
    uploader: Vec<Filter>,
    tag: Vec<Filter>,
    tag_namespace: Vec<Filter>,
    commenter: Vec<Filter>,
    comment: Vec<Filter>,
    comment_patterns: HashMap<i64, Regex>,
}

impl FilterLists {
    pub fn list(&self, mode: FilterMode) -> &[Filter] {
        match mode {
            FilterMode::Title => &self.title,
            FilterMode::Uploader => &self.uploader,
            FilterMode::Tag => &self.tag,
            FilterMode::TagNamespace => &self.tag_namespace,
            FilterMode::Commenter => &self.commenter,
            FilterMode::Comment => &self.comment,
        }
    }

    fn list_mut(&mut self, mode: FilterMode) -> &mut Vec<Filter> {
        match mode {
            FilterMode::Title => &mut self.title,
            FilterMode::Uploader => &mut self.uploader,
            FilterMode::Tag => &mut self.tag,
            FilterMode::TagNamespace => &mut self.tag_namespace,
            FilterMode::Commenter => &mut self.commenter,
            FilterMode::Comment => &mut self.comment,
        }
    }

    /// Appends a stored filter to its mode's list. Comment patterns that do
    /// not compile are kept in the list but never match.
    pub fn memorize(&mut self, filter: Filter) {
        if filter.mode == FilterMode::Comment {
            match Regex::new(&filter.text) {
                Ok(regex) => {
                    self.comment_patterns.insert(filter.id, regex);
                }
                Err(e) => warn!(
                    "[Filter] Comment pattern {} does not compile, ignoring it: {e}",
                    filter.id
                ),
            }
        }
        self.list_mut(filter.mode).push(filter);
    }

    pub fn contains(&self, mode: FilterMode, text: &str) -> bool {
        self.list(mode).iter().any(|f| f.text == text)
    }

    pub fn find(&self, id: i64) -> Option<&Filter> {
        FilterMode::ALL
            .into_iter()
            .find_map(|mode| self.list(mode).iter().find(|f| f.id == id))
    }

    pub fn set_enabled(&mut self, id: i64, enabled: bool) -> Option<&Filter> {
        let mode = self.find(id)?.mode;
        let filter = self.list_mut(mode).iter_mut().find(|f| f.id == id)?;
        filter.enabled = enabled;
        Some(&*filter)
    }

    pub fn forget(&mut self, id: i64) -> Option<Filter> {
        let mode = self.find(id)?.mode;
        let index = self.list(mode).iter().position(|f| f.id == id)?;
        self.comment_patterns.remove(&id);
        Some(self.list_mut(mode).remove(index))
    }

    /// All filters ordered by id.
    pub fn all(&self) -> Vec<Filter> {
        let mut all: Vec<Filter> = FilterMode::ALL
            .into_iter()
            .flat_map(|mode| self.list(mode).iter().cloned())
            .collect();
        all.sort_by_key(|f| f.id);
        all
    }

    fn enabled(&self, mode: FilterMode) -> impl Iterator<Item = &Filter> {
        self.list(mode).iter().filter(|f| f.enabled)
    }

    /// Whether gallery tags must be fetched for the tag checks to do anything.
    pub fn need_tags(&self) -> bool {
        !self.tag.is_empty() || !self.tag_namespace.is_empty()
    }

    pub fn filter_title(&self, info: &GalleryInfo) -> bool {
        let Some(title) = info.title.as_deref() else {
            return false;
        };
        let title = title.to_lowercase();
        self.enabled(FilterMode::Title)
            .any(|f| title.contains(f.text.as_str()))
    }

    pub fn filter_uploader(&self, info: &GalleryInfo) -> bool {
        let Some(uploader) = info.uploader.as_deref() else {
            return false;
        };
        self.enabled(FilterMode::Uploader).any(|f| f.text == uploader)
    }

    pub fn filter_tag(&self, info: &GalleryInfo) -> bool {
        let Some(tags) = info.simple_tags.as_deref() else {
            return false;
        };
        tags.iter().any(|tag| {
            self.enabled(FilterMode::Tag)
                .any(|f| match_tag(tag, &f.text))
        })
    }

    pub fn filter_tag_namespace(&self, info: &GalleryInfo) -> bool {
        let Some(tags) = info.simple_tags.as_deref() else {
            return false;
        };
        tags.iter().any(|tag| {
            self.enabled(FilterMode::TagNamespace)
                .any(|f| match_tag_namespace(tag, &f.text))
        })
    }

    pub fn filter_commenter(&self, commenter: &str) -> bool {
        self.enabled(FilterMode::Commenter)
            .any(|f| f.text == commenter)
    }

    pub fn filter_comment(&self, comment: &str) -> bool {
        self.enabled(FilterMode::Comment).any(|f| {
            self.comment_patterns
                .get(&f.id)
                .is_some_and(|regex| regex.is_match(comment))
        })
    }

    /// First gallery check that hits, in title, uploader, tag, namespace order.
    pub fn filter_gallery(&self, info: &GalleryInfo) -> Option<FilterMode> {
        let hit = if self.filter_title(info) {
            FilterMode::Title
        } else if self.filter_uploader(info) {
            FilterMode::Uploader
        } else if self.filter_tag(info) {
            FilterMode::Tag
        } else if self.filter_tag_namespace(info) {
            FilterMode::TagNamespace
        } else {
            return None;
        };
        debug!("[Filter] Gallery {:?} hidden by {hit} filter", info.title);
        Some(hit)
    }

    pub fn filter_comment_entry(&self, commenter: Option<&str>, comment: &str) -> Option<FilterMode> {
        if commenter.is_some_and(|c| self.filter_commenter(c)) {
            Some(FilterMode::Commenter)
        } else if self.filter_comment(comment) {
            Some(FilterMode::Comment)
        } else {
            None
        }
    }
}

fn split_tag(tag: &str) -> (Option<&str>, &str) {
    match tag.split_once(':') {
        Some((namespace, name)) => (Some(namespace), name),
        None => (None, tag),
    }
}

/// Names must be equal; namespaces only have to agree when both sides have one.
pub fn match_tag(tag: &str, filter: &str) -> bool {
    let (tag_namespace, tag_name) = split_tag(tag);
    let (filter_namespace, filter_name) = split_tag(filter);
    match (tag_namespace, filter_namespace) {
        (Some(a), Some(b)) if a != b => false,
        _ => tag_name == filter_name,
    }
}

pub fn match_tag_namespace(tag: &str, filter: &str) -> bool {
    split_tag(tag).0 == Some(filter)
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    fn lists(filters: &[(i64, FilterMode, &str, bool)]) -> FilterLists {
        let mut lists = FilterLists::default();
        for (id, mode, text, enabled) in filters {
            lists.memorize(Filter {
                id: *id,
                mode: *mode,
                text: mode.normalize(text),
                enabled: *enabled,
            });
        }
        lists
    }

    fn gallery(title: &str, uploader: &str, tags: &[&str]) -> GalleryInfo {
        GalleryInfo {
            title: Some(title.to_string()),
            uploader: Some(uploader.to_string()),
            simple_tags: Some(tags.iter().map(|t| t.to_string()).collect()),
        }
    }

    #[test]
    fn tag_matching_respects_namespaces_only_when_both_have_one() {
        assert!(match_tag("female:glasses", "female:glasses"));
        assert!(match_tag("female:glasses", "glasses"));
        assert!(match_tag("glasses", "female:glasses"));
        assert!(!match_tag("male:glasses", "female:glasses"));
        assert!(!match_tag("female:glass", "glasses"));

        assert!(match_tag_namespace("female:glasses", "female"));
        assert!(!match_tag_namespace("glasses", "female"));
        assert!(!match_tag_namespace("female:glasses", "fem"));
    }

    #[test]
    fn title_is_a_case_insensitive_substring_match() {
        let lists = lists(&[(1, FilterMode::Title, "Spoiler", true)]);
        assert!(lists.filter_title(&gallery("Big SPOILERS inside", "", &[])));
        assert!(!lists.filter_title(&gallery("Clean", "", &[])));
        assert!(!lists.filter_title(&GalleryInfo::default()));
    }

    #[test]
    fn uploader_and_commenter_are_exact() {
        let lists = lists(&[
            (1, FilterMode::Uploader, "Bob", true),
            (2, FilterMode::Commenter, "Troll", true),
        ]);
        assert!(lists.filter_uploader(&gallery("", "Bob", &[])));
        assert!(!lists.filter_uploader(&gallery("", "bob", &[])));
        assert!(!lists.filter_uploader(&gallery("", "Bobby", &[])));
        assert!(lists.filter_commenter("Troll"));
        assert!(!lists.filter_commenter("troll"));
    }

    #[test]
    fn tag_and_namespace_filters() {
        let lists = lists(&[
            (1, FilterMode::Tag, "Female:Glasses", true),
            (2, FilterMode::TagNamespace, "Parody", true),
        ]);
        assert!(lists.need_tags());
        assert!(lists.filter_tag(&gallery("", "", &["language:english", "female:glasses"])));
        assert!(lists.filter_tag(&gallery("", "", &["glasses"])));
        assert!(!lists.filter_tag(&gallery("", "", &["male:glasses"])));
        assert!(lists.filter_tag_namespace(&gallery("", "", &["parody:original"])));
        assert!(!lists.filter_tag_namespace(&gallery("", "", &["original"])));
        assert!(!lists.filter_tag(&GalleryInfo::default()));
    }

    #[test]
    fn comment_patterns_match_anywhere_and_bad_patterns_never_match() {
        let lists = lists(&[
            (1, FilterMode::Comment, r"buy\s+now", true),
            (2, FilterMode::Comment, "(unclosed", true),
        ]);
        assert!(lists.filter_comment("please BUY now... no, buy  now!"));
        assert!(!lists.filter_comment("nothing to see"));
        assert_eq!(lists.list(FilterMode::Comment).len(), 2);
    }

    #[test]
    fn disabled_filters_stay_listed_but_do_not_match() {
        let mut lists = lists(&[(7, FilterMode::Uploader, "Bob", true)]);
        let info = gallery("", "Bob", &[]);
        assert!(lists.filter_uploader(&info));

        lists.set_enabled(7, false).expect("present");
        assert_eq!(lists.list(FilterMode::Uploader).len(), 1);
        assert!(!lists.filter_uploader(&info));

        lists.set_enabled(7, true).expect("present");
        assert!(lists.filter_uploader(&info));
    }

    #[test]
    fn gallery_and_comment_checks_report_the_first_hit() {
        let lists = lists(&[
            (1, FilterMode::Uploader, "Bob", true),
            (2, FilterMode::TagNamespace, "other", true),
            (3, FilterMode::Commenter, "Troll", true),
            (4, FilterMode::Comment, "spam", true),
        ]);
        assert_eq!(
            lists.filter_gallery(&gallery("x", "Bob", &["other:a"])),
            Some(FilterMode::Uploader)
        );
        assert_eq!(
            lists.filter_gallery(&gallery("x", "Alice", &["other:a"])),
            Some(FilterMode::TagNamespace)
        );
        assert_eq!(lists.filter_gallery(&gallery("x", "Alice", &["a"])), None);

        assert_eq!(
            lists.filter_comment_entry(Some("Troll"), "hello"),
            Some(FilterMode::Commenter)
        );
        assert_eq!(
            lists.filter_comment_entry(None, "more spam"),
            Some(FilterMode::Comment)
        );
        assert_eq!(lists.filter_comment_entry(Some("Alice"), "hello"), None);
    }

    #[test]
    fn forget_removes_from_its_list_and_all_is_ordered_by_id() {
        let mut lists = lists(&[
            (3, FilterMode::Tag, "b", true),
            (1, FilterMode::Title, "a", true),
            (2, FilterMode::Comment, "c", false),
        ]);
        assert_eq!(
            lists.all().iter().map(|f| f.id).collect::<Vec<_>>(),
            vec![1, 2, 3]
        );

        let removed = lists.forget(2).expect("present");
        assert_eq!(removed.mode, FilterMode::Comment);
        assert!(lists.list(FilterMode::Comment).is_empty());
        assert!(lists.forget(2).is_none());
        assert!(lists.find(3).is_some());
    }
}
