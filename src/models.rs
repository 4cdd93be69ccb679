//! Data models shared by every stage of the crawl.
//!
//! This module defines the core data structures used throughout the application:
//! - [`SiteProfile`]: How to fetch and read one site's listing page
//! - [`ExtractionRule`]: The two supported extraction strategies, compiled at load time
//! - [`CandidateRecord`]: An entry pulled out of a page, not yet checked against history
//! - [`Record`]: The canonical, persisted article unit
//!
//! Record identity is the `(link, title)` pair; see [`Record::identity`].

use scraper::Selector;
use serde::{Deserialize, Serialize};
use url::Url;

/// A site definition as loaded from the profile file.
///
/// Profiles are created once by [`crate::profiles::load`] and never mutated
/// afterwards. The extraction rule is compiled during loading, so a profile
/// that exists is always usable by the extractor.
#[derive(Debug, Clone)]
pub struct SiteProfile {
    /// Display name of the site (e.g. "Example News").
    pub name: String,
    /// The listing page to crawl. Relative article links resolve against it.
    pub url: Url,
    /// Icon reference shown next to the site's entries. Informational only.
    pub icon: String,
    /// The compiled extraction strategy for this site.
    pub rule: ExtractionRule,
}

/// The closed set of extraction strategies.
///
/// Which variant a profile gets is decided by the shape of its entry in the
/// profile file, never by probing at extraction time.
#[derive(Debug, Clone)]
pub enum ExtractionRule {
    /// Three independent selectors whose matches are zipped by position.
    Selector {
        title: Selector,
        link: Selector,
        time: Selector,
    },
    /// A per-article block selector with nested title-anchor and time lookups.
    Container {
        container: Selector,
        title: Selector,
        time: Selector,
    },
}

impl ExtractionRule {
    /// Short name of the strategy, for logs.
    pub fn mode(&self) -> &'static str {
        match self {
            ExtractionRule::Selector { .. } => "selector",
            ExtractionRule::Container { .. } => "container",
        }
    }
}

/// A record as produced by the extractor, before the pipeline stamps it.
///
/// This is a [`Record`] minus `fetched_at`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CandidateRecord {
    pub site_name: String,
    pub site_url: String,
    pub site_icon: String,
    pub title: String,
    pub published_time: String,
    pub link: String,
}

impl CandidateRecord {
    /// Turn the candidate into a full record fetched at `fetched_at`.
    pub fn stamp(self, fetched_at: &str) -> Record {
        Record {
            site_name: self.site_name,
            site_url: self.site_url,
            site_icon: self.site_icon,
            title: self.title,
            published_time: self.published_time,
            link: self.link,
            fetched_at: fetched_at.to_string(),
        }
    }
}

/// The canonical article unit, as stored in the history file.
///
/// # Serialization
///
/// Records are written with the field names below. The legacy names used by
/// older history files (`task_name`, `task_url`, `task_icon`, `time`, `href`,
/// `crawling_time`) are accepted when reading.
///
/// # Ordering
///
/// `published_time` is kept exactly as the site printed it. Sorting compares
/// these raw strings, which only orders correctly when every site uses the
/// same time format.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct Record {
    /// Name of the site the record came from.
    #[serde(alias = "task_name")]
    pub site_name: String,
    /// The site's listing URL.
    #[serde(alias = "task_url")]
    pub site_url: String,
    /// The site's icon reference.
    #[serde(alias = "task_icon", default)]
    pub site_icon: String,
    /// Article title, trimmed.
    pub title: String,
    /// Publish time as raw page text.
    #[serde(alias = "time")]
    pub published_time: String,
    /// Absolute article URL.
    #[serde(alias = "href")]
    pub link: String,
    /// Local time the record was crawled, `YYYY-MM-DD HH:MM:SS`.
    #[serde(alias = "crawling_time")]
    pub fetched_at: String,
}

/// The deduplication key of a record.
pub type Identity = (String, String);

impl Record {
    /// The `(link, title)` pair that identifies this record.
    pub fn identity(&self) -> Identity {
        (self.link.clone(), self.title.clone())
    }
}

/// Summary of one pipeline run, handed to the notifier and renderer glue.
#[derive(Debug, Default)]
pub struct RunReport {
    /// Records not seen before this run, newest first.
    pub new_records: Vec<Record>,
    /// Number of site profiles the run attempted.
    pub sites_total: usize,
    /// Names of sites whose fetch failed after all retries.
    pub sites_failed: Vec<String>,
    /// Records left after in-run deduplication, before the history check.
    pub candidates: usize,
    /// Whether the merged history reached disk.
    pub persisted: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidate() -> CandidateRecord {
        CandidateRecord {
            site_name: "X".to_string(),
            site_url: "http://x.test/list".to_string(),
            site_icon: String::new(),
            title: "A".to_string(),
            published_time: "2024-01-02".to_string(),
            link: "http://x.test/a".to_string(),
        }
    }

    #[test]
    fn test_stamp_keeps_fields() {
        let record = candidate().stamp("2024-01-03 10:00:00");
        assert_eq!(record.title, "A");
        assert_eq!(record.link, "http://x.test/a");
        assert_eq!(record.fetched_at, "2024-01-03 10:00:00");
        assert_eq!(
            record.identity(),
            ("http://x.test/a".to_string(), "A".to_string())
        );
    }

    #[test]
    fn test_record_reads_legacy_keys() {
        let json = r#"{
            "task_name": "X",
            "task_url": "http://x.test/list",
            "task_icon": "x.png",
            "crawling_time": "2024-01-03 10:00:00",
            "title": "A",
            "time": "2024-01-02",
            "href": "http://x.test/a"
        }"#;

        let record: Record = serde_json::from_str(json).unwrap();
        assert_eq!(record.site_name, "X");
        assert_eq!(record.site_icon, "x.png");
        assert_eq!(record.published_time, "2024-01-02");
        assert_eq!(record.link, "http://x.test/a");
    }

    #[test]
    fn test_record_writes_current_keys() {
        let record = candidate().stamp("2024-01-03 10:00:00");
        let json = serde_json::to_string(&record).unwrap();
        assert!(json.contains("\"published_time\""));
        assert!(json.contains("\"fetched_at\""));
        assert!(!json.contains("\"href\""));
    }
}
