//! Orchestration of one crawl run.
//!
//! A run moves through these stages:
//!
//! 1. **Fetching / Extracting**: each site's listing page is fetched and
//!    turned into candidates. Up to `concurrency` sites are in flight at
//!    once; with a concurrency of 1 sites go strictly one after another.
//! 2. **Aggregating**: a single collector stamps each site's candidates and
//!    drops any `(link, title)` pair already seen earlier in the run.
//! 3. **Deduping**: what is left is checked against the history.
//! 4. **Persisting**: the new records are merged into the history on disk.
//!
//! A site whose fetch fails is skipped for this run. A failed save is logged
//! and the run still returns its new records.

use crate::error::FetchError;
use crate::extractor;
use crate::fetcher::Fetch;
use crate::models::{CandidateRecord, Identity, Record, RunReport, SiteProfile};
use crate::store::RecordStore;
use crate::utils::now_stamp;
use futures::stream::{self, StreamExt};
use std::collections::HashSet;
use tracing::{debug, error, info, instrument, warn};

/// Records gathered from every site in one run, before the history check.
#[derive(Debug, Default)]
pub struct Crawl {
    /// Stamped records with in-run repeats removed, in site order.
    pub records: Vec<Record>,
    /// Sites whose fetch failed.
    pub failed: Vec<String>,
}

/// Drives fetching and extraction over all sites, then hands the result to the store.
#[derive(Debug)]
pub struct Pipeline<F> {
    fetcher: F,
    concurrency: usize,
}

impl<F> Pipeline<F>
where
    F: Fetch,
{
    /// Build a pipeline that keeps at most `concurrency` fetches in flight.
    pub fn new(fetcher: F, concurrency: usize) -> Self {
        Self {
            fetcher,
            concurrency: concurrency.max(1),
        }
    }

    /// Crawl every site, merge the new records into `store`, and report.
    #[instrument(level = "info", skip_all, fields(sites = profiles.len(), concurrency = self.concurrency))]
    pub async fn run(&self, profiles: &[SiteProfile], store: &mut RecordStore) -> RunReport {
        let crawl = self.crawl(profiles).await;
        let candidates = crawl.records.len();

        let new_records = store.dedupe(&crawl.records);
        info!(candidates, new = new_records.len(), "Checked candidates against history");

        let persisted = match store.merge(&new_records) {
            Ok(_) => true,
            Err(e) => {
                error!(
                    path = %store.path().display(),
                    error = %e,
                    "Failed to persist history; new records are not saved"
                );
                false
            }
        };

        RunReport {
            new_records,
            sites_total: profiles.len(),
            sites_failed: crawl.failed,
            candidates,
            persisted,
        }
    }

    /// Fetch and extract every site, dropping records repeated within the run.
    pub async fn crawl(&self, profiles: &[SiteProfile]) -> Crawl {
        let mut results = stream::iter(profiles)
            .map(|profile| async move { (profile, self.crawl_site(profile).await) })
            .buffered(self.concurrency);

        let mut crawl = Crawl::default();
        let mut seen: HashSet<Identity> = HashSet::new();

        while let Some((profile, result)) = results.next().await {
            match result {
                Ok(candidates) if candidates.is_empty() => {
                    warn!(site = %profile.name, url = %profile.url, "No records extracted");
                }
                Ok(candidates) => {
                    let fetched_at = now_stamp();
                    let extracted = candidates.len();
                    let before = crawl.records.len();
                    for candidate in candidates {
                        let record = candidate.stamp(&fetched_at);
                        if seen.insert(record.identity()) {
                            crawl.records.push(record);
                        } else {
                            debug!(site = %profile.name, title = %record.title, "Repeated within run; dropped");
                        }
                    }
                    info!(
                        site = %profile.name,
                        extracted,
                        kept = crawl.records.len() - before,
                        "Crawled site"
                    );
                }
                Err(e) => {
                    error!(site = %profile.name, error = %e, "Skipping site for this run");
                    crawl.failed.push(profile.name.clone());
                }
            }
        }

        crawl
    }

    #[instrument(level = "info", skip_all, fields(site = %profile.name))]
    async fn crawl_site(&self, profile: &SiteProfile) -> Result<Vec<CandidateRecord>, FetchError> {
        let document = self.fetcher.fetch(profile.url.as_str()).await?;
        let html = document.parse();
        Ok(extractor::extract(&html, profile))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetcher::{RawDocument, RetryFetch, RetryPolicy};
    use crate::profiles::parse_entry;
    use serde_json::json;
    use std::collections::HashMap;

    /// Serves pages from memory; unknown URLs answer 404.
    #[derive(Default)]
    struct MemoryFetcher {
        pages: HashMap<String, String>,
    }

    impl MemoryFetcher {
        fn with_page(mut self, url: &str, body: &str) -> Self {
            self.pages.insert(url.to_string(), body.to_string());
            self
        }
    }

    impl Fetch for MemoryFetcher {
        async fn fetch(&self, url: &str) -> Result<RawDocument, FetchError> {
            match self.pages.get(url) {
                Some(body) => Ok(RawDocument::decode(url, body.as_bytes().to_vec(), Some("utf-8"))),
                None => Err(FetchError::Status {
                    url: url.to_string(),
                    status: 404,
                }),
            }
        }
    }

    fn site(name: &str, url: &str) -> SiteProfile {
        parse_entry(
            0,
            json!({
                "task_name": name,
                "task_url": url,
                "title_selector": "li a",
                "href_selector": "li a",
                "time_selector": "li span"
            }),
        )
        .unwrap()
    }

    const X_PAGE: &str = r#"<ul>
        <li><a href="/a">A</a><span>2024-01-02</span></li>
        <li><a href="/b">B</a><span>2024-01-01</span></li>
    </ul>"#;

    fn titles(records: &[Record]) -> Vec<&str> {
        records.iter().map(|r| r.title.as_str()).collect()
    }

    #[tokio::test]
    async fn test_new_records_then_nothing_on_rerun() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data.json");
        let profiles = vec![site("X", "http://x.test/list")];
        let pipeline = Pipeline::new(
            MemoryFetcher::default().with_page("http://x.test/list", X_PAGE),
            1,
        );

        let mut store = RecordStore::open(&path);
        let report = pipeline.run(&profiles, &mut store).await;

        assert_eq!(titles(&report.new_records), vec!["A", "B"]);
        assert_eq!(report.new_records[0].link, "http://x.test/a");
        assert_eq!(report.new_records[0].site_name, "X");
        assert!(!report.new_records[0].fetched_at.is_empty());
        assert!(report.persisted);
        assert!(report.sites_failed.is_empty());

        let mut store = RecordStore::open(&path);
        assert_eq!(store.records().len(), 2);
        let report = pipeline.run(&profiles, &mut store).await;
        assert!(report.new_records.is_empty());
        assert_eq!(report.candidates, 2);
        assert_eq!(store.records().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unreachable_site_does_not_stop_run() {
        let dir = tempfile::tempdir().unwrap();
        let profiles = vec![
            site("Down", "http://down.test/list"),
            site("X", "http://x.test/list"),
        ];
        let fetcher = RetryFetch::new(
            MemoryFetcher::default().with_page("http://x.test/list", X_PAGE),
            RetryPolicy::default(),
        );
        let pipeline = Pipeline::new(fetcher, 1);

        let mut store = RecordStore::open(dir.path().join("data.json"));
        let report = pipeline.run(&profiles, &mut store).await;

        assert_eq!(report.sites_total, 2);
        assert_eq!(report.sites_failed, vec!["Down".to_string()]);
        assert_eq!(titles(&report.new_records), vec!["A", "B"]);
        assert!(report.new_records.iter().all(|r| r.site_name == "X"));
    }

    #[tokio::test]
    async fn test_cross_posted_article_counted_once() {
        let dir = tempfile::tempdir().unwrap();
        let mirror = r#"<ul>
            <li><a href="http://x.test/a">A</a><span>2024-01-02</span></li>
            <li><a href="/c">C</a><span>2024-01-03</span></li>
        </ul>"#;
        let profiles = vec![
            site("X", "http://x.test/list"),
            site("Mirror", "http://mirror.test/list"),
        ];
        let fetcher = MemoryFetcher::default()
            .with_page("http://x.test/list", X_PAGE)
            .with_page("http://mirror.test/list", mirror);
        let pipeline = Pipeline::new(fetcher, 4);

        let mut store = RecordStore::open(dir.path().join("data.json"));
        let report = pipeline.run(&profiles, &mut store).await;

        assert_eq!(report.candidates, 3);
        assert_eq!(titles(&report.new_records), vec!["C", "A", "B"]);
        let a = &report.new_records[1];
        assert_eq!(a.site_name, "X");
    }

    #[tokio::test]
    async fn test_failed_persist_still_returns_records() {
        let dir = tempfile::tempdir().unwrap();
        let profiles = vec![site("X", "http://x.test/list")];
        let pipeline = Pipeline::new(
            MemoryFetcher::default().with_page("http://x.test/list", X_PAGE),
            1,
        );

        let mut store = RecordStore::open(dir.path().join("no-such-dir").join("data.json"));
        let report = pipeline.run(&profiles, &mut store).await;

        assert!(!report.persisted);
        assert_eq!(report.new_records.len(), 2);
        assert!(store.records().is_empty());
    }

    #[tokio::test]
    async fn test_no_sites_no_records() {
        let dir = tempfile::tempdir().unwrap();
        let pipeline = Pipeline::new(MemoryFetcher::default(), 1);

        let mut store = RecordStore::open(dir.path().join("data.json"));
        let report = pipeline.run(&[], &mut store).await;

        assert_eq!(report.sites_total, 0);
        assert!(report.new_records.is_empty());
        assert!(report.persisted);
    }
}
