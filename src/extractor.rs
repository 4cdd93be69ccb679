//! Turning a parsed listing page into candidate records.
//!
//! # Selector mode
//!
//! The title, link, and time selectors are each run over the whole page and
//! the three match lists are zipped by position. When the lists differ in
//! length the extras at the end are dropped; there is no attempt to guess
//! which entries belong together.
//!
//! # Container mode
//!
//! Each match of the container selector is one article block. Inside it the
//! first title match supplies both the title text and the link, and the first
//! time match supplies the time. A block missing either is skipped.
//!
//! Neither mode fails: a page that matches nothing yields no records.

use crate::models::{CandidateRecord, ExtractionRule, SiteProfile};
use once_cell::sync::Lazy;
use scraper::{ElementRef, Html, Selector};
use tracing::{debug, instrument};
use url::Url;

static ANCHOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse("a[href]").expect("anchor selector is valid"));

/// Apply `profile`'s extraction rule to `document`.
#[instrument(level = "debug", skip_all, fields(site = %profile.name, mode = profile.rule.mode()))]
pub fn extract(document: &Html, profile: &SiteProfile) -> Vec<CandidateRecord> {
    let records = match &profile.rule {
        ExtractionRule::Selector { title, link, time } => {
            extract_by_selectors(document, profile, title, link, time)
        }
        ExtractionRule::Container {
            container,
            title,
            time,
        } => extract_by_containers(document, profile, container, title, time),
    };
    debug!(count = records.len(), "Extracted candidates");
    records
}

fn extract_by_selectors(
    document: &Html,
    profile: &SiteProfile,
    title_sel: &Selector,
    link_sel: &Selector,
    time_sel: &Selector,
) -> Vec<CandidateRecord> {
    let titles: Vec<String> = document.select(title_sel).map(element_text).collect();
    let links: Vec<Option<String>> = document
        .select(link_sel)
        .map(|el| element_href(el).and_then(|href| resolve_link(&profile.url, href)))
        .collect();
    let times: Vec<String> = document.select(time_sel).map(element_text).collect();

    if titles.len() != links.len() || titles.len() != times.len() {
        debug!(
            titles = titles.len(),
            links = links.len(),
            times = times.len(),
            "Match counts differ; trailing entries dropped"
        );
    }

    titles
        .into_iter()
        .zip(links)
        .zip(times)
        .filter_map(|((title, link), time)| Some(candidate(profile, title, link?, time)))
        .collect()
}

fn extract_by_containers(
    document: &Html,
    profile: &SiteProfile,
    container_sel: &Selector,
    title_sel: &Selector,
    time_sel: &Selector,
) -> Vec<CandidateRecord> {
    document
        .select(container_sel)
        .filter_map(|block| {
            let anchor = block.select(title_sel).next()?;
            let link = element_href(anchor).and_then(|href| resolve_link(&profile.url, href))?;
            let time = block.select(time_sel).next()?;
            Some(candidate(profile, element_text(anchor), link, element_text(time)))
        })
        .collect()
}

fn candidate(profile: &SiteProfile, title: String, link: String, time: String) -> CandidateRecord {
    CandidateRecord {
        site_name: profile.name.clone(),
        site_url: profile.url.to_string(),
        site_icon: profile.icon.clone(),
        title,
        published_time: time,
        link,
    }
}

/// Concatenated text of an element, trimmed.
fn element_text(el: ElementRef<'_>) -> String {
    el.text().collect::<String>().trim().to_string()
}

/// The element's own `href`, or that of its first descendant link.
fn element_href(el: ElementRef<'_>) -> Option<&str> {
    el.value()
        .attr("href")
        .or_else(|| el.select(&ANCHOR).find_map(|a| a.value().attr("href")))
}

/// Resolve `href` against `base`. Absolute links come back unchanged; an empty
/// or unparseable href yields nothing.
pub fn resolve_link(base: &Url, href: &str) -> Option<String> {
    let href = href.trim();
    if href.is_empty() {
        return None;
    }
    base.join(href).ok().map(String::from)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::profiles::parse_entry;
    use serde_json::json;

    fn selector_profile() -> SiteProfile {
        parse_entry(
            0,
            json!({
                "task_name": "X",
                "task_url": "http://x.test/list",
                "title_selector": "ul.news li a",
                "href_selector": "ul.news li a",
                "time_selector": "ul.news li span.date"
            }),
        )
        .unwrap()
    }

    fn container_profile() -> SiteProfile {
        parse_entry(
            0,
            json!({
                "task_name": "Y",
                "task_url": "https://y.test/blog/index.html",
                "task_icon": "y.png",
                "container_filter": { "tag": "div", "attrs": { "class": "post" } },
                "title_filter": { "tag": "h2" },
                "time_filter": { "tag": "span", "attrs": { "class": "date" } }
            }),
        )
        .unwrap()
    }

    #[test]
    fn test_selector_mode_zips_fields() {
        let html = Html::parse_document(
            r#"<ul class="news">
                <li><a href="/a"> A </a><span class="date">2024-01-02</span></li>
                <li><a href="https://elsewhere.test/b">B</a><span class="date">2024-01-01</span></li>
            </ul>"#,
        );

        let records = extract(&html, &selector_profile());

        assert_eq!(records.len(), 2);
        assert_eq!(records[0].title, "A");
        assert_eq!(records[0].link, "http://x.test/a");
        assert_eq!(records[0].published_time, "2024-01-02");
        assert_eq!(records[0].site_name, "X");
        assert_eq!(records[0].site_url, "http://x.test/list");
        assert_eq!(records[1].link, "https://elsewhere.test/b");
    }

    #[test]
    fn test_selector_mode_truncates_to_shortest_list() {
        let html = Html::parse_document(
            r#"<ul class="news">
                <li><a href="/a">A</a><span class="date">2024-01-03</span></li>
                <li><a href="/b">B</a><span class="date">2024-01-02</span></li>
                <li><a href="/c">C</a></li>
            </ul>"#,
        );

        let records = extract(&html, &selector_profile());

        let titles: Vec<_> = records.iter().map(|r| r.title.as_str()).collect();
        assert_eq!(titles, vec!["A", "B"]);
    }

    #[test]
    fn test_selector_mode_skips_index_without_link() {
        let html = Html::parse_document(
            r#"<ul class="news">
                <li><a>A</a><span class="date">2024-01-03</span></li>
                <li><a href="/b">B</a><span class="date">2024-01-02</span></li>
            </ul>"#,
        );

        let records = extract(&html, &selector_profile());

        assert_eq!(records.len(), 1);
        assert_eq!(records[0].title, "B");
        assert_eq!(records[0].published_time, "2024-01-02");
    }

    #[test]
    fn test_link_read_from_descendant_anchor() {
        let profile = parse_entry(
            0,
            json!({
                "task_name": "X",
                "task_url": "http://x.test/list/",
                "title_selector": "li .t",
                "href_selector": "li",
                "time_selector": "li .d"
            }),
        )
        .unwrap();
        let html = Html::parse_document(
            r#"<ul><li><a class="t" href="item/1">One</a><em class="d">today</em></li></ul>"#,
        );

        let records = extract(&html, &profile);

        assert_eq!(records.len(), 1);
        assert_eq!(records[0].link, "http://x.test/list/item/1");
    }

    #[test]
    fn test_container_mode_skips_incomplete_blocks() {
        let html = Html::parse_document(
            r#"<div class="post featured">
                 <h2><a href="../posts/1.html">First</a></h2><span class="date small">2024-02-01</span>
               </div>
               <div class="post">
                 <h2><a href="/posts/2.html">No date</a></h2>
               </div>
               <div class="post">
                 <h2>No link</h2><span class="date">2024-01-30</span>
               </div>
               <div class="sidebar">
                 <h2><a href="/about">About</a></h2><span class="date">2024-01-01</span>
               </div>"#,
        );

        let records = extract(&html, &container_profile());

        assert_eq!(records.len(), 1);
        assert_eq!(records[0].title, "First");
        assert_eq!(records[0].link, "https://y.test/posts/1.html");
        assert_eq!(records[0].published_time, "2024-02-01");
        assert_eq!(records[0].site_icon, "y.png");
    }

    #[test]
    fn test_no_matches_yields_nothing() {
        let html = Html::parse_document("<html><body><p>maintenance</p></body></html>");
        assert!(extract(&html, &selector_profile()).is_empty());
        assert!(extract(&html, &container_profile()).is_empty());
    }

    #[test]
    fn test_resolve_link() {
        let base = Url::parse("http://x.test/news/list.html").unwrap();
        assert_eq!(
            resolve_link(&base, "detail/7.html").as_deref(),
            Some("http://x.test/news/detail/7.html")
        );
        assert_eq!(
            resolve_link(&base, "/a?id=1").as_deref(),
            Some("http://x.test/a?id=1")
        );
        assert_eq!(
            resolve_link(&base, "//cdn.test/x").as_deref(),
            Some("http://cdn.test/x")
        );
        assert_eq!(resolve_link(&base, "  "), None);
    }
}
