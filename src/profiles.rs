//! Loading site profiles from the profile file.
//!
//! The file is a JSON array. Each entry names a site and picks one of two
//! extraction modes by the fields it carries:
//!
//! ```json
//! [
//!   {
//!     "task_name": "Example News",
//!     "task_url": "https://news.example.com/list",
//!     "task_icon": "https://news.example.com/favicon.ico",
//!     "title_selector": "ul.news li a",
//!     "href_selector": "ul.news li a",
//!     "time_selector": "ul.news li span.date"
//!   },
//!   {
//!     "task_name": "Example Blog",
//!     "task_url": "https://blog.example.com/",
//!     "container_filter": { "tag": "div", "attrs": { "class": "post" } },
//!     "title_filter": { "tag": "a", "attrs": { "class": "title" } },
//!     "time_filter": { "tag": "time" }
//!   }
//! ]
//! ```
//!
//! A missing file yields no profiles. A broken entry is skipped with a
//! warning and the rest still load. Only an unreadable file, or one that is
//! not an array at all, fails the load.

use crate::error::{ConfigError, ProfileFileError};
use crate::models::{ExtractionRule, SiteProfile};
use scraper::Selector;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::io::ErrorKind;
use std::path::Path;
use tracing::{debug, info, instrument, warn};
use url::Url;

/// A tag name plus attribute filter, as written in container-mode profiles.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TagFilter {
    pub tag: String,
    #[serde(default)]
    pub attrs: BTreeMap<String, String>,
}

impl TagFilter {
    /// Render the filter as a CSS selector.
    ///
    /// A `class` value that is a single name matches any element whose class
    /// list contains it; a value with several names must match the whole
    /// attribute. Every other attribute must match exactly.
    pub fn to_css(&self) -> Option<String> {
        if !is_css_ident(&self.tag) {
            return None;
        }
        let mut css = self.tag.clone();
        for (name, value) in &self.attrs {
            if !is_css_ident(name) {
                return None;
            }
            let op = if name == "class" && value.split_whitespace().count() == 1 {
                "~="
            } else {
                "="
            };
            css.push_str(&format!("[{name}{op}\"{}\"]", escape_css_string(value.trim())));
        }
        Some(css)
    }
}

fn is_css_ident(s: &str) -> bool {
    !s.is_empty()
        && s
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

fn escape_css_string(s: &str) -> String {
    s.replace('\\', "\\\\").replace('"', "\\\"")
}

#[derive(Debug, Deserialize)]
struct ProfileEntry {
    task_name: Option<String>,
    task_url: Option<String>,
    task_icon: Option<String>,
    title_selector: Option<String>,
    href_selector: Option<String>,
    time_selector: Option<String>,
    container_filter: Option<TagFilter>,
    title_filter: Option<TagFilter>,
    time_filter: Option<TagFilter>,
}

/// Load every well-formed profile from `path`.
///
/// # Errors
///
/// Returns [`ProfileFileError`] when the file exists but cannot be read, or
/// when its top level is not a JSON array. Malformed entries are not errors
/// here; they are logged and skipped.
#[instrument(level = "info", skip_all, fields(path = %path.display()))]
pub fn load(path: &Path) -> Result<Vec<SiteProfile>, ProfileFileError> {
    let content = match std::fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == ErrorKind::NotFound => {
            warn!("Profile file not found; running with no sites");
            return Ok(Vec::new());
        }
        Err(source) => {
            return Err(ProfileFileError::Read {
                path: path.to_path_buf(),
                source,
            });
        }
    };

    let entries: Vec<serde_json::Value> =
        serde_json::from_str(&content).map_err(|source| ProfileFileError::Malformed {
            path: path.to_path_buf(),
            source,
        })?;

    let total = entries.len();
    let mut profiles = Vec::with_capacity(total);
    for (index, entry) in entries.into_iter().enumerate() {
        match parse_entry(index, entry) {
            Ok(profile) => {
                debug!(site = %profile.name, mode = profile.rule.mode(), "Loaded profile");
                profiles.push(profile);
            }
            Err(e) => warn!(error = %e, "Skipping malformed profile"),
        }
    }

    info!(
        loaded = profiles.len(),
        skipped = total - profiles.len(),
        "Loaded site profiles"
    );
    Ok(profiles)
}

/// Validate one profile entry and compile its extraction rule.
pub fn parse_entry(index: usize, entry: serde_json::Value) -> Result<SiteProfile, ConfigError> {
    let entry: ProfileEntry =
        serde_json::from_value(entry).map_err(|source| ConfigError::Malformed { index, source })?;

    let name = entry.task_name.clone().ok_or(ConfigError::MissingField {
        index,
        name: "<unnamed>".to_string(),
        field: "task_name",
    })?;
    let raw_url = entry.task_url.clone().ok_or_else(|| ConfigError::MissingField {
        index,
        name: name.clone(),
        field: "task_url",
    })?;
    let url = Url::parse(&raw_url).map_err(|source| ConfigError::InvalidUrl {
        index,
        name: name.clone(),
        url: raw_url.clone(),
        source,
    })?;

    let rule = compile_rule(index, &name, &entry)?;

    Ok(SiteProfile {
        name,
        url,
        icon: entry.task_icon.unwrap_or_default(),
        rule,
    })
}

fn compile_rule(
    index: usize,
    name: &str,
    entry: &ProfileEntry,
) -> Result<ExtractionRule, ConfigError> {
    let missing = |field: &'static str| ConfigError::MissingField {
        index,
        name: name.to_string(),
        field,
    };
    let compile = |css: &str| compile_selector(index, name, css);

    let selector_mode = entry.title_selector.is_some()
        || entry.href_selector.is_some()
        || entry.time_selector.is_some();
    let container_mode = entry.container_filter.is_some()
        || entry.title_filter.is_some()
        || entry.time_filter.is_some();

    if selector_mode && container_mode {
        return Err(ConfigError::ConflictingDirectives {
            index,
            name: name.to_string(),
        });
    }

    if selector_mode {
        let title = entry.title_selector.as_deref().ok_or_else(|| missing("title_selector"))?;
        let link = entry.href_selector.as_deref().ok_or_else(|| missing("href_selector"))?;
        let time = entry.time_selector.as_deref().ok_or_else(|| missing("time_selector"))?;
        Ok(ExtractionRule::Selector {
            title: compile(title)?,
            link: compile(link)?,
            time: compile(time)?,
        })
    } else if container_mode {
        let filter_css = |filter: Option<&TagFilter>,
                          field: &'static str|
         -> Result<String, ConfigError> {
            let filter = filter.ok_or_else(|| missing(field))?;
            filter.to_css().ok_or_else(|| ConfigError::InvalidSelector {
                index,
                name: name.to_string(),
                selector: format!("{filter:?}"),
                reason: "tag and attribute names must be plain identifiers".to_string(),
            })
        };
        let container = filter_css(entry.container_filter.as_ref(), "container_filter")?;
        let title = filter_css(entry.title_filter.as_ref(), "title_filter")?;
        let time = filter_css(entry.time_filter.as_ref(), "time_filter")?;
        Ok(ExtractionRule::Container {
            container: compile(&container)?,
            title: compile(&title)?,
            time: compile(&time)?,
        })
    } else {
        Err(ConfigError::NoDirectives {
            index,
            name: name.to_string(),
        })
    }
}

fn compile_selector(index: usize, name: &str, css: &str) -> Result<Selector, ConfigError> {
    Selector::parse(css).map_err(|e| ConfigError::InvalidSelector {
        index,
        name: name.to_string(),
        selector: css.to_string(),
        reason: format!("{e:?}"),
    })
}
