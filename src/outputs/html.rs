//! Static HTML report of the whole history.
//!
//! The report is a template with two placeholders:
//!
//! - `{{ records }}`: one `<li>` per record, newest first
//! - `{{ generated_at }}`: local time the report was written
//!
//! Record text is HTML-escaped before it is substituted. When the template
//! file is missing a built-in page is used.

use crate::models::Record;
use crate::utils::now_stamp;
use html_escape::{encode_double_quoted_attribute, encode_text};
use std::error::Error;
use std::io::ErrorKind;
use std::path::Path;
use tokio::fs;
use tracing::{info, instrument, warn};

/// Page used when no template file exists.
pub const DEFAULT_TEMPLATE: &str = r#"<!DOCTYPE html>
<html lang="en">
<head>
<meta charset="utf-8">
<title>Latest articles</title>
<style>
body { font-family: sans-serif; max-width: 60rem; margin: 2rem auto; }
li { margin: 0.4rem 0; list-style: none; }
.icon { width: 1rem; height: 1rem; vertical-align: middle; }
.time, .site { color: #666; font-size: 0.9em; margin-left: 0.5rem; }
</style>
</head>
<body>
<h1>Latest articles</h1>
<p>Updated {{ generated_at }}</p>
<ul>
{{ records }}
</ul>
</body>
</html>
"#;

/// Render `records` into `template`.
pub fn render(records: &[Record], template: &str, generated_at: &str) -> String {
    let mut items = String::new();
    for record in records {
        items.push_str("<li>");
        if !record.site_icon.is_empty() {
            items.push_str(&format!(
                r#"<img class="icon" src="{}" alt=""> "#,
                encode_double_quoted_attribute(&record.site_icon)
            ));
        }
        items.push_str(&format!(
            r#"<a class="title" href="{}">{}</a><span class="time">{}</span><a class="site" href="{}">{}</a>"#,
            encode_double_quoted_attribute(&record.link),
            encode_text(&record.title),
            encode_text(&record.published_time),
            encode_double_quoted_attribute(&record.site_url),
            encode_text(&record.site_name),
        ));
        items.push_str("</li>\n");
    }

    let items = items.trim_end();
    fill_placeholders(
        template,
        &[
            ("{{ records }}", items),
            ("{{records}}", items),
            ("{{ generated_at }}", generated_at),
            ("{{generated_at}}", generated_at),
        ],
    )
}

/// Substitute each placeholder in one pass over `template`. Substituted text
/// is never scanned again.
fn fill_placeholders(template: &str, values: &[(&str, &str)]) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(start) = rest.find("{{") {
        out.push_str(&rest[..start]);
        let tail = &rest[start..];
        match values.iter().find(|(key, _)| tail.starts_with(key)) {
            Some((key, value)) => {
                out.push_str(value);
                rest = &tail[key.len()..];
            }
            None => {
                out.push('{');
                rest = &tail[1..];
            }
        }
    }
    out.push_str(rest);
    out
}

/// Render the report for `records` and write it to `output_path`.
#[instrument(level = "info", skip_all, fields(template = %template_path.display(), output = %output_path.display()))]
pub async fn write_report(
    records: &[Record],
    template_path: &Path,
    output_path: &Path,
) -> Result<(), Box<dyn Error>> {
    let template = match fs::read_to_string(template_path).await {
        Ok(template) => template,
        Err(e) if e.kind() == ErrorKind::NotFound => {
            warn!("Template not found; using built-in page");
            DEFAULT_TEMPLATE.to_string()
        }
        Err(e) => return Err(e.into()),
    };

    let html = render(records, &template, &now_stamp());
    fs::write(output_path, html).await?;
    info!(records = records.len(), "Wrote HTML report");
    Ok(())
}
