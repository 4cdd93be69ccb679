//! Handing new records to the reader.
//!
//! Each new record becomes a [`PushMessage`]: a title, a Markdown body, and a
//! short summary. In push mode the message goes to every configured
//! [`ServerChan`] account; otherwise the body is printed to stdout.
//!
//! Delivery failures are logged per message and never stop the remaining
//! deliveries.

pub mod serverchan;

use crate::models::Record;
use tracing::{info, instrument, warn};

pub use serverchan::ServerChan;

/// One notification, ready for any channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PushMessage {
    pub title: String,
    pub body: String,
    pub short: String,
}

impl PushMessage {
    /// Compose the message for `record`.
    ///
    /// The body links the title to the article, shows the raw publish time,
    /// and links the site name to the site's listing page.
    pub fn for_record(record: &Record) -> Self {
        let body = format!(
            "## [{title}]({link})\n\n#### Time: {time}\n\n#### Source: [{site}]({site_url})\n\n",
            title = record.title,
            link = record.link,
            time = record.published_time,
            site = record.site_name,
            site_url = record.site_url,
        );
        Self {
            title: record.title.clone(),
            body,
            short: record.published_time.clone(),
        }
    }
}

/// Deliver `records` through `channels` when `push` is set, else print them.
#[instrument(level = "info", skip_all, fields(records = records.len(), push = push))]
pub async fn deliver(records: &[Record], channels: &[ServerChan], push: bool) {
    if push && channels.is_empty() {
        warn!("Push requested but no ServerChan keys are configured");
    }

    let mut sent = 0usize;
    for record in records {
        let message = PushMessage::for_record(record);
        if !push {
            println!("{}", message.body);
            continue;
        }
        for channel in channels {
            match channel.send(&message).await {
                Ok(()) => sent += 1,
                Err(e) => warn!(title = %message.title, error = %e, "Push failed"),
            }
        }
    }

    if push {
        info!(sent, "Delivered push notifications");
    }
}
