//! ServerChan push client.
//!
//! Messages are POSTed as JSON to `https://sctapi.ftqq.com/{send_key}.send`.
//! The service answers `{"code": 0, ...}` on success; any other code, or a
//! non-2xx status, is reported as [`NotifyError::Rejected`].

use super::PushMessage;
use crate::error::NotifyError;
use crate::settings::ServerChanSettings;
use crate::utils::truncate_for_log;
use reqwest::Client;
use serde::Serialize;
use std::time::Duration;
use tracing::{debug, instrument};

const API_URL: &str = "https://sctapi.ftqq.com/";

/// The message channel used when the settings name none.
pub const DEFAULT_CHANNEL: u32 = 66;

#[derive(Debug, Serialize)]
struct SendPayload<'a> {
    title: &'a str,
    desp: &'a str,
    short: &'a str,
    channel: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    openid: Option<&'a str>,
}

/// One ServerChan account.
#[derive(Clone)]
pub struct ServerChan {
    send_key: String,
    channel: u32,
    openid: Option<String>,
    client: Client,
}

impl std::fmt::Debug for ServerChan {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerChan")
            .field("send_key", &"<redacted>")
            .field("channel", &self.channel)
            .finish()
    }
}

impl ServerChan {
    pub fn new(settings: &ServerChanSettings, client: Client) -> Self {
        Self {
            send_key: settings.send_key.clone(),
            channel: settings.channel.unwrap_or(DEFAULT_CHANNEL),
            openid: settings.openid.clone(),
            client,
        }
    }

    fn send_url(&self) -> String {
        format!("{API_URL}{}.send", self.send_key)
    }

    fn payload<'a>(&'a self, message: &'a PushMessage) -> SendPayload<'a> {
        SendPayload {
            title: &message.title,
            desp: &message.body,
            short: &message.short,
            channel: self.channel,
            openid: self.openid.as_deref(),
        }
    }

    /// Push one message.
    #[instrument(level = "debug", skip_all, fields(title = %message.title))]
    pub async fn send(&self, message: &PushMessage) -> Result<(), NotifyError> {
        let response = self
            .client
            .post(self.send_url())
            .timeout(Duration::from_secs(15))
            .json(&self.payload(message))
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(NotifyError::Rejected {
                status: status.as_u16(),
                body: truncate_for_log(&body, 200),
            });
        }

        let code = serde_json::from_str::<serde_json::Value>(&body)
            .ok()
            .and_then(|v| v.get("code").and_then(serde_json::Value::as_i64));
        match code {
            Some(0) | None => {
                debug!("Push accepted");
                Ok(())
            }
            Some(_) => Err(NotifyError::Rejected {
                status: status.as_u16(),
                body: truncate_for_log(&body, 200),
            }),
        }
    }
}
