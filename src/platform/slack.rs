use std::time::Duration;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::delivery::Outbound;
use crate::relay::{Destination, RelayTask};
use crate::routing::SlackRoom;

/// Appended to relayed usernames so Slack readers can tell bridged posts apart
pub const ORIGIN_TAG: &str = "[groupme]";

/// Form body of a Slack outgoing webhook
#[derive(Debug, Clone, Deserialize)]
pub struct SlackOutgoing {
    #[serde(default)]
    pub channel_name: String,
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default)]
    pub user_name: Option<String>,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub user_id: Option<String>,
}

/// Incoming-webhook payload
#[derive(Debug, Serialize)]
pub struct WebhookPost {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    pub attachments: Vec<WebhookAttachment>,
    pub channel: String,
    pub parse: &'static str,
    pub username: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub icon_url: Option<String>,
}

#[derive(Debug, Serialize, PartialEq, Eq)]
pub struct WebhookAttachment {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fallback: Option<String>,
    pub text: String,
}

pub fn format_post(task: &RelayTask, room: &SlackRoom) -> WebhookPost {
    let attachments = task
        .attachments
        .iter()
        .map(|url| WebhookAttachment {
            fallback: task.fallback.clone(),
            text: url.clone(),
        })
        .collect();

    WebhookPost {
        text: task.text.clone(),
        attachments,
        channel: format!("#{}", room.name),
        parse: "full",
        username: format!("{} {}", task.username, ORIGIN_TAG),
        icon_url: task.icon_url.clone(),
    }
}

pub struct SlackClient {
    client: reqwest::Client,
    webhook_url: String,
}

impl SlackClient {
    pub fn new(webhook_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build Slack HTTP client")?;
        Ok(Self {
            client,
            webhook_url: webhook_url.into(),
        })
    }
}

#[async_trait]
impl Outbound for SlackClient {
    fn platform(&self) -> &'static str {
        "slack"
    }

    async fn deliver(&self, task: &RelayTask) -> Result<()> {
        let Destination::Slack(room) = &task.destination else {
            bail!("task {} is not addressed to a Slack channel", task.id);
        };
        let post = format_post(task, room);

        debug!("Posting task {} to Slack channel {}", task.id, post.channel);

        let response = self
            .client
            .post(&self.webhook_url)
            .json(&post)
            .send()
            .await
            .context("Failed to send request to Slack")?;

        // Incoming webhooks answer 200 "ok" and nothing else on success
        let status = response.status();
        if status != StatusCode::OK {
            let error_body = response.text().await.unwrap_or_default();
            bail!("slack error ({}): {}", status, error_body);
        }

        Ok(())
    }
}
