use std::time::Duration;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::delivery::Outbound;
use crate::relay::{Destination, RelayTask};
use crate::routing::GroupMeRoom;

/// Fallback label Slack shows for relayed GroupMe images
pub const IMAGE_FALLBACK: &str = "GroupMe image attachment";

/// Body of a GroupMe bot callback, posted for every message in the group
#[derive(Debug, Clone, Deserialize)]
pub struct GroupMeCallback {
    /// Missing ids fall through to the unknown-room rejection
    #[serde(default)]
    pub group_id: String,
    #[serde(default)]
    pub user_id: Option<String>,
    /// Sender display name
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub avatar_url: Option<String>,
    #[serde(default)]
    pub attachments: Option<Vec<GroupMeAttachment>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GroupMeAttachment {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub url: Option<String>,
}

impl GroupMeAttachment {
    pub fn is_image(&self) -> bool {
        self.kind == "image"
    }

    /// Kinds GroupMe is known to send that the bridge deliberately skips
    pub fn is_known(&self) -> bool {
        self.is_image() || self.kind == "location"
    }
}

/// `POST /v3/bots/post` body
#[derive(Debug, Serialize, PartialEq, Eq)]
pub struct BotPost {
    pub bot_id: String,
    pub text: String,
}

/// Format a task as a bot post. GroupMe bots cannot impersonate users, so
/// the original sender is carried as a bracketed prefix.
pub fn format_post(task: &RelayTask, room: &GroupMeRoom) -> BotPost {
    BotPost {
        bot_id: room.bot_id.clone(),
        text: format!(
            "[{}] {}",
            task.username,
            task.text.as_deref().unwrap_or_default()
        ),
    }
}

pub struct GroupMeClient {
    client: reqwest::Client,
    api_url: String,
}

impl GroupMeClient {
    pub fn new(api_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build GroupMe HTTP client")?;
        Ok(Self {
            client,
            api_url: api_url.into(),
        })
    }
}

#[async_trait]
impl Outbound for GroupMeClient {
    fn platform(&self) -> &'static str {
        "groupme"
    }

    async fn deliver(&self, task: &RelayTask) -> Result<()> {
        let Destination::GroupMe(room) = &task.destination else {
            bail!("task {} is not addressed to a GroupMe group", task.id);
        };
        let post = format_post(task, room);

        debug!("Posting task {} to GroupMe group {}", task.id, room.name);

        let response = self
            .client
            .post(&self.api_url)
            .json(&post)
            .send()
            .await
            .context("Failed to send request to GroupMe")?;

        let status = response.status();
        if !status.is_success() {
            let error_body = response.text().await.unwrap_or_default();
            bail!("groupme error ({}): {}", status, error_body);
        }

        Ok(())
    }
}
