use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    #[serde(default = "default_port")]
    pub port: u16,
    /// Host the inbound webhook server binds to
    #[serde(default = "default_server_name")]
    pub server_name: String,
    pub groupme: GroupMeConfig,
    pub slack: SlackConfig,
    #[serde(default)]
    pub gateways: Vec<GatewayConfig>,
    #[serde(default)]
    pub delivery: DeliveryConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct GroupMeConfig {
    #[serde(default = "default_groupme_api_url")]
    pub api_url: String,
    #[serde(default)]
    pub groups: Vec<GroupMeGroupConfig>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct GroupMeGroupConfig {
    /// Label used in log lines; defaults to the group id when omitted
    #[serde(default)]
    pub name: Option<String>,
    pub group_id: String,
    pub bot_id: String,
    /// The GroupMe user the bot posts as. Messages from it are never relayed.
    #[serde(default)]
    pub user_id: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct SlackConfig {
    pub webhook_url: String,
    /// The Slack user incoming-webhook posts show up as
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub channels: Vec<SlackChannelConfig>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct SlackChannelConfig {
    pub name: String,
    /// Outgoing-webhook token Slack sends with every message from this channel
    pub token: String,
}

/// One GroupMe group bridged to one Slack channel
#[derive(Debug, Deserialize, Clone)]
pub struct GatewayConfig {
    /// GroupMe group id
    pub groupme: String,
    /// Slack channel name, without the leading '#'
    pub slack: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DeliveryConfig {
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_port() -> u16 {
    5287
}

fn default_server_name() -> String {
    "0.0.0.0".to_string()
}

fn default_groupme_api_url() -> String {
    "https://api.groupme.com/v3/bots/post".to_string()
}

fn default_timeout_secs() -> u64 {
    30
}

/// `$HOME/.config/groupslack/config.toml`, or `config.toml` when HOME is unset.
pub fn default_config_path() -> PathBuf {
    match std::env::var_os("HOME") {
        Some(home) => PathBuf::from(home)
            .join(".config")
            .join("groupslack")
            .join("config.toml"),
        None => PathBuf::from("config.toml"),
    }
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        Self::parse(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    pub fn parse(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content)?;
        Ok(config)
    }

    /// Address the inbound server listens on, e.g. `0.0.0.0:5287`
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.server_name, self.port)
    }
}
