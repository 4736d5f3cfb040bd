//! groupslack setup wizard.
//!
//! Asks for the Slack webhook, one GroupMe bot and the Slack channel it
//! should be bridged with, then writes a ready-to-run `config.toml`.
//! More gateways can be added to the file by hand afterwards.
//!
//! Usage: `setup [path]` (defaults to `config.toml` in the current directory).

use anyhow::{Context, Result};
use serde::Serialize;
use std::io::{self, Write};
use std::path::PathBuf;

// ── Config formatting ──────────────────────────────────────────────────────────

struct ConfigParams<'a> {
    port: u16,
    webhook_url: &'a str,
    slack_user_id: &'a str,
    group_name: &'a str,
    group_id: &'a str,
    bot_id: &'a str,
    bot_user_id: &'a str,
    channel: &'a str,
    channel_token: &'a str,
}

#[derive(Serialize)]
struct FileConfig<'a> {
    port: u16,
    server_name: &'a str,
    groupme: GroupMeSection<'a>,
    slack: SlackSection<'a>,
    gateways: Vec<GatewaySection<'a>>,
}

#[derive(Serialize)]
struct GroupMeSection<'a> {
    groups: Vec<GroupSection<'a>>,
}

#[derive(Serialize)]
struct GroupSection<'a> {
    name: &'a str,
    group_id: &'a str,
    bot_id: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    user_id: Option<&'a str>,
}

#[derive(Serialize)]
struct SlackSection<'a> {
    webhook_url: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    user_id: Option<&'a str>,
    channels: Vec<ChannelSection<'a>>,
}

#[derive(Serialize)]
struct ChannelSection<'a> {
    name: &'a str,
    token: &'a str,
}

#[derive(Serialize)]
struct GatewaySection<'a> {
    groupme: &'a str,
    slack: &'a str,
}

/// Produces a valid config.toml string. Extracted so it can be unit-tested.
/// Optional ids left blank are omitted.
fn format_config(p: &ConfigParams<'_>) -> Result<String> {
    fn optional(value: &str) -> Option<&str> {
        (!value.is_empty()).then_some(value)
    }
    let channel = p.channel.trim_start_matches('#');

    let config = FileConfig {
        port: p.port,
        server_name: "0.0.0.0",
        groupme: GroupMeSection {
            groups: vec![GroupSection {
                name: p.group_name,
                group_id: p.group_id,
                bot_id: p.bot_id,
                user_id: optional(p.bot_user_id),
            }],
        },
        slack: SlackSection {
            webhook_url: p.webhook_url,
            user_id: optional(p.slack_user_id),
            channels: vec![ChannelSection {
                name: channel,
                token: p.channel_token,
            }],
        },
        gateways: vec![GatewaySection {
            groupme: p.group_id,
            slack: channel,
        }],
    };

    toml::to_string(&config).context("Failed to serialize config")
}

// ── Entry point ────────────────────────────────────────────────────────────────

fn main() -> Result<()> {
    let config_path = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("config.toml"));

    println!("=== groupslack setup ===\n");

    let read_line = |prompt: &str| -> Result<String> {
        print!("{prompt}");
        io::stdout().flush()?;
        let mut buf = String::new();
        io::stdin().read_line(&mut buf)?;
        Ok(buf.trim().to_owned())
    };

    let or_default = |s: String, default: &str| {
        if s.is_empty() {
            default.to_owned()
        } else {
            s
        }
    };

    let port = read_line("Listen port [5287]: ")?;
    let port: u16 = if port.is_empty() {
        5287
    } else {
        port.parse()
            .with_context(|| format!("Invalid port: {port}"))?
    };
    let webhook_url = read_line("Slack incoming webhook URL: ")?;
    let slack_user_id = read_line("Slack user id the webhook posts as (optional): ")?;
    let group_id = read_line("GroupMe group id: ")?;
    let group_name = or_default(
        read_line(format!("GroupMe group name [{group_id}]: ").as_str())?,
        group_id.as_str(),
    );
    let bot_id = read_line("GroupMe bot id: ")?;
    let bot_user_id = read_line("GroupMe bot user id (optional): ")?;
    let channel = or_default(read_line("Slack channel [general]: ")?, "general");
    let channel_token = read_line("Slack outgoing webhook token: ")?;

    let config = format_config(&ConfigParams {
        port,
        webhook_url: &webhook_url,
        slack_user_id: &slack_user_id,
        group_name: &group_name,
        group_id: &group_id,
        bot_id: &bot_id,
        bot_user_id: &bot_user_id,
        channel: &channel,
        channel_token: &channel_token,
    })?;

    std::fs::write(&config_path, &config)
        .with_context(|| format!("Could not write {}", config_path.display()))?;

    println!("\n✓  config saved to {}", config_path.display());
    println!("   Run the bridge with:  cargo run -- {}", config_path.display());
    Ok(())
}

// ── Tests ──────────────────────────────────────────────────────────────────────
