use std::collections::HashMap;
use std::sync::Arc;

use crate::config::Config;

/// A GroupMe group the bridge posts into through a bot
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupMeRoom {
    pub group_id: String,
    pub name: String,
    pub bot_id: String,
    /// The bot's own user id, used to drop echoes of its posts
    pub user_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlackRoom {
    pub name: String,
    pub token: String,
}

/// One GroupMe group paired with one Slack channel
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoomPairing {
    pub groupme: GroupMeRoom,
    pub slack: SlackRoom,
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("gateway config error: unknown groupme '{0}'")]
    UnknownGroup(String),
    #[error("gateway config error: unknown slack '{0}'")]
    UnknownChannel(String),
    #[error("gateway config error: groupme '{0}' is used by more than one gateway")]
    DuplicateGroup(String),
    #[error("gateway config error: slack '{0}' is used by more than one gateway")]
    DuplicateChannel(String),
}

/// Bidirectional lookup from a room on either platform to its pairing.
///
/// Built once at startup and never mutated, so it can be shared behind an
/// `Arc` and read from every request handler without locking.
#[derive(Debug, Default)]
pub struct RoutingTable {
    by_group: HashMap<String, Arc<RoomPairing>>,
    by_channel: HashMap<String, Arc<RoomPairing>>,
}

impl RoutingTable {
    pub fn from_config(config: &Config) -> Result<Self, ConfigError> {
        let mut table = Self::default();

        for gateway in &config.gateways {
            let group = config
                .groupme
                .groups
                .iter()
                .find(|g| g.group_id == gateway.groupme)
                .ok_or_else(|| ConfigError::UnknownGroup(gateway.groupme.clone()))?;
            let channel = config
                .slack
                .channels
                .iter()
                .find(|c| c.name == gateway.slack)
                .ok_or_else(|| ConfigError::UnknownChannel(gateway.slack.clone()))?;

            if table.by_group.contains_key(&group.group_id) {
                return Err(ConfigError::DuplicateGroup(group.group_id.clone()));
            }
            if table.by_channel.contains_key(&channel.name) {
                return Err(ConfigError::DuplicateChannel(channel.name.clone()));
            }

            let pairing = Arc::new(RoomPairing {
                groupme: GroupMeRoom {
                    group_id: group.group_id.clone(),
                    name: group.name.clone().unwrap_or_else(|| group.group_id.clone()),
                    bot_id: group.bot_id.clone(),
                    user_id: group.user_id.clone().filter(|id| !id.is_empty()),
                },
                slack: SlackRoom {
                    name: channel.name.clone(),
                    token: channel.token.clone(),
                },
            });

            table
                .by_group
                .insert(group.group_id.clone(), Arc::clone(&pairing));
            table.by_channel.insert(channel.name.clone(), pairing);
        }

        Ok(table)
    }

    pub fn lookup_by_group(&self, group_id: &str) -> Option<Arc<RoomPairing>> {
        self.by_group.get(group_id).cloned()
    }

    pub fn lookup_by_channel(&self, channel_name: &str) -> Option<Arc<RoomPairing>> {
        self.by_channel.get(channel_name).cloned()
    }

    pub fn len(&self) -> usize {
        self.by_group.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_group.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &RoomPairing> {
        self.by_group.values().map(|p| p.as_ref())
    }
}
