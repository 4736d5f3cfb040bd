use std::sync::Arc;

use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::delivery::DeliveryQueue;
use crate::platform::groupme::{GroupMeCallback, IMAGE_FALLBACK};
use crate::platform::non_empty;
use crate::platform::slack::SlackOutgoing;
use crate::routing::{GroupMeRoom, RoutingTable, SlackRoom};

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum RelayError {
    #[error("unknown room")]
    UnknownRoom,
    #[error("invalid or missing token")]
    InvalidCredential,
    #[error("expected text or attachments")]
    EmptyMessage,
    #[error("malformed request body")]
    MalformedRequest,
    #[error("relay is shutting down")]
    QueueClosed,
}

/// Where a relayed message is going
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Destination {
    Slack(SlackRoom),
    GroupMe(GroupMeRoom),
}

/// A platform-neutral message waiting to be posted on the other side.
#[derive(Debug, Clone)]
pub struct RelayTask {
    pub id: Uuid,
    /// Shown as the sender on the destination platform
    pub username: String,
    pub text: Option<String>,
    /// Image URLs, in the order they were posted
    pub attachments: Vec<String>,
    /// Description for clients that cannot render an attachment inline
    pub fallback: Option<String>,
    pub icon_url: Option<String>,
    pub destination: Destination,
}

impl RelayTask {
    pub fn new(
        username: String,
        text: Option<String>,
        attachments: Vec<String>,
        fallback: Option<String>,
        icon_url: Option<String>,
        destination: Destination,
    ) -> Result<Self, RelayError> {
        if text.is_none() && attachments.is_empty() {
            return Err(RelayError::EmptyMessage);
        }
        Ok(Self {
            id: Uuid::new_v4(),
            username,
            text,
            attachments,
            fallback,
            icon_url,
            destination,
        })
    }
}

/// What happened to an accepted inbound message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Queued(Uuid),
    /// The sender is the bridge itself
    IgnoredSelf,
    /// The GroupMe group has no bot user id configured, so echoes cannot be told apart
    IgnoredUnconfigured,
}

impl Outcome {
    /// Plain-text acknowledgment returned to the webhook caller
    pub fn message(&self) -> &'static str {
        match self {
            Outcome::Queued(_) => "Request queued",
            Outcome::IgnoredSelf => "Ignoring message from self",
            Outcome::IgnoredUnconfigured => {
                "Ignoring message to group without user_id configured"
            }
        }
    }
}

pub struct Relay {
    routes: Arc<RoutingTable>,
    to_slack: DeliveryQueue,
    to_groupme: DeliveryQueue,
    /// The Slack user incoming-webhook posts appear as
    slack_user_id: Option<String>,
}

impl Relay {
    pub fn new(
        routes: Arc<RoutingTable>,
        to_slack: DeliveryQueue,
        to_groupme: DeliveryQueue,
        slack_user_id: Option<String>,
    ) -> Self {
        Self {
            routes,
            to_slack,
            to_groupme,
            slack_user_id: slack_user_id.filter(|id| !id.is_empty()),
        }
    }

    /// GroupMe -> Slack
    pub fn from_groupme(&self, callback: GroupMeCallback) -> Result<Outcome, RelayError> {
        let Some(pairing) = self.routes.lookup_by_group(&callback.group_id) else {
            warn!("Unknown GroupMe group_id {}", callback.group_id);
            return Err(RelayError::UnknownRoom);
        };
        let group = &pairing.groupme;

        match group.user_id.as_deref() {
            Some(self_id) if callback.user_id.as_deref() == Some(self_id) => {
                return Ok(Outcome::IgnoredSelf);
            }
            Some(_) => {}
            None => {
                warn!(
                    "No user_id set for group {}, ignoring message from {}",
                    group.name,
                    callback.name.as_deref().unwrap_or_default()
                );
                return Ok(Outcome::IgnoredUnconfigured);
            }
        }

        let attachments = callback.attachments.unwrap_or_default();
        let fallback = (!attachments.is_empty()).then(|| IMAGE_FALLBACK.to_string());

        let mut image_urls = Vec::new();
        for attachment in attachments {
            if !attachment.is_image() {
                if attachment.is_known() {
                    debug!("Dropping GroupMe {} attachment", attachment.kind);
                } else {
                    warn!("Unknown GroupMe attachment type: {}", attachment.kind);
                }
                continue;
            }
            match attachment.url {
                Some(url) => image_urls.push(url),
                None => warn!("GroupMe image attachment without url"),
            }
        }

        let task = RelayTask::new(
            callback.name.unwrap_or_default(),
            non_empty(callback.text),
            image_urls,
            fallback,
            non_empty(callback.avatar_url),
            Destination::Slack(pairing.slack.clone()),
        )
        .inspect_err(|_| {
            warn!(
                "GroupMe message in {} without text or attachments",
                group.name
            )
        })?;

        let id = task.id;
        info!(
            "Queueing GroupMe message from {} in {} for #{} (task {})",
            task.username, group.name, pairing.slack.name, id
        );
        self.to_slack.enqueue(task)?;
        Ok(Outcome::Queued(id))
    }

    /// Slack -> GroupMe
    pub fn from_slack(&self, outgoing: SlackOutgoing) -> Result<Outcome, RelayError> {
        let Some(pairing) = self.routes.lookup_by_channel(&outgoing.channel_name) else {
            warn!("Unknown Slack channel {}", outgoing.channel_name);
            return Err(RelayError::UnknownRoom);
        };

        if outgoing.token.as_deref() != Some(pairing.slack.token.as_str()) {
            warn!(
                "Invalid or missing token on Slack webhook for #{} from {}",
                outgoing.channel_name,
                outgoing.user_name.as_deref().unwrap_or_default()
            );
            return Err(RelayError::InvalidCredential);
        }

        if let Some(self_id) = self.slack_user_id.as_deref() {
            if outgoing.user_id.as_deref() == Some(self_id) {
                return Ok(Outcome::IgnoredSelf);
            }
        }

        let task = RelayTask::new(
            outgoing.user_name.unwrap_or_default(),
            non_empty(outgoing.text),
            Vec::new(),
            None,
            None,
            Destination::GroupMe(pairing.groupme.clone()),
        )?;

        let id = task.id;
        info!(
            "Queueing Slack message from {} in #{} for {} (task {})",
            task.username, pairing.slack.name, pairing.groupme.name, id
        );
        self.to_groupme.enqueue(task)?;
        Ok(Outcome::Queued(id))
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::config::Config;
    use crate::platform::groupme::GroupMeAttachment;
    use tokio::sync::mpsc::UnboundedReceiver;

    pub(crate) const CONFIG: &str = r#"
[groupme]
[[groupme.groups]]
name = "Team"
group_id = "G1"
bot_id = "bot-1"
user_id = "U1"

[[groupme.groups]]
name = "Quiet"
group_id = "G2"
bot_id = "bot-2"

[slack]
webhook_url = "http://127.0.0.1:9/hook"
user_id = "USLACKBOT"
[[slack.channels]]
name = "general"
token = "tok-general"

[[slack.channels]]
name = "quiet"
token = "tok-quiet"

[[gateways]]
groupme = "G1"
slack = "general"

[[gateways]]
groupme = "G2"
slack = "quiet"
"#;

    pub(crate) struct Harness {
        pub relay: Relay,
        pub slack_rx: UnboundedReceiver<RelayTask>,
        pub groupme_rx: UnboundedReceiver<RelayTask>,
    }

    pub(crate) fn harness() -> Harness {
        let config = Config::parse(CONFIG).unwrap();
        let routes = Arc::new(RoutingTable::from_config(&config).unwrap());
        let (to_slack, slack_rx) = DeliveryQueue::detached();
        let (to_groupme, groupme_rx) = DeliveryQueue::detached();
        Harness {
            relay: Relay::new(routes, to_slack, to_groupme, config.slack.user_id),
            slack_rx,
            groupme_rx,
        }
    }

    fn attachment(kind: &str, url: &str) -> GroupMeAttachment {
        GroupMeAttachment {
            kind: kind.to_string(),
            url: Some(url.to_string()),
        }
    }

    fn callback(user_id: &str, text: Option<&str>, attachments: Vec<GroupMeAttachment>) -> GroupMeCallback {
        GroupMeCallback {
            group_id: "G1".to_string(),
            user_id: Some(user_id.to_string()),
            name: Some("Alice".to_string()),
            text: text.map(String::from),
            avatar_url: Some("http://x/alice.png".to_string()),
            attachments: Some(attachments),
        }
    }

    fn outgoing(token: Option<&str>, user_id: &str, text: &str) -> SlackOutgoing {
        SlackOutgoing {
            channel_name: "general".to_string(),
            token: token.map(String::from),
            user_name: Some("carol".to_string()),
            text: Some(text.to_string()),
            user_id: Some(user_id.to_string()),
        }
    }

    #[test]
    fn test_groupme_image_and_location() {
        let mut h = harness();
        let outcome = h
            .relay
            .from_groupme(callback(
                "U2",
                Some("hi"),
                vec![
                    attachment("image", "http://x/a.png"),
                    attachment("location", "http://x/b"),
                ],
            ))
            .unwrap();

        let task = h.slack_rx.try_recv().unwrap();
        assert_eq!(outcome, Outcome::Queued(task.id));
        assert_eq!(task.text.as_deref(), Some("hi"));
        assert_eq!(task.attachments, vec!["http://x/a.png".to_string()]);
        assert_eq!(task.fallback.as_deref(), Some(IMAGE_FALLBACK));
        assert_eq!(task.username, "Alice");
        assert_eq!(task.icon_url.as_deref(), Some("http://x/alice.png"));
        match &task.destination {
            Destination::Slack(room) => assert_eq!(room.name, "general"),
            other => panic!("unexpected destination {:?}", other),
        }
        assert!(h.slack_rx.try_recv().is_err());
        assert!(h.groupme_rx.try_recv().is_err());
    }

    #[test]
    fn test_groupme_self_echo_not_queued() {
        let mut h = harness();
        let outcome = h
            .relay
            .from_groupme(callback(
                "U1",
                Some("hi"),
                vec![attachment("image", "http://x/a.png")],
            ))
            .unwrap();

        assert_eq!(outcome, Outcome::IgnoredSelf);
        assert_eq!(outcome.message(), "Ignoring message from self");
        assert!(h.slack_rx.try_recv().is_err());
    }

    #[test]
    fn test_groupme_without_self_identity_not_queued() {
        let mut h = harness();
        let mut cb = callback("U2", Some("hi"), vec![]);
        cb.group_id = "G2".to_string();

        let outcome = h.relay.from_groupme(cb).unwrap();
        assert_eq!(outcome, Outcome::IgnoredUnconfigured);
        assert!(h.slack_rx.try_recv().is_err());
    }

    #[test]
    fn test_groupme_unknown_group() {
        let mut h = harness();
        let mut cb = callback("U2", Some("hi"), vec![]);
        cb.group_id = "G404".to_string();

        assert_eq!(h.relay.from_groupme(cb), Err(RelayError::UnknownRoom));
        assert!(h.slack_rx.try_recv().is_err());
    }

    #[test]
    fn test_groupme_only_non_image_attachments_is_empty() {
        let mut h = harness();
        let result = h.relay.from_groupme(callback(
            "U2",
            None,
            vec![attachment("location", "http://x/b"), attachment("split", "http://x/c")],
        ));

        assert_eq!(result, Err(RelayError::EmptyMessage));
        assert_eq!(
            result.unwrap_err().to_string(),
            "expected text or attachments"
        );
        assert!(h.slack_rx.try_recv().is_err());
    }

    #[test]
    fn test_groupme_blank_text_no_attachments_is_empty() {
        let mut h = harness();
        let result = h.relay.from_groupme(callback("U2", Some(""), vec![]));
        assert_eq!(result, Err(RelayError::EmptyMessage));
        assert!(h.slack_rx.try_recv().is_err());
    }

    #[test]
    fn test_groupme_attachment_order_preserved() {
        let mut h = harness();
        h.relay
            .from_groupme(callback(
                "U2",
                None,
                vec![
                    attachment("image", "http://x/1.png"),
                    attachment("location", "http://x/loc"),
                    attachment("image", "http://x/2.png"),
                    attachment("emoji", "http://x/e"),
                    attachment("image", "http://x/3.png"),
                ],
            ))
            .unwrap();

        let task = h.slack_rx.try_recv().unwrap();
        assert!(task.text.is_none());
        assert_eq!(
            task.attachments,
            vec!["http://x/1.png", "http://x/2.png", "http://x/3.png"]
        );
    }

    #[test]
    fn test_slack_message_queued_for_groupme() {
        let mut h = harness();
        let outcome = h
            .relay
            .from_slack(outgoing(Some("tok-general"), "U9", "hello"))
            .unwrap();

        let task = h.groupme_rx.try_recv().unwrap();
        assert_eq!(outcome, Outcome::Queued(task.id));
        assert_eq!(task.username, "carol");
        assert_eq!(task.text.as_deref(), Some("hello"));
        assert!(task.attachments.is_empty());
        match &task.destination {
            Destination::GroupMe(room) => assert_eq!(room.bot_id, "bot-1"),
            other => panic!("unexpected destination {:?}", other),
        }
        assert!(h.slack_rx.try_recv().is_err());
    }

    #[test]
    fn test_slack_wrong_token_rejected() {
        let mut h = harness();
        assert_eq!(
            h.relay.from_slack(outgoing(Some("tok-quiet"), "U9", "hello")),
            Err(RelayError::InvalidCredential)
        );
        assert_eq!(
            h.relay.from_slack(outgoing(None, "U9", "hello")),
            Err(RelayError::InvalidCredential)
        );
        assert!(h.groupme_rx.try_recv().is_err());
    }

    #[test]
    fn test_slack_unknown_channel() {
        let mut h = harness();
        let mut msg = outgoing(Some("tok-general"), "U9", "hello");
        msg.channel_name = "elsewhere".to_string();

        assert_eq!(h.relay.from_slack(msg), Err(RelayError::UnknownRoom));
        assert!(h.groupme_rx.try_recv().is_err());
    }

    #[test]
    fn test_slack_self_echo_not_queued() {
        let mut h = harness();
        let outcome = h
            .relay
            .from_slack(outgoing(Some("tok-general"), "USLACKBOT", "[Alice] hi"))
            .unwrap();

        assert_eq!(outcome, Outcome::IgnoredSelf);
        assert!(h.groupme_rx.try_recv().is_err());
    }

    #[test]
    fn test_slack_empty_text_rejected() {
        let mut h = harness();
        assert_eq!(
            h.relay.from_slack(outgoing(Some("tok-general"), "U9", " ")),
            Err(RelayError::EmptyMessage)
        );
        assert!(h.groupme_rx.try_recv().is_err());
    }

    #[test]
    fn test_closed_queue_reports_shutdown() {
        let h = harness();
        drop(h.slack_rx);
        let result = h
            .relay
            .from_groupme(callback("U2", Some("hi"), vec![]));
        assert_eq!(result, Err(RelayError::QueueClosed));
    }

    #[test]
    fn test_task_requires_text_or_attachments() {
        let room = SlackRoom {
            name: "general".to_string(),
            token: "tok".to_string(),
        };
        let result = RelayTask::new(
            "Alice".to_string(),
            None,
            Vec::new(),
            None,
            None,
            Destination::Slack(room),
        );
        assert_eq!(result.unwrap_err(), RelayError::EmptyMessage);
    }
}
