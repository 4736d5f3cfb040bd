mod config;
mod delivery;
mod platform;
mod relay;
mod routing;
mod server;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::{default_config_path, Config};
use crate::delivery::DeliveryQueue;
use crate::platform::groupme::GroupMeClient;
use crate::platform::slack::SlackClient;
use crate::relay::Relay;
use crate::routing::RoutingTable;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,groupslack=debug,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config_path = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(default_config_path);

    info!("Loading configuration from: {}", config_path.display());
    let config = Config::load(&config_path)
        .with_context(|| format!("Failed to load config from {}", config_path.display()))?;

    // A gateway pointing at an unknown room is fatal
    let routes = Arc::new(RoutingTable::from_config(&config)?);

    info!("Configuration loaded successfully");
    info!("  Gateways: {}", routes.len());
    if routes.is_empty() {
        warn!("No gateways configured, every inbound message will be rejected");
    }
    for pairing in routes.iter() {
        info!(
            "    {} ({}) <-> #{}",
            pairing.groupme.name, pairing.groupme.group_id, pairing.slack.name
        );
    }

    let timeout = Duration::from_secs(config.delivery.timeout_secs);
    let (to_slack, slack_worker) =
        DeliveryQueue::spawn(Arc::new(SlackClient::new(&config.slack.webhook_url, timeout)?));
    let (to_groupme, groupme_worker) =
        DeliveryQueue::spawn(Arc::new(GroupMeClient::new(&config.groupme.api_url, timeout)?));

    let relay = Arc::new(Relay::new(
        routes,
        to_slack,
        to_groupme,
        config.slack.user_id.clone(),
    ));

    server::serve(&config.bind_address(), relay).await?;

    // The server owned the last handle to the queues; let the workers drain
    info!("Waiting for pending deliveries...");
    delivery::join_workers(vec![("slack", slack_worker), ("groupme", groupme_worker)]).await;

    Ok(())
}
