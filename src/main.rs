mod classify;
mod config;
mod discord;
mod embed;
mod event;
mod identity;

use anyhow::Result;
use tracing::{debug, error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::classify::{EventName, Outcome};
use crate::config::{Config, Palette};
use crate::discord::{DeliveryOutcome, DiscordClient};
use crate::event::Event;
use crate::identity::IdentityMap;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,prnotify=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env(std::env::args());

    let identity_map = IdentityMap::from_base64(config.mapping_b64.as_deref());
    if identity_map.is_empty() {
        warn!("Identity map is empty; every notification will be skipped as unmapped");
    } else {
        info!("Identity map loaded ({} entries)", identity_map.len());
    }

    // Missing event-source configuration halts processing but is not a
    // process-level failure: CI should not go red over a notification hook.
    let Some(event_path) = config.event_path.as_deref() else {
        error!("GITHUB_EVENT_PATH not set");
        return Ok(());
    };

    let event = Event::load(event_path)?;
    let event_name = EventName::parse(&config.event_name);
    info!(
        "Event: {} | Action: {}",
        event_name.raw(),
        event.action.as_deref().unwrap_or("-")
    );

    let notification = match classify::classify(&event_name, &event, &Palette::default())? {
        Outcome::Notify(n) => n,
        Outcome::Skip(reason) => {
            info!("Nothing to send: {}", reason);
            return Ok(());
        }
    };

    if notification.recipients.is_empty() {
        info!("No recipients after excluding the sender; nothing to send");
        return Ok(());
    }

    let client = DiscordClient::new(config.bot_token, config.api_base);
    let reports = client
        .deliver_all(&notification.recipients, &identity_map, &notification.embed)
        .await;

    let mut sent = 0;
    let mut unmapped = 0;
    let mut failed: Vec<&str> = Vec::new();
    for report in &reports {
        match &report.outcome {
            DeliveryOutcome::Sent { user_id } => {
                debug!("Delivered to {} ({})", report.username, user_id);
                sent += 1;
            }
            DeliveryOutcome::Unmapped => unmapped += 1,
            DeliveryOutcome::Failed { .. } => failed.push(report.username.as_str()),
        }
    }
    if failed.is_empty() {
        info!(
            "Delivery summary: {} sent, {} unmapped, 0 failed",
            sent, unmapped
        );
    } else {
        warn!(
            "Delivery summary: {} sent, {} unmapped, {} failed: {:?}",
            sent,
            unmapped,
            failed.len(),
            failed
        );
    }

    Ok(())
}
