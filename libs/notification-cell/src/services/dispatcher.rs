use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::time::Duration;
use tracing::{debug, error, info, warn};

use shared_config::AppConfig;

use crate::models::{DispatcherSettings, NotificationEvent};
use crate::services::channels::{EmailChannel, NotificationChannel, WhatsAppChannel};

/// Cloneable handle to the outbound notification queue.
///
/// Construction spawns the single worker task that drains the queue and
/// delivers each event over every configured channel with bounded retry.
/// Create one per process and clone the handle into whatever needs it.
#[derive(Clone)]
pub struct NotificationDispatcher {
    sender: mpsc::Sender<NotificationEvent>,
}

impl NotificationDispatcher {
    pub fn new(config: &AppConfig) -> Self {
        Self::with_settings(config, DispatcherSettings::default())
    }

    pub fn with_settings(config: &AppConfig, settings: DispatcherSettings) -> Self {
        let mut channels: Vec<Arc<dyn NotificationChannel>> = Vec::new();

        match EmailChannel::new(config) {
            Ok(channel) => channels.push(Arc::new(channel)),
            Err(_) => debug!("Email channel not configured"),
        }
        match WhatsAppChannel::new(config) {
            Ok(channel) => channels.push(Arc::new(channel)),
            Err(_) => debug!("WhatsApp channel not configured"),
        }

        if channels.is_empty() {
            warn!("No notification channels configured - events will be dropped");
        }

        Self::from_channels(channels, settings)
    }

    /// Builds a dispatcher over explicit channels. Tests use this to plug in
    /// mock transports.
    pub fn from_channels(
        channels: Vec<Arc<dyn NotificationChannel>>,
        settings: DispatcherSettings,
    ) -> Self {
        let (sender, receiver) = mpsc::channel(settings.queue_capacity);
        tokio::spawn(worker_loop(receiver, channels, settings));
        Self { sender }
    }

    /// Queues an event for delivery. Never blocks and never fails the caller:
    /// a full queue or a stopped worker drops the event with an error log.
    pub fn dispatch(&self, event: NotificationEvent) {
        let kind = event.kind();
        match self.sender.try_send(event) {
            Ok(()) => debug!("Queued {} notification", kind),
            Err(mpsc::error::TrySendError::Full(_)) => {
                error!("Notification queue full, dropping {} event", kind);
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                error!("Notification worker stopped, dropping {} event", kind);
            }
        }
    }
}

async fn worker_loop(
    mut receiver: mpsc::Receiver<NotificationEvent>,
    channels: Vec<Arc<dyn NotificationChannel>>,
    settings: DispatcherSettings,
) {
    info!("Notification worker started with {} channel(s)", channels.len());

    while let Some(event) = receiver.recv().await {
        for channel in &channels {
            deliver_with_retry(channel.as_ref(), &event, &settings).await;
        }
    }

    info!("Notification worker stopped");
}

async fn deliver_with_retry(
    channel: &dyn NotificationChannel,
    event: &NotificationEvent,
    settings: &DispatcherSettings,
) {
    let mut delay = Duration::from_millis(settings.retry_delay_ms);

    for attempt in 1..=settings.max_attempts {
        match channel.deliver(event).await {
            Ok(()) => {
                debug!("{} delivered {} event", channel.name(), event.kind());
                return;
            }
            Err(e) if attempt < settings.max_attempts => {
                warn!(
                    "{} delivery of {} failed (attempt {}/{}): {}",
                    channel.name(),
                    event.kind(),
                    attempt,
                    settings.max_attempts,
                    e
                );
                tokio::time::sleep(delay).await;
                delay *= 2;
            }
            Err(e) => {
                error!(
                    "{} delivery of {} gave up after {} attempts: {}",
                    channel.name(),
                    event.kind(),
                    settings.max_attempts,
                    e
                );
            }
        }
    }
}
