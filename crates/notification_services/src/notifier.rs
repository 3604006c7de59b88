use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{Mutex, Semaphore, mpsc, watch};
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::sleep;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::chat::ChatClient;
use crate::message::{availability_message, digest_message};
use crate::types::{DigestSummary, NotificationError, NotificationEvent};

/// Configuration for the notification workers
#[derive(Debug, Clone)]
pub struct NotifierConfig {
    /// Maximum deliveries in flight at once (default: 4)
    pub workers: usize,

    /// Messages that may wait in the queue before new ones are dropped (default: 1024)
    pub queue_capacity: usize,

    /// Total delivery attempts per message (default: 3)
    pub max_attempts: u32,

    /// Backoff unit; attempt `n` waits `retry_base_delay * n` (default: 1 second)
    pub retry_base_delay: Duration,
}

impl Default for NotifierConfig {
    fn default() -> Self {
        Self {
            workers: 4,
            queue_capacity: 1024,
            max_attempts: 3,
            retry_base_delay: Duration::from_secs(1),
        }
    }
}

#[derive(Debug)]
enum Outbound {
    User { user_id: String, text: String },
    Channel { channel: String, text: String },
}

impl Outbound {
    fn target(&self) -> String {
        match self {
            Outbound::User { user_id, .. } => format!("user {}", user_id),
            Outbound::Channel { channel, .. } => format!("channel #{}", channel),
        }
    }
}

/// Queue-backed sender that delivers chat messages off the caller's path.
///
/// Cloning is cheap; every clone feeds the same queue and worker pool.
#[derive(Clone)]
pub struct Notifier {
    sender: mpsc::Sender<Outbound>,
    shutdown: Arc<watch::Sender<bool>>,
    dispatcher: Arc<Mutex<Option<JoinHandle<()>>>>,
}

impl Notifier {
    /// Spawns the dispatcher task and returns a handle to its queue
    pub fn start(client: Arc<dyn ChatClient>, config: NotifierConfig) -> Self {
        let (sender, receiver) = mpsc::channel(config.queue_capacity.max(1));
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        info!(
            "🚀 Starting notifier with {} workers (queue capacity {})",
            config.workers, config.queue_capacity
        );
        let handle = tokio::spawn(run_dispatcher(client, config, receiver, shutdown_rx));

        Self {
            sender,
            shutdown: Arc::new(shutdown_tx),
            dispatcher: Arc::new(Mutex::new(Some(handle))),
        }
    }

    /// Queues one message per subscription for the given events.
    ///
    /// Never waits for delivery. Messages that do not fit in the queue are
    /// logged and dropped. Returns the events whose message was queued.
    pub fn dispatch(&self, events: Vec<NotificationEvent>) -> Vec<NotificationEvent> {
        let mut groups: BTreeMap<Uuid, Vec<NotificationEvent>> = BTreeMap::new();
        for event in events {
            groups.entry(event.subscription_id).or_default().push(event);
        }

        let mut queued = Vec::new();
        for (subscription_id, group) in groups {
            let Some(first) = group.first() else {
                continue;
            };
            let message = Outbound::User {
                user_id: first.user_id.clone(),
                text: availability_message(&group),
            };

            match self.enqueue(message) {
                Ok(()) => queued.extend(group),
                Err(e) => warn!(
                    "Dropping notification for subscription {}: {}",
                    subscription_id, e
                ),
            }
        }

        queued
    }

    /// Queues the digest for the shared channel
    pub fn send_digest(
        &self,
        channel: &str,
        summary: &DigestSummary,
    ) -> Result<(), NotificationError> {
        self.enqueue(Outbound::Channel {
            channel: channel.to_string(),
            text: digest_message(summary),
        })
    }

    fn enqueue(&self, message: Outbound) -> Result<(), NotificationError> {
        self.sender.try_send(message).map_err(|e| match e {
            TrySendError::Full(_) => NotificationError::QueueFull,
            TrySendError::Closed(_) => NotificationError::QueueClosed,
        })
    }

    /// Stops accepting messages, then waits for queued ones to be delivered
    pub async fn shutdown(&self) {
        let _ = self.shutdown.send(true);

        let handle = self.dispatcher.lock().await.take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                error!("Notifier dispatcher panicked: {}", e);
            }
            info!("🛑 Notifier drained");
        }
    }
}

async fn run_dispatcher(
    client: Arc<dyn ChatClient>,
    config: NotifierConfig,
    mut receiver: mpsc::Receiver<Outbound>,
    mut shutdown: watch::Receiver<bool>,
) {
    let config = Arc::new(config);
    let permits = Arc::new(Semaphore::new(config.workers.max(1)));
    let mut deliveries = JoinSet::new();

    loop {
        tokio::select! {
            message = receiver.recv() => match message {
                Some(message) => {
                    spawn_delivery(&mut deliveries, &permits, &client, &config, message).await;
                }
                None => break,
            },
            _ = shutdown.changed() => {
                receiver.close();
                while let Some(message) = receiver.recv().await {
                    spawn_delivery(&mut deliveries, &permits, &client, &config, message).await;
                }
                break;
            }
        }
    }

    while let Some(result) = deliveries.join_next().await {
        if let Err(e) = result {
            error!("Notification delivery task failed: {}", e);
        }
    }
}

async fn spawn_delivery(
    deliveries: &mut JoinSet<()>,
    permits: &Arc<Semaphore>,
    client: &Arc<dyn ChatClient>,
    config: &Arc<NotifierConfig>,
    message: Outbound,
) {
    while let Some(result) = deliveries.try_join_next() {
        if let Err(e) = result {
            error!("Notification delivery task failed: {}", e);
        }
    }

    let Ok(permit) = permits.clone().acquire_owned().await else {
        error!("Worker pool closed, dropping message for {}", message.target());
        return;
    };

    let client = client.clone();
    let config = config.clone();
    deliveries.spawn(async move {
        deliver(client.as_ref(), &config, message).await;
        drop(permit);
    });
}

async fn deliver(client: &dyn ChatClient, config: &NotifierConfig, message: Outbound) {
    let target = message.target();
    let mut attempt = 1;

    loop {
        let result = match &message {
            Outbound::User { user_id, text } => client.send_to_user(user_id, text).await,
            Outbound::Channel { channel, text } => client.send_to_channel(channel, text).await,
        };

        match result {
            Ok(()) => {
                debug!("✅ Delivered message to {}", target);
                return;
            }
            Err(e) if e.is_transient() && attempt < config.max_attempts => {
                let delay = config.retry_base_delay * attempt;
                warn!(
                    "Delivery to {} failed (attempt {}/{}), retrying in {:?}: {}",
                    target, attempt, config.max_attempts, delay, e
                );
                sleep(delay).await;
                attempt += 1;
            }
            Err(e) => {
                error!(
                    "❌ Dropping message for {} after {} attempt(s): {}",
                    target, attempt, e
                );
                return;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::{NaiveDate, Utc};
    use std::sync::Mutex as StdMutex;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[derive(Default)]
    struct RecordingClient {
        delivered: StdMutex<Vec<(String, String)>>,
        attempts: AtomicU32,
        transient_failures: AtomicU32,
        reject: bool,
    }

    impl RecordingClient {
        fn failing(transient_failures: u32) -> Self {
            Self {
                transient_failures: AtomicU32::new(transient_failures),
                ..Default::default()
            }
        }

        fn record(&self, target: &str, text: &str) -> Result<(), NotificationError> {
            self.attempts.fetch_add(1, Ordering::SeqCst);
            if self.reject {
                return Err(NotificationError::Rejected("nope".to_string()));
            }
            let remaining = self.transient_failures.load(Ordering::SeqCst);
            if remaining > 0 {
                self.transient_failures.store(remaining - 1, Ordering::SeqCst);
                return Err(NotificationError::Transient("503".to_string()));
            }
            self.delivered
                .lock()
                .unwrap()
                .push((target.to_string(), text.to_string()));
            Ok(())
        }
    }

    #[async_trait]
    impl ChatClient for RecordingClient {
        async fn send_to_user(&self, user_id: &str, text: &str) -> Result<(), NotificationError> {
            self.record(user_id, text)
        }

        async fn send_to_channel(&self, channel: &str, text: &str) -> Result<(), NotificationError> {
            self.record(channel, text)
        }
    }

    fn fast_config() -> NotifierConfig {
        NotifierConfig {
            workers: 2,
            queue_capacity: 16,
            max_attempts: 3,
            retry_base_delay: Duration::from_millis(1),
        }
    }

    fn event(subscription_id: Uuid, user: &str, site: &str) -> NotificationEvent {
        NotificationEvent {
            subscription_id,
            user_id: user.to_string(),
            provider: "recreationdotgov".to_string(),
            campground_id: "232447".to_string(),
            site_id: site.to_string(),
            site_name: site.to_string(),
            day: NaiveDate::from_ymd_opt(2025, 8, 17).unwrap(),
            booking_url: format!("https://www.recreation.gov/camping/campsites/{}", site),
        }
    }

    #[tokio::test]
    async fn test_one_message_per_subscription() {
        let client = Arc::new(RecordingClient::default());
        let notifier = Notifier::start(client.clone(), fast_config());

        let first = Uuid::new_v4();
        let second = Uuid::new_v4();
        let queued = notifier.dispatch(vec![
            event(first, "U1", "C36"),
            event(first, "U1", "C37"),
            event(second, "U2", "C36"),
        ]);
        notifier.shutdown().await;

        assert_eq!(queued.len(), 3);
        let delivered = client.delivered.lock().unwrap();
        assert_eq!(delivered.len(), 2);
        let u1 = delivered.iter().find(|(to, _)| to == "U1").unwrap();
        assert!(u1.1.contains("C36") && u1.1.contains("C37"));
    }

    #[tokio::test]
    async fn test_transient_failures_are_retried() {
        let client = Arc::new(RecordingClient::failing(2));
        let notifier = Notifier::start(client.clone(), fast_config());

        notifier.dispatch(vec![event(Uuid::new_v4(), "U1", "C36")]);
        notifier.shutdown().await;

        assert_eq!(client.attempts.load(Ordering::SeqCst), 3);
        assert_eq!(client.delivered.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_gives_up_after_max_attempts() {
        let client = Arc::new(RecordingClient::failing(10));
        let notifier = Notifier::start(client.clone(), fast_config());

        notifier.dispatch(vec![event(Uuid::new_v4(), "U1", "C36")]);
        notifier.shutdown().await;

        assert_eq!(client.attempts.load(Ordering::SeqCst), 3);
        assert!(client.delivered.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_rejected_messages_are_not_retried() {
        let client = Arc::new(RecordingClient {
            reject: true,
            ..Default::default()
        });
        let notifier = Notifier::start(client.clone(), fast_config());

        notifier.dispatch(vec![event(Uuid::new_v4(), "U1", "C36")]);
        notifier.shutdown().await;

        assert_eq!(client.attempts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_digest_goes_to_channel_and_queue_closes() {
        let client = Arc::new(RecordingClient::default());
        let notifier = Notifier::start(client.clone(), fast_config());

        let now = Utc::now();
        let summary = DigestSummary {
            since: now - chrono::Duration::hours(24),
            until: now,
            notifications_sent: 0,
            users_notified: 0,
            active_subscriptions: 5,
            top_campgrounds: Vec::new(),
        };
        notifier.send_digest("general", &summary).unwrap();
        notifier.shutdown().await;

        assert_eq!(client.delivered.lock().unwrap()[0].0, "general");
        assert!(matches!(
            notifier.send_digest("general", &summary),
            Err(NotificationError::QueueClosed)
        ));
        assert!(
            notifier
                .dispatch(vec![event(Uuid::new_v4(), "U1", "C36")])
                .is_empty()
        );
    }

    #[tokio::test]
    async fn test_full_queue_drops_and_reports_only_queued_events() {
        let client = Arc::new(RecordingClient::default());
        let notifier = Notifier::start(
            client.clone(),
            NotifierConfig {
                queue_capacity: 1,
                ..fast_config()
            },
        );

        // the dispatcher cannot drain before this synchronous call returns
        let queued = notifier.dispatch(vec![
            event(Uuid::new_v4(), "U1", "C36"),
            event(Uuid::new_v4(), "U2", "C36"),
            event(Uuid::new_v4(), "U3", "C36"),
        ]);
        notifier.shutdown().await;

        assert_eq!(queued.len(), 1);
        let delivered = client.delivered.lock().unwrap();
        assert_eq!(delivered.len(), 1);
        assert_eq!(delivered[0].0, queued[0].user_id);
    }
}
