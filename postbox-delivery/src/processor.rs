//! Periodic drain of the delivery queue.

use std::{fmt, sync::Arc, time::Duration};

use postbox_common::{
    Signal,
    address::{Address, RouteClass},
    internal,
    tracing::{debug, info, warn},
};
use postbox_smtp::RelayClient;
use postbox_store::{MailboxStore, PendingDelivery, ServerContext, StoreError};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast::{Receiver, error::RecvError};

use crate::{
    error::DeliveryError,
    format::{local_message, relay_payload},
    transport::RelayTransport,
};

/// Drains closer together than this are raised to it.
pub const MIN_INTERVAL_MS: u64 = 1000;

const fn default_interval() -> u64 {
    3000
}

fn default_network_pattern() -> String {
    r"\w+\.internal".to_string()
}

const fn default_network_port() -> u16 {
    2025
}

fn default_relay_host() -> String {
    "localhost".to_string()
}

const fn default_relay_port() -> u16 {
    25
}

/// When a pending delivery leaves the queue.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Removal {
    /// As soon as one recipient succeeds in a pass. Recipients that failed
    /// in that pass are not retried.
    #[default]
    AnyRecipient,
    /// Delivered recipients are dropped from the entry; the entry goes once
    /// none remain.
    AllRecipients,
}

/// What one drain pass did.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DrainReport {
    /// Recipient attempts made.
    pub attempted: usize,
    /// Recipient attempts that succeeded.
    pub delivered: usize,
    /// Queue entries removed.
    pub removed: usize,
    /// Another pass was already running, so nothing was done.
    pub skipped: bool,
}

impl fmt::Display for DrainReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.skipped {
            f.write_str("skipped, drain already in progress")
        } else {
            write!(
                f,
                "{} attempted, {} delivered, {} removed",
                self.attempted, self.delivered, self.removed
            )
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct DeliveryProcessor {
    /// Time between drain passes, in milliseconds
    #[serde(default = "default_interval")]
    pub interval_ms: u64,

    /// Domains matching this pattern are relayed straight to the named host
    #[serde(default = "default_network_pattern")]
    pub network_pattern: String,

    /// Submission port on network-local hosts
    #[serde(default = "default_network_port")]
    pub network_port: u16,

    /// Where external recipients are relayed
    #[serde(default = "default_relay_host")]
    pub relay_host: String,

    #[serde(default = "default_relay_port")]
    pub relay_port: u16,

    #[serde(default)]
    pub removal: Removal,

    #[serde(skip)]
    context: Option<Arc<ServerContext>>,

    #[serde(skip)]
    transport: Option<Arc<dyn RelayTransport>>,
}

impl Default for DeliveryProcessor {
    fn default() -> Self {
        Self {
            interval_ms: default_interval(),
            network_pattern: default_network_pattern(),
            network_port: default_network_port(),
            relay_host: default_relay_host(),
            relay_port: default_relay_port(),
            removal: Removal::default(),
            context: None,
            transport: None,
        }
    }
}

impl DeliveryProcessor {
    /// Replace the relay used for non-local recipients.
    #[must_use]
    pub fn with_transport(mut self, transport: Arc<dyn RelayTransport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Attach the server context and settle the configuration.
    ///
    /// Without a transport set, relaying goes over TCP announcing the
    /// context's hostname.
    pub fn init(&mut self, context: Arc<ServerContext>) {
        internal!("Initialising delivery processor ...");

        if self.interval_ms < MIN_INTERVAL_MS {
            warn!(
                "Drain interval of {}ms is below the minimum, using {MIN_INTERVAL_MS}ms",
                self.interval_ms
            );
            self.interval_ms = MIN_INTERVAL_MS;
        }

        if self.transport.is_none() {
            self.transport = Some(Arc::new(RelayClient::new(context.hostname())));
        }

        self.context = Some(context);
    }

    #[must_use]
    pub const fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    fn parts(&self) -> Result<(&Arc<ServerContext>, &Arc<dyn RelayTransport>), DeliveryError> {
        match (&self.context, &self.transport) {
            (Some(context), Some(transport)) => Ok((context, transport)),
            _ => Err(DeliveryError::NotInitialised),
        }
    }

    /// Drain on a timer until told to stop.
    ///
    /// A pass in progress when the shutdown signal arrives is allowed to
    /// finish.
    #[tracing::instrument(level = tracing::Level::TRACE, skip_all)]
    pub async fn serve(&self, mut shutdown: Receiver<Signal>) -> Result<(), DeliveryError> {
        self.parts()?;
        internal!(
            level = INFO,
            "Delivery processor starting, draining every {}ms",
            self.interval_ms
        );

        let mut timer = tokio::time::interval(self.interval());
        timer.tick().await;

        loop {
            tokio::select! {
                _ = timer.tick() => {
                    match self.drain().await {
                        Ok(report) if report.attempted > 0 => info!("Drain pass: {report}"),
                        Ok(report) => debug!("Drain pass: {report}"),
                        Err(e) => warn!("Drain pass failed: {e}"),
                    }
                }

                sig = shutdown.recv() => {
                    match sig {
                        Ok(Signal::Shutdown) | Err(RecvError::Closed) => {
                            internal!(level = INFO, "Delivery processor shutting down");
                            return Ok(());
                        }
                        Err(RecvError::Lagged(_)) => {}
                    }
                }
            }
        }
    }

    /// Run one pass over everything currently queued.
    ///
    /// Returns at once with [`DrainReport::skipped`] set if another pass
    /// holds the queue.
    pub async fn drain(&self) -> Result<DrainReport, DeliveryError> {
        let (context, transport) = self.parts()?;
        let queue = context.queue();

        let Some(_draining) = queue.try_begin_drain() else {
            debug!("Drain already in progress");
            return Ok(DrainReport {
                skipped: true,
                ..DrainReport::default()
            });
        };

        let mut report = DrainReport::default();
        let mut stored_locally = false;

        for delivery in queue.snapshot() {
            let mut delivered = Vec::new();

            for recipient in &delivery.recipients {
                report.attempted += 1;

                match self
                    .deliver(context, transport.as_ref(), &delivery, recipient)
                    .await
                {
                    Ok(Some(class)) => {
                        debug!(id = %delivery.id, %recipient, %class, "Delivered");
                        stored_locally |= class == RouteClass::ServerLocal;
                        report.delivered += 1;
                        delivered.push(recipient.clone());
                    }
                    Ok(None) => {}
                    Err(e) => warn!(id = %delivery.id, %recipient, "Delivery failed: {e}"),
                }
            }

            if delivered.is_empty() {
                continue;
            }

            let removed = match self.removal {
                Removal::AnyRecipient => queue.remove(&delivery.id).is_some(),
                Removal::AllRecipients => queue.complete_recipients(&delivery.id, &delivered),
            };

            if removed {
                report.removed += 1;
            }
        }

        if stored_locally && let Err(e) = context.mailboxes().persist().await {
            warn!("Failed to persist mailboxes after drain: {e}");
        }

        Ok(report)
    }

    /// Deliver to one recipient. `Ok(None)` means it stays queued.
    async fn deliver(
        &self,
        context: &ServerContext,
        transport: &dyn RelayTransport,
        delivery: &PendingDelivery,
        recipient: &Address,
    ) -> Result<Option<RouteClass>, DeliveryError> {
        let hostname = context.hostname();
        let class = context.classifier().classify_address(recipient);
        debug!(id = %delivery.id, %recipient, %class, "Routing");

        let (host, port) = match class {
            RouteClass::ServerLocal => {
                return match context.mailboxes().find_user(recipient.local_part()) {
                    Ok(mailbox) => {
                        mailbox.append_message(&local_message(delivery, recipient, hostname));
                        Ok(Some(class))
                    }
                    Err(StoreError::NoSuchUser(_)) => {
                        debug!(%recipient, "No such local user, leaving queued");
                        Ok(None)
                    }
                    Err(e) => Err(e.into()),
                };
            }
            RouteClass::NetworkLocal => (recipient.domain(), self.network_port),
            RouteClass::External => (self.relay_host.as_str(), self.relay_port),
        };

        let outcome = transport
            .relay(
                host,
                port,
                &delivery.sender.parsed(),
                &recipient.parsed(),
                &relay_payload(delivery, recipient, hostname),
            )
            .await?;

        if outcome.is_delivered() {
            Ok(Some(class))
        } else {
            debug!(%recipient, "Relay via {host}:{port} refused: {outcome:?}");
            Ok(None)
        }
    }
}

#[cfg(test)]
mod tests {
    use std::net::{IpAddr, Ipv4Addr};

    use async_trait::async_trait;
    use postbox_common::address::Classifier;
    use postbox_smtp::{RelayOutcome, client::ClientError};
    use postbox_store::MemoryStore;
    use pretty_assertions::assert_eq;

    use super::*;

    /// Accepts every recipient except those listed in `refuse`.
    #[derive(Debug, Default)]
    struct FakeRelay {
        refuse: Vec<String>,
        calls: std::sync::Mutex<Vec<(String, u16, String, String)>>,
    }

    #[async_trait]
    impl RelayTransport for FakeRelay {
        async fn relay(
            &self,
            host: &str,
            port: u16,
            sender: &str,
            recipient: &str,
            payload: &str,
        ) -> Result<RelayOutcome, ClientError> {
            assert!(payload.starts_with("Received: from "));
            self.calls.lock().unwrap().push((
                host.to_string(),
                port,
                sender.to_string(),
                recipient.to_string(),
            ));

            if self.refuse.iter().any(|r| r == recipient) {
                Ok(RelayOutcome::Rejected {
                    state: postbox_smtp::client::RelayState::End,
                    last_reply: Some("221 bye".to_string()),
                })
            } else {
                Ok(RelayOutcome::Delivered)
            }
        }
    }

    fn context() -> Arc<ServerContext> {
        let store = MemoryStore::new();
        store.add_user("bob", "pw").unwrap();
        Arc::new(ServerContext::new(
            Classifier::new("mail.example.org", r"\w+\.lan").unwrap(),
            Arc::new(store),
        ))
    }

    fn processor(
        context: &Arc<ServerContext>,
        relay: &Arc<FakeRelay>,
        removal: Removal,
    ) -> DeliveryProcessor {
        let mut processor = DeliveryProcessor {
            relay_host: "smarthost.example.net".to_string(),
            relay_port: 587,
            removal,
            ..DeliveryProcessor::default()
        }
        .with_transport(Arc::clone(relay) as Arc<dyn RelayTransport>);
        processor.init(Arc::clone(context));
        processor
    }

    fn enqueue(context: &ServerContext, recipients: &[&str]) -> postbox_store::DeliveryId {
        context.queue().enqueue(PendingDelivery::new(
            Address::parse("carol@client.lan").unwrap(),
            recipients
                .iter()
                .map(|r| Address::parse(r).unwrap())
                .collect(),
            "Subject: hi\r\n\r\nhello\r\n".to_string(),
            "client.lan".to_string(),
            IpAddr::V4(Ipv4Addr::new(10, 0, 0, 9)),
        ))
    }

    #[tokio::test]
    async fn local_delivery_appends_and_removes() {
        let context = context();
        let relay = Arc::new(FakeRelay::default());
        let processor = processor(&context, &relay, Removal::AnyRecipient);
        enqueue(&context, &["bob@mail.example.org"]);

        let report = processor.drain().await.unwrap();
        assert_eq!(
            report,
            DrainReport {
                attempted: 1,
                delivered: 1,
                removed: 1,
                skipped: false,
            }
        );
        assert!(context.queue().is_empty());

        let bob = context.mailboxes().find_user("bob").unwrap();
        assert_eq!(bob.message_count(), 1);
        assert!(
            bob.message_headers(0)
                .unwrap()
                .starts_with("Return-Path: <carol@client.lan>\nReceived: from client.lan")
        );
        assert_eq!(bob.message_body(0).unwrap(), "hello\n");
        assert!(relay.calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn missing_local_user_stays_queued() {
        let context = context();
        let relay = Arc::new(FakeRelay::default());
        let processor = processor(&context, &relay, Removal::AnyRecipient);
        enqueue(&context, &["ghost@mail.example.org"]);

        let report = processor.drain().await.unwrap();
        assert_eq!(report.attempted, 1);
        assert_eq!(report.delivered, 0);
        assert_eq!(context.queue().len(), 1);
    }

    #[tokio::test]
    async fn routes_by_class() {
        let context = context();
        let relay = Arc::new(FakeRelay::default());
        let processor = processor(&context, &relay, Removal::AllRecipients);
        enqueue(&context, &["dave@peer.lan", "erin@elsewhere.com"]);

        processor.drain().await.unwrap();

        assert_eq!(
            *relay.calls.lock().unwrap(),
            vec![
                (
                    "peer.lan".to_string(),
                    2025,
                    "carol@client.lan".to_string(),
                    "dave@peer.lan".to_string()
                ),
                (
                    "smarthost.example.net".to_string(),
                    587,
                    "carol@client.lan".to_string(),
                    "erin@elsewhere.com".to_string()
                ),
            ]
        );
        assert!(context.queue().is_empty());
    }

    #[tokio::test]
    async fn any_recipient_drops_partially_delivered_message() {
        let context = context();
        let relay = Arc::new(FakeRelay {
            refuse: vec!["erin@elsewhere.com".to_string()],
            ..FakeRelay::default()
        });
        let processor = processor(&context, &relay, Removal::AnyRecipient);
        enqueue(&context, &["bob@mail.example.org", "erin@elsewhere.com"]);

        let report = processor.drain().await.unwrap();
        assert_eq!(report.delivered, 1);
        assert_eq!(report.removed, 1);
        assert!(context.queue().is_empty());
    }

    #[tokio::test]
    async fn all_recipients_keeps_the_failures() {
        let context = context();
        let relay = Arc::new(FakeRelay {
            refuse: vec!["erin@elsewhere.com".to_string()],
            ..FakeRelay::default()
        });
        let processor = processor(&context, &relay, Removal::AllRecipients);
        let id = enqueue(&context, &["bob@mail.example.org", "erin@elsewhere.com"]);

        let report = processor.drain().await.unwrap();
        assert_eq!(report.delivered, 1);
        assert_eq!(report.removed, 0);

        let remaining = context.queue().get(&id).unwrap();
        assert_eq!(
            remaining.recipients,
            vec![Address::parse("erin@elsewhere.com").unwrap()]
        );

        processor.drain().await.unwrap();
        assert_eq!(context.mailboxes().find_user("bob").unwrap().message_count(), 1);
        assert_eq!(context.queue().len(), 1);
    }

    #[tokio::test]
    async fn concurrent_drain_is_skipped() {
        let context = context();
        let relay = Arc::new(FakeRelay::default());
        let processor = processor(&context, &relay, Removal::AnyRecipient);
        enqueue(&context, &["bob@mail.example.org"]);

        let guard = context.queue().try_begin_drain().unwrap();
        let report = processor.drain().await.unwrap();
        assert!(report.skipped);
        assert_eq!(context.queue().len(), 1);

        drop(guard);
        assert!(!processor.drain().await.unwrap().skipped);
        assert!(context.queue().is_empty());
    }

    #[tokio::test]
    async fn uninitialised_processor_refuses_to_drain() {
        let processor = DeliveryProcessor::default();
        assert!(matches!(
            processor.drain().await,
            Err(DeliveryError::NotInitialised)
        ));
    }

    #[test]
    fn interval_is_clamped() {
        let mut processor = DeliveryProcessor {
            interval_ms: 10,
            ..DeliveryProcessor::default()
        };
        processor.init(context());
        assert_eq!(processor.interval(), Duration::from_millis(MIN_INTERVAL_MS));
    }

    #[test]
    fn config_defaults() {
        let processor: DeliveryProcessor =
            ron::from_str("(relay_port: 2525, removal: AllRecipients)").unwrap();

        assert_eq!(processor.interval_ms, 3000);
        assert_eq!(processor.network_pattern, r"\w+\.internal");
        assert_eq!(processor.network_port, 2025);
        assert_eq!(processor.relay_host, "localhost");
        assert_eq!(processor.relay_port, 2525);
        assert_eq!(processor.removal, Removal::AllRecipients);
    }
}
