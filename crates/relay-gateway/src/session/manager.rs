//! Session manager
//!
//! Drives sessions through their lifecycle against the shared broker channel
//! and routes consumed messages to live connections through the registry.

use super::{Attach, Session, SessionError, SessionResult};
use crate::connection::{Connection, ConnectionRegistry};
use crate::protocol::CloseCode;
use futures_util::StreamExt;
use relay_core::{translate, BrokerChannel, ConsumerTag, Delivery, DeliveryStream};
use std::sync::Arc;

/// What happened to a consumed message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryOutcome {
    /// Queued on the client's connection
    Delivered,
    /// Payload was not a known envelope
    Undecodable,
    /// No live connection holds the name
    NoConnection,
}

/// Owns the per-client session lifecycle
pub struct SessionManager {
    broker: Arc<dyn BrokerChannel>,
    registry: Arc<ConnectionRegistry>,
    exchange: String,
}

impl SessionManager {
    /// Create a session manager
    pub fn new(
        broker: Arc<dyn BrokerChannel>,
        registry: Arc<ConnectionRegistry>,
        exchange: impl Into<String>,
    ) -> Self {
        Self {
            broker,
            registry,
            exchange: exchange.into(),
        }
    }

    /// Get the connection registry
    pub fn registry(&self) -> &Arc<ConnectionRegistry> {
        &self.registry
    }

    /// Get the exchange name
    pub fn exchange(&self) -> &str {
        &self.exchange
    }

    /// Claim the connection's name and create its session
    ///
    /// Nothing on the broker is touched when the name is already held.
    pub fn open(&self, connection: Arc<Connection>) -> SessionResult<Arc<Session>> {
        self.registry.register(connection.clone())?;
        tracing::info!(name = %connection.name(), "Session opened");
        Ok(Session::new(connection))
    }

    /// Assert the session's topology and start consuming
    ///
    /// Returns the delivery stream, or `None` if the client left before the
    /// consumer was attached (the consumer has been cancelled by then). A
    /// close that lands mid-setup keeps the name claimed until setup is over.
    pub async fn establish(&self, session: &Session) -> SessionResult<Option<DeliveryStream>> {
        if !session.begin_setup() {
            tracing::debug!(name = %session.name(), "Session closed before topology setup");
            return Ok(None);
        }

        let result = self.setup(session).await;

        if session.finish_setup() {
            self.registry.release(session.connection());
            tracing::info!(name = %session.name(), "Session closed");
        }

        result
    }

    async fn setup(&self, session: &Session) -> SessionResult<Option<DeliveryStream>> {
        let name = session.name();

        self.broker
            .declare_exchange(&self.exchange)
            .await
            .map_err(SessionError::Topology)?;
        self.broker
            .declare_queue(name)
            .await
            .map_err(SessionError::Topology)?;
        self.broker
            .bind_queue(name, &self.exchange, name)
            .await
            .map_err(SessionError::Topology)?;

        session.topology_ready();
        tracing::debug!(name = %name, exchange = %self.exchange, "Topology ready");

        // Consume even if the client already left: the cancel below lets the
        // broker reclaim the auto-delete queue.
        let (tag, deliveries) = self
            .broker
            .consume(name)
            .await
            .map_err(SessionError::Consume)?
            .into_parts();

        match session.attach_consumer(tag)? {
            Attach::Consuming => {
                tracing::info!(
                    name = %name,
                    consumer_tag = ?session.consumer_tag(),
                    "Session consuming"
                );
                Ok(Some(deliveries))
            }
            Attach::CancelNow(tag) => {
                tracing::debug!(name = %name, consumer_tag = %tag, "Session closed during consume");
                self.cancel(session, &tag).await;
                Ok(None)
            }
        }
    }

    /// Publish a client frame
    ///
    /// Malformed frames are dropped. Returns the number of publishes made.
    pub async fn forward(&self, session: &Session, frame: &str) -> usize {
        let publications = match translate::outbound(session.name(), frame) {
            Ok(publications) => publications,
            Err(e) => {
                tracing::debug!(
                    name = %session.name(),
                    error = %e,
                    code = e.code(),
                    "Dropping client frame"
                );
                return 0;
            }
        };

        let mut published = 0;
        for publication in publications {
            let payload = match publication.payload() {
                Ok(payload) => payload,
                Err(e) => {
                    tracing::warn!(name = %session.name(), error = %e, "Failed to encode envelope");
                    continue;
                }
            };

            match self
                .broker
                .publish(&self.exchange, &publication.routing_key, &payload)
                .await
            {
                Ok(()) => {
                    published += 1;
                    tracing::trace!(
                        from = %session.name(),
                        to = %publication.routing_key,
                        kind = publication.envelope.kind(),
                        "Published"
                    );
                }
                Err(e) => {
                    tracing::warn!(
                        name = %session.name(),
                        routing_key = %publication.routing_key,
                        error = %e,
                        "Publish failed"
                    );
                }
            }
        }

        published
    }

    /// Route a consumed message to the session's connection, then acknowledge it
    ///
    /// The ack is sent whatever the outcome.
    pub async fn deliver(&self, session: &Session, delivery: Delivery) -> DeliveryOutcome {
        let outcome = self.dispatch(session, &delivery);

        if let Err(e) = self.broker.ack(delivery.delivery_tag).await {
            tracing::warn!(
                name = %session.name(),
                delivery_tag = delivery.delivery_tag,
                error = %e,
                "Ack failed"
            );
        }

        outcome
    }

    fn dispatch(&self, session: &Session, delivery: &Delivery) -> DeliveryOutcome {
        let name = session.name();
        let frame = match translate::inbound(&delivery.data).and_then(|envelope| {
            envelope
                .to_json()
                .map_err(relay_core::TranslateError::Encode)
        }) {
            Ok(frame) => frame,
            Err(e) => {
                tracing::debug!(
                    name = %name,
                    delivery_tag = delivery.delivery_tag,
                    exchange = %delivery.exchange,
                    routing_key = %delivery.routing_key,
                    redelivered = delivery.redelivered,
                    error = %e,
                    "Dropping broker message"
                );
                return DeliveryOutcome::Undecodable;
            }
        };

        // Only the connection this consumer was opened for; a newer holder
        // of the name gets its own queue contents through its own consumer.
        let delivered = self
            .registry
            .lookup(name)
            .filter(|connection| connection.id() == session.connection().id())
            .is_some_and(|connection| connection.send_text(frame));

        if delivered {
            tracing::trace!(
                name = %name,
                delivery_tag = delivery.delivery_tag,
                redelivered = delivery.redelivered,
                "Delivered"
            );
            DeliveryOutcome::Delivered
        } else {
            tracing::debug!(
                name = %name,
                delivery_tag = delivery.delivery_tag,
                routing_key = %delivery.routing_key,
                "No live connection for delivery"
            );
            DeliveryOutcome::NoConnection
        }
    }

    /// Deliver until the consumer is cancelled
    ///
    /// If the stream ends while the session is still open the broker dropped
    /// the consumer, and the client is told so.
    pub async fn run_deliveries(&self, session: Arc<Session>, mut deliveries: DeliveryStream) {
        while let Some(item) = deliveries.next().await {
            match item {
                Ok(delivery) => {
                    self.deliver(&session, delivery).await;
                }
                Err(e) => {
                    tracing::warn!(name = %session.name(), error = %e, "Delivery stream error");
                    if e.is_fatal() {
                        break;
                    }
                }
            }
        }

        if !session.is_closed() {
            tracing::warn!(name = %session.name(), "Consumer ended while session open");
            session.connection().close(CloseCode::BrokerUnavailable);
        }

        tracing::debug!(name = %session.name(), "Delivery loop ended");
    }

    /// Tear a session down
    ///
    /// Cancels the consumer if one is attached and releases the name. Safe to
    /// call any number of times from any task; later callers return once the
    /// first teardown is done. If setup is still running the name is
    /// released when it finishes instead.
    pub async fn close(&self, session: &Session) {
        let _guard = session.lock_teardown().await;
        let Some(teardown) = session.close() else {
            return;
        };

        if let Some(tag) = teardown.consumer_tag {
            self.cancel(session, &tag).await;
        }

        if teardown.release {
            self.registry.release(session.connection());
            tracing::info!(name = %session.name(), "Session closed");
        } else {
            tracing::debug!(name = %session.name(), "Session closed during setup");
        }
    }

    async fn cancel(&self, session: &Session, tag: &ConsumerTag) {
        if let Err(e) = self.broker.cancel(tag).await {
            session.record_cancel_failure();
            tracing::warn!(
                name = %session.name(),
                consumer_tag = %tag,
                error = %e,
                "Consumer cancel failed"
            );
        }
    }
}

impl std::fmt::Debug for SessionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionManager")
            .field("exchange", &self.exchange)
            .field("registry", &self.registry)
            .finish()
    }
}
