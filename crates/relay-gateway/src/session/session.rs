//! Session state cell
//!
//! Tracks one client's lifecycle phase and consumer tag. Closing and consumer
//! attachment both go through the same lock, so a close that lands while the
//! consume call is in flight is seen by the attachment and the tag is handed
//! back for immediate cancellation. The name stays claimed until that late
//! cancel has run, so a reconnect cannot declare the queue the cancel is about
//! to auto-delete.

use super::{SessionError, SessionResult};
use crate::connection::Connection;
use parking_lot::Mutex;
use relay_core::ConsumerTag;
use std::sync::Arc;
use tokio::sync::MutexGuard;

/// Session lifecycle phase
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Name claimed, topology not yet asserted
    Connecting,
    /// Exchange, queue and binding are in place
    TopologyReady,
    /// A consumer is delivering to this session
    Consuming,
    /// Terminal
    Closed,
}

/// Result of attaching a consumer tag
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Attach {
    /// The session is now consuming
    Consuming,
    /// The session closed while consume was in flight; cancel this tag now
    CancelNow(ConsumerTag),
}

/// Work left to do after a session is marked closed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Teardown {
    /// Consumer to cancel, if one was attached and not yet cancelled
    pub consumer_tag: Option<ConsumerTag>,
    /// Release the name now; `false` while setup is still running
    pub release: bool,
}

struct Inner {
    state: SessionState,
    consumer_tag: Option<ConsumerTag>,
    cancel_issued: bool,
    cancel_failed: bool,
    setup_in_flight: bool,
    release_deferred: bool,
}

/// One client's session
pub struct Session {
    connection: Arc<Connection>,
    inner: Mutex<Inner>,
    /// Serializes teardown so later closers wait for the first one
    teardown: tokio::sync::Mutex<()>,
}

impl Session {
    /// Create a session in the `Connecting` state
    pub fn new(connection: Arc<Connection>) -> Arc<Self> {
        Arc::new(Self {
            connection,
            inner: Mutex::new(Inner {
                state: SessionState::Connecting,
                consumer_tag: None,
                cancel_issued: false,
                cancel_failed: false,
                setup_in_flight: false,
                release_deferred: false,
            }),
            teardown: tokio::sync::Mutex::new(()),
        })
    }

    /// Get the client name
    pub fn name(&self) -> &str {
        self.connection.name()
    }

    /// Get the connection
    pub fn connection(&self) -> &Arc<Connection> {
        &self.connection
    }

    /// Get the current state
    pub fn state(&self) -> SessionState {
        self.inner.lock().state
    }

    /// Get the attached consumer tag
    pub fn consumer_tag(&self) -> Option<ConsumerTag> {
        self.inner.lock().consumer_tag.clone()
    }

    /// Check if the session is closed
    pub fn is_closed(&self) -> bool {
        self.state() == SessionState::Closed
    }

    /// Mark broker setup as running
    ///
    /// Returns `false` if the session already closed.
    pub fn begin_setup(&self) -> bool {
        let mut inner = self.inner.lock();
        if inner.state == SessionState::Closed {
            return false;
        }
        inner.setup_in_flight = true;
        true
    }

    /// Mark broker setup as finished
    ///
    /// Returns `true` if a close happened meanwhile and the name is still
    /// waiting to be released.
    pub fn finish_setup(&self) -> bool {
        let mut inner = self.inner.lock();
        inner.setup_in_flight = false;
        std::mem::take(&mut inner.release_deferred)
    }

    /// Record that cancelling the consumer failed
    pub fn record_cancel_failure(&self) {
        self.inner.lock().cancel_failed = true;
    }

    /// Check if the consumer may still be delivering after close
    pub fn cancel_failed(&self) -> bool {
        self.inner.lock().cancel_failed
    }

    pub(crate) async fn lock_teardown(&self) -> MutexGuard<'_, ()> {
        self.teardown.lock().await
    }

    /// Move `Connecting` to `TopologyReady`
    ///
    /// Returns `false` if the session is no longer connecting.
    pub fn topology_ready(&self) -> bool {
        let mut inner = self.inner.lock();
        if inner.state != SessionState::Connecting {
            return false;
        }
        inner.state = SessionState::TopologyReady;
        true
    }

    /// Attach the consumer tag returned by the broker
    pub fn attach_consumer(&self, tag: ConsumerTag) -> SessionResult<Attach> {
        let mut inner = self.inner.lock();
        if inner.consumer_tag.is_some() {
            return Err(SessionError::AlreadyAttached);
        }
        inner.consumer_tag = Some(tag.clone());

        if inner.state == SessionState::Closed {
            inner.cancel_issued = true;
            return Ok(Attach::CancelNow(tag));
        }

        inner.state = SessionState::Consuming;
        Ok(Attach::Consuming)
    }

    /// Mark the session closed
    ///
    /// Returns `None` if it was already closed. Otherwise the returned teardown
    /// carries the consumer tag to cancel, at most once over the session's life.
    pub fn close(&self) -> Option<Teardown> {
        let mut inner = self.inner.lock();
        if inner.state == SessionState::Closed {
            return None;
        }
        inner.state = SessionState::Closed;

        let consumer_tag = match &inner.consumer_tag {
            Some(tag) if !inner.cancel_issued => Some(tag.clone()),
            _ => None,
        };
        if consumer_tag.is_some() {
            inner.cancel_issued = true;
        }

        let release = !inner.setup_in_flight;
        if !release {
            inner.release_deferred = true;
        }

        Some(Teardown {
            consumer_tag,
            release,
        })
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.inner.lock();
        f.debug_struct("Session")
            .field("name", &self.name())
            .field("state", &inner.state)
            .field("consumer_tag", &inner.consumer_tag)
            .finish()
    }
}
