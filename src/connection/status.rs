//! Published connection status
//!
//! The supervisor is the only writer. HTTP handlers and the gateway read
//! through cheap clones of [`StatusHandle`].

use std::sync::Arc;
use tokio::sync::RwLock;

use super::state::ConnectionState;
use crate::session::Session;

#[derive(Default)]
struct Published {
    state: ConnectionState,
    session: Option<Arc<dyn Session>>,
}

/// Shared, read-mostly view of the current connection.
///
/// State and session handle live under one lock so a reader never sees a
/// status that belongs to a different session than the handle it gets.
#[derive(Clone, Default)]
pub struct StatusHandle {
    inner: Arc<RwLock<Published>>,
}

impl StatusHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn snapshot(&self) -> ConnectionState {
        self.inner.read().await.state.clone()
    }

    /// The live session, but only while it is connected or authenticated.
    pub async fn online_session(&self) -> Option<Arc<dyn Session>> {
        let published = self.inner.read().await;
        if published.state.status.is_online() {
            published.session.clone()
        } else {
            None
        }
    }

    pub async fn is_online(&self) -> bool {
        self.online_session().await.is_some()
    }

    pub(crate) async fn publish(&self, state: ConnectionState) {
        self.inner.write().await.state = state;
    }

    pub(crate) async fn set_session(&self, session: Option<Arc<dyn Session>>) {
        self.inner.write().await.session = session;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::ConnectionStatus;
    use crate::session::mock::MockSession;

    #[tokio::test]
    async fn test_session_hidden_until_online() {
        let status = StatusHandle::new();
        status
            .set_session(Some(Arc::new(MockSession::default())))
            .await;
        status
            .publish(ConnectionState::new(ConnectionStatus::Connecting))
            .await;
        assert!(status.online_session().await.is_none());

        status
            .publish(ConnectionState::new(ConnectionStatus::Connected))
            .await;
        assert!(status.is_online().await);

        status.set_session(None).await;
        assert!(!status.is_online().await);
    }

    #[tokio::test]
    async fn test_snapshot_defaults_to_disconnected() {
        let snapshot = StatusHandle::new().snapshot().await;
        assert_eq!(snapshot.status, ConnectionStatus::Disconnected);
        assert!(snapshot.qr.is_none());
    }
}
