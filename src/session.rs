//! Session seam
//!
//! The WhatsApp client library sits behind [`Session`] and [`SessionFactory`].
//! Everything above this module (supervisor, command dispatcher, gateway,
//! HTTP) talks only to these traits, so it runs the same against the real
//! client and against test doubles.

use async_trait::async_trait;
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::mpsc;

use crate::connection::DisconnectReason;

/// A group the session participates in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GroupSummary {
    pub id: String,
    pub name: String,
    pub size: usize,
}

/// Provider acknowledgement for an outbound message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SendReceipt {
    pub id: String,
    pub jid: String,
}

/// Inbound chat message, already reduced to what the command dispatcher needs.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InboundMessage {
    /// Conversation the message arrived in (user or group JID)
    pub chat_jid: String,
    pub sender_jid: String,
    pub from_me: bool,
    /// Plain text body, if the message carried any
    pub text: Option<String>,
}

/// Lifecycle and message notifications emitted by a live session.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    /// A new pairing code is available; the previous one is no longer valid.
    Qr(String),
    /// Socket is open and the session can send.
    Connected,
    /// Pairing finished and credentials were accepted.
    Authenticated,
    Closed(DisconnectReason),
    /// Writing the credential store failed; reconnecting later may force a re-pair.
    CredentialsFailed(String),
    Message(InboundMessage),
}

/// Where a session delivers its events.
///
/// Every sink is stamped with the generation of the session it was created
/// for, so the supervisor can drop events from sessions it already discarded.
#[derive(Debug, Clone)]
pub struct EventSink {
    generation: u64,
    tx: mpsc::UnboundedSender<(u64, SessionEvent)>,
}

impl EventSink {
    pub(crate) fn new(generation: u64, tx: mpsc::UnboundedSender<(u64, SessionEvent)>) -> Self {
        Self { generation, tx }
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Deliver an event. Returns false once the supervisor is gone.
    pub fn emit(&self, event: SessionEvent) -> bool {
        self.tx.send((self.generation, event)).is_ok()
    }
}

/// A live connection to the messaging network.
#[async_trait]
pub trait Session: Send + Sync {
    async fn send_text(&self, jid: &str, text: &str) -> anyhow::Result<SendReceipt>;

    async fn send_image(
        &self,
        jid: &str,
        image: Vec<u8>,
        caption: &str,
    ) -> anyhow::Result<SendReceipt>;

    /// Groups this account is a member of, in the provider's order.
    async fn participating_groups(&self) -> anyhow::Result<Vec<GroupSummary>>;

    /// Our own user JID, once known.
    async fn own_jid(&self) -> Option<String>;

    /// Close the connection. The handle is never used again afterwards.
    async fn shutdown(&self);
}

/// Builds a fresh [`Session`] bound to durable credential storage.
#[async_trait]
pub trait SessionFactory: Send + Sync {
    /// Start connecting and return immediately; progress arrives through `events`.
    async fn create(&self, events: EventSink) -> anyhow::Result<Arc<dyn Session>>;

    /// Forget the paired device so the next `create` pairs from scratch.
    /// Only called while no session is running.
    async fn reset(&self) -> anyhow::Result<()>;
}

#[cfg(test)]
pub(crate) mod mock {
    //! Recording test doubles for [`Session`] and [`SessionFactory`].

    use super::*;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    pub struct MockSession {
        pub sent_texts: Mutex<Vec<(String, String)>>,
        pub sent_images: Mutex<Vec<(String, usize, String)>>,
        pub groups: Mutex<Vec<GroupSummary>>,
        pub fail_groups: bool,
        pub fail_sends: bool,
        pub own: Option<String>,
        pub shutdowns: AtomicUsize,
        pub hang_shutdown: bool,
    }

    impl MockSession {
        pub fn with_groups(groups: Vec<GroupSummary>) -> Self {
            Self {
                groups: Mutex::new(groups),
                ..Default::default()
            }
        }

        pub fn texts(&self) -> Vec<(String, String)> {
            self.sent_texts.lock().unwrap().clone()
        }

        pub fn provider_calls(&self) -> usize {
            self.sent_texts.lock().unwrap().len() + self.sent_images.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl Session for MockSession {
        async fn send_text(&self, jid: &str, text: &str) -> anyhow::Result<SendReceipt> {
            if self.fail_sends {
                anyhow::bail!("provider rejected message");
            }
            let mut sent = self.sent_texts.lock().unwrap();
            sent.push((jid.to_string(), text.to_string()));
            Ok(SendReceipt {
                id: format!("MSG{}", sent.len()),
                jid: jid.to_string(),
            })
        }

        async fn send_image(
            &self,
            jid: &str,
            image: Vec<u8>,
            caption: &str,
        ) -> anyhow::Result<SendReceipt> {
            if self.fail_sends {
                anyhow::bail!("media upload failed");
            }
            let mut sent = self.sent_images.lock().unwrap();
            sent.push((jid.to_string(), image.len(), caption.to_string()));
            Ok(SendReceipt {
                id: format!("IMG{}", sent.len()),
                jid: jid.to_string(),
            })
        }

        async fn participating_groups(&self) -> anyhow::Result<Vec<GroupSummary>> {
            if self.fail_groups {
                anyhow::bail!("group query timed out");
            }
            Ok(self.groups.lock().unwrap().clone())
        }

        async fn own_jid(&self) -> Option<String> {
            self.own.clone()
        }

        async fn shutdown(&self) {
            self.shutdowns.fetch_add(1, Ordering::SeqCst);
            if self.hang_shutdown {
                std::future::pending::<()>().await;
            }
        }
    }

    /// Hands out the same [`MockSession`] on every `create`, and keeps the sinks
    /// so tests can play the library's role.
    #[derive(Default)]
    pub struct MockFactory {
        pub session: Arc<MockSession>,
        pub sinks: Mutex<Vec<EventSink>>,
        pub fail_first: AtomicUsize,
        pub resets: AtomicUsize,
    }

    impl MockFactory {
        pub fn new(session: MockSession) -> Self {
            Self {
                session: Arc::new(session),
                ..Default::default()
            }
        }

        pub fn creates(&self) -> usize {
            self.sinks.lock().unwrap().len()
        }

        pub fn latest_sink(&self) -> EventSink {
            self.sinks
                .lock()
                .unwrap()
                .last()
                .cloned()
                .expect("no session created yet")
        }

        pub fn emit(&self, event: SessionEvent) {
            self.latest_sink().emit(event);
        }
    }

    #[async_trait]
    impl SessionFactory for MockFactory {
        async fn create(&self, events: EventSink) -> anyhow::Result<Arc<dyn Session>> {
            self.sinks.lock().unwrap().push(events);
            let remaining = self.fail_first.load(Ordering::SeqCst);
            if remaining > 0 {
                self.fail_first.store(remaining - 1, Ordering::SeqCst);
                anyhow::bail!("store locked");
            }
            Ok(self.session.clone())
        }

        async fn reset(&self) -> anyhow::Result<()> {
            self.resets.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }
}
