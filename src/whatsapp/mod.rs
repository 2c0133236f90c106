//! WhatsApp Web session
//!
//! [`SessionFactory`] implementation over `whatsapp-rust`. Each session gets
//! its own bot and socket but shares the one credential store, so a restart
//! reconnects without pairing again.

pub mod backend;
pub mod message;

use async_trait::async_trait;
use std::sync::{Arc, Mutex};
use tokio::sync::OnceCell;
use tokio::task::JoinHandle;

use wacore::types::events::Event;
use wacore_binary::jid::Jid;
use whatsapp_rust::bot::Bot;
use whatsapp_rust::client::Client;
use whatsapp_rust_tokio_transport::TokioWebSocketTransportFactory;
use whatsapp_rust_ureq_http_client::UreqHttpClient;

use crate::config::WhatsAppConfig;
use crate::connection::DisconnectReason;
use crate::session::{EventSink, GroupSummary, SendReceipt, Session, SessionEvent, SessionFactory};
use crate::store::CredentialStore;
use crate::utils::{RetryConfig, retry};

pub use backend::StoreBackend;

pub struct WhatsAppFactory {
    config: WhatsAppConfig,
    retry: RetryConfig,
    store: OnceCell<CredentialStore>,
}

impl WhatsAppFactory {
    /// `retry` governs individual sends, not reconnection.
    pub fn new(config: WhatsAppConfig, retry: RetryConfig) -> Self {
        Self {
            config,
            retry,
            store: OnceCell::new(),
        }
    }

    async fn store(&self) -> anyhow::Result<&CredentialStore> {
        self.store
            .get_or_try_init(|| async {
                let path = self.config.store_path();
                CredentialStore::open(&path).await
            })
            .await
    }
}

/// Map a library event onto the session event the supervisor understands.
///
/// Every way the socket can end becomes a `Closed`, so the supervisor never
/// sits in `connected` on a dead connection.
fn to_session_event(event: &Event) -> Option<SessionEvent> {
    let closed = |reason| Some(SessionEvent::Closed(reason));
    match event {
        Event::PairingQrCode { code, .. } => Some(SessionEvent::Qr(code.clone())),
        Event::PairSuccess(_) => Some(SessionEvent::Authenticated),
        Event::Connected(_) => Some(SessionEvent::Connected),
        Event::LoggedOut(_) => closed(DisconnectReason::LoggedOut),
        Event::Disconnected(_) => closed(DisconnectReason::ConnectionLost),
        Event::StreamReplaced(_) => closed(DisconnectReason::ConnectionReplaced),
        Event::ConnectFailure(failure) if failure.reason.is_logged_out() => {
            closed(DisconnectReason::LoggedOut)
        }
        Event::ConnectFailure(failure) => closed(reason_from_code(failure.reason.code())),
        Event::TemporaryBan(_) => closed(DisconnectReason::Other(402)),
        Event::ClientOutdated(_) => closed(DisconnectReason::Other(405)),
        Event::StreamError(err) => closed(
            err.code
                .parse::<i32>()
                .map(reason_from_code)
                .unwrap_or(DisconnectReason::BadSession),
        ),
        Event::Message(msg, info) => Some(SessionEvent::Message(message::to_inbound(msg, info))),
        _ => None,
    }
}

fn reason_from_code(code: i32) -> DisconnectReason {
    u16::try_from(code)
        .map(DisconnectReason::from_code)
        .unwrap_or(DisconnectReason::Other(0))
}

/// Translate library events into session events.
fn forward(event: &Event, events: &EventSink) {
    let Some(forwarded) = to_session_event(event) else {
        tracing::trace!("WhatsApp: unhandled event: {:?}", event);
        return;
    };
    match &forwarded {
        SessionEvent::Qr(_) => tracing::info!("WhatsApp: pairing QR code available"),
        SessionEvent::Authenticated => tracing::info!("WhatsApp: pairing successful"),
        SessionEvent::Connected => tracing::info!("WhatsApp: connected"),
        SessionEvent::Closed(reason) => tracing::warn!("WhatsApp: connection closed: {}", reason),
        _ => {}
    }
    if !events.emit(forwarded) {
        tracing::debug!(
            "WhatsApp: supervisor gone, dropping event for generation {}",
            events.generation()
        );
    }
}

#[async_trait]
impl SessionFactory for WhatsAppFactory {
    async fn create(&self, events: EventSink) -> anyhow::Result<Arc<dyn Session>> {
        let store = self.store().await?.with_events(events.clone());
        let backend = Arc::new(StoreBackend::new(store));
        match backend.is_paired().await {
            Ok(true) => tracing::info!("WhatsApp: resuming paired session"),
            Ok(false) => tracing::info!("WhatsApp: no paired device, expecting QR pairing"),
            Err(e) => tracing::warn!("WhatsApp: couldn't check device state: {}", e),
        }

        let mut bot = Bot::builder()
            .with_backend(backend)
            .with_transport_factory(TokioWebSocketTransportFactory::new())
            .with_http_client(UreqHttpClient::new())
            .with_device_props(
                Some(self.config.device_name.clone()),
                None,
                Some(waproto::whatsapp::device_props::PlatformType::Desktop),
            )
            .on_event(move |event, _client| {
                let events = events.clone();
                async move {
                    forward(&event, &events);
                }
            })
            .build()
            .await
            .map_err(|e| anyhow::anyhow!("failed to build WhatsApp client: {}", e))?;

        let client = bot.client();
        let handle = bot
            .run()
            .await
            .map_err(|e| anyhow::anyhow!("failed to start WhatsApp client: {}", e))?;

        Ok(Arc::new(WhatsAppSession {
            client,
            retry: self.retry.clone(),
            handle: Mutex::new(Some(handle)),
        }))
    }

    async fn reset(&self) -> anyhow::Result<()> {
        let store = self.store().await?;
        store
            .clear()
            .await
            .map_err(|e| anyhow::anyhow!("failed to clear {:?}: {}", store.path(), e))?;
        tracing::info!("WhatsApp: paired device forgotten");
        Ok(())
    }
}

pub struct WhatsAppSession {
    client: Arc<Client>,
    retry: RetryConfig,
    handle: Mutex<Option<JoinHandle<()>>>,
}

fn parse_jid(jid: &str) -> anyhow::Result<Jid> {
    jid.parse()
        .map_err(|e| anyhow::anyhow!("invalid WhatsApp JID '{}': {}", jid, e))
}

impl WhatsAppSession {
    async fn deliver(&self, jid: &str, msg: waproto::whatsapp::Message) -> anyhow::Result<SendReceipt> {
        let target = parse_jid(jid)?;
        let id = retry(&self.retry, || {
            let client = self.client.clone();
            let target = target.clone();
            let msg = msg.clone();
            async move { client.send_message(target, msg).await }
        })
        .await
        .map_err(|e| anyhow::anyhow!("send to {} failed: {}", jid, e))?;
        Ok(SendReceipt {
            id,
            jid: jid.to_string(),
        })
    }
}

#[async_trait]
impl Session for WhatsAppSession {
    async fn send_text(&self, jid: &str, text: &str) -> anyhow::Result<SendReceipt> {
        let msg = waproto::whatsapp::Message {
            conversation: Some(text.to_string()),
            ..Default::default()
        };
        self.deliver(jid, msg).await
    }

    async fn send_image(
        &self,
        jid: &str,
        image: Vec<u8>,
        caption: &str,
    ) -> anyhow::Result<SendReceipt> {
        let mimetype = image::guess_format(&image)
            .map(|format| format.to_mime_type())
            .unwrap_or("image/jpeg");

        let upload = self
            .client
            .upload(image, whatsapp_rust::download::MediaType::Image)
            .await
            .map_err(|e| anyhow::anyhow!("image upload failed: {}", e))?;

        let msg = waproto::whatsapp::Message {
            image_message: Some(Box::new(waproto::whatsapp::message::ImageMessage {
                mimetype: Some(mimetype.to_string()),
                caption: (!caption.is_empty()).then(|| caption.to_string()),
                url: Some(upload.url),
                direct_path: Some(upload.direct_path),
                media_key: Some(upload.media_key),
                file_enc_sha256: Some(upload.file_enc_sha256),
                file_sha256: Some(upload.file_sha256),
                file_length: Some(upload.file_length),
                ..Default::default()
            })),
            ..Default::default()
        };
        self.deliver(jid, msg).await
    }

    async fn participating_groups(&self) -> anyhow::Result<Vec<GroupSummary>> {
        let groups = self
            .client
            .groups()
            .get_participating()
            .await
            .map_err(|e| anyhow::anyhow!("group query failed: {}", e))?;

        Ok(groups
            .into_values()
            .map(|meta| GroupSummary {
                id: meta.id.to_string(),
                name: meta.subject,
                size: meta.participants.len(),
            })
            .collect())
    }

    async fn own_jid(&self) -> Option<String> {
        self.client
            .get_pn()
            .await
            .map(|jid| format!("{}@{}", jid.user, jid.server))
    }

    async fn shutdown(&self) {
        self.client.disconnect().await;
        let handle = match self.handle.lock() {
            Ok(mut guard) => guard.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        if let Some(handle) = handle {
            handle.abort();
        }
        tracing::debug!("WhatsApp: session shut down");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wacore::types::events::{
        ClientOutdated, ConnectFailure, ConnectFailureReason, Connected, Disconnected,
        StreamError, StreamReplaced, TempBanReason, TemporaryBan,
    };

    fn closed(event: Event) -> DisconnectReason {
        match to_session_event(&event) {
            Some(SessionEvent::Closed(reason)) => reason,
            other => panic!("expected Closed, got {:?}", other),
        }
    }

    fn connect_failure(reason: ConnectFailureReason) -> Event {
        Event::ConnectFailure(ConnectFailure {
            reason,
            message: String::new(),
            raw: None,
        })
    }

    #[test]
    fn test_open_events() {
        assert!(matches!(
            to_session_event(&Event::Connected(Connected)),
            Some(SessionEvent::Connected)
        ));
        assert_eq!(
            closed(Event::Disconnected(Disconnected)),
            DisconnectReason::ConnectionLost
        );
    }

    #[test]
    fn test_stream_replaced_is_replacement() {
        assert_eq!(
            closed(Event::StreamReplaced(StreamReplaced)),
            DisconnectReason::ConnectionReplaced
        );
    }

    #[test]
    fn test_connect_failure_logout_reasons_are_terminal() {
        for reason in [
            ConnectFailureReason::LoggedOut,
            ConnectFailureReason::MainDeviceGone,
            ConnectFailureReason::UnknownLogout,
        ] {
            assert_eq!(closed(connect_failure(reason)), DisconnectReason::LoggedOut);
        }
    }

    #[test]
    fn test_connect_failure_other_reasons_reconnect() {
        let reason = closed(connect_failure(ConnectFailureReason::Generic));
        assert_eq!(reason, DisconnectReason::from_code(400));
        assert!(!reason.is_logged_out());
    }

    #[test]
    fn test_ban_and_outdated_client_close() {
        let ban = Event::TemporaryBan(TemporaryBan {
            code: TempBanReason::Unknown(0),
            expire: chrono::Duration::zero(),
        });
        assert_eq!(closed(ban), DisconnectReason::Other(402));
        assert_eq!(
            closed(Event::ClientOutdated(ClientOutdated)),
            DisconnectReason::Other(405)
        );
    }

    #[test]
    fn test_stream_error_uses_its_code() {
        let err = |code: &str| {
            Event::StreamError(StreamError {
                code: code.to_string(),
                raw: None,
            })
        };
        assert_eq!(closed(err("515")), DisconnectReason::RestartRequired);
        assert_eq!(closed(err("503")), DisconnectReason::Other(503));
        assert_eq!(closed(err("conflict")), DisconnectReason::BadSession);
    }
}
