//! Outbound gateway
//!
//! Validates send and group-listing requests and forwards them to the live
//! session. Nothing reaches the provider unless the connection is online.

use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use crate::connection::StatusHandle;
use crate::error::{GatewayError, Result};
use crate::session::{GroupSummary, SendReceipt, Session};

const USER_SERVER: &str = "s.whatsapp.net";

#[derive(Clone)]
pub struct OutboundGateway {
    status: StatusHandle,
    media_base: PathBuf,
}

impl OutboundGateway {
    pub fn new(status: StatusHandle, media_base: impl Into<PathBuf>) -> Self {
        Self {
            status,
            media_base: media_base.into(),
        }
    }

    pub fn media_base(&self) -> &Path {
        &self.media_base
    }

    /// `NotConnected`, or `Terminal` once the account has been logged out.
    pub async fn ensure_online(&self) -> Result<()> {
        self.session().await.map(|_| ())
    }

    async fn session(&self) -> Result<Arc<dyn Session>> {
        if let Some(session) = self.status.online_session().await {
            return Ok(session);
        }
        if self.status.snapshot().await.is_terminal() {
            Err(GatewayError::Terminal)
        } else {
            Err(GatewayError::NotConnected)
        }
    }

    pub async fn send_text(&self, jid: &str, message: &str) -> Result<SendReceipt> {
        let session = self.session().await?;
        let jid = normalize_jid(jid)?;
        if message.trim().is_empty() {
            return Err(GatewayError::invalid("message must not be empty"));
        }

        tracing::info!("Sending text message to {}", jid);
        let receipt = session
            .send_text(&jid, message)
            .await
            .map_err(GatewayError::send_failed)?;
        tracing::debug!("Message {} delivered to {}", receipt.id, jid);
        Ok(receipt)
    }

    pub async fn send_image(
        &self,
        jid: &str,
        file_path: &str,
        caption: Option<&str>,
    ) -> Result<SendReceipt> {
        let session = self.session().await?;
        let jid = normalize_jid(jid)?;

        let path = resolve_media_path(&self.media_base, file_path)?;
        tracing::debug!("Looking for image at {:?}", path);
        if !tokio::fs::try_exists(&path).await.unwrap_or(false) {
            return Err(GatewayError::NotFound(file_path.to_string()));
        }
        let path = self.confine(&path).await?;

        let bytes = tokio::fs::read(&path)
            .await
            .map_err(|e| GatewayError::Internal(format!("failed to read {:?}: {}", path, e)))?;

        tracing::info!("Sending image {:?} ({} bytes) to {}", path, bytes.len(), jid);
        session
            .send_image(&jid, bytes, caption.unwrap_or_default())
            .await
            .map_err(GatewayError::send_failed)
    }

    pub async fn list_groups(&self) -> Result<Vec<GroupSummary>> {
        let session = self.session().await?;
        session
            .participating_groups()
            .await
            .map_err(GatewayError::send_failed)
    }

    /// Resolve symlinks and make sure the file still sits under the media base.
    async fn confine(&self, path: &Path) -> Result<PathBuf> {
        let base = tokio::fs::canonicalize(&self.media_base)
            .await
            .map_err(|e| GatewayError::Internal(format!("media directory unavailable: {}", e)))?;
        let resolved = tokio::fs::canonicalize(path)
            .await
            .map_err(|e| GatewayError::Internal(format!("failed to resolve {:?}: {}", path, e)))?;
        if !resolved.starts_with(&base) {
            tracing::warn!("Rejected media path escaping base directory: {:?}", path);
            return Err(GatewayError::invalid("file_path escapes the media directory"));
        }
        Ok(resolved)
    }
}

/// Turn a bare phone number into a user JID. Full JIDs pass through.
pub fn normalize_jid(input: &str) -> Result<String> {
    let input = input.trim();
    if input.is_empty() {
        return Err(GatewayError::invalid("jid must not be empty"));
    }
    if let Some((user, server)) = input.split_once('@') {
        if user.is_empty() || server.is_empty() {
            return Err(GatewayError::invalid(format!("malformed jid: {}", input)));
        }
        return Ok(input.to_string());
    }

    let digits: String = input
        .trim_start_matches('+')
        .chars()
        .filter(|c| !matches!(c, ' ' | '-'))
        .collect();
    if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_digit()) {
        return Err(GatewayError::invalid(format!(
            "not a phone number or jid: {}",
            input
        )));
    }
    Ok(format!("{}@{}", digits, USER_SERVER))
}

/// Join a client-supplied relative path onto `base`, lexically.
///
/// Only plain relative paths are accepted: no root, no drive prefix, no `..`.
/// Symlinks are dealt with later, once the file is known to exist.
pub fn resolve_media_path(base: &Path, file_path: &str) -> Result<PathBuf> {
    let relative = Path::new(file_path.trim());
    if relative.as_os_str().is_empty() {
        return Err(GatewayError::invalid("file_path must not be empty"));
    }

    let mut resolved = base.to_path_buf();
    for component in relative.components() {
        match component {
            Component::Normal(part) => resolved.push(part),
            Component::CurDir => {}
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => {
                return Err(GatewayError::invalid(format!(
                    "file_path must be relative to the media directory: {}",
                    file_path
                )));
            }
        }
    }
    if resolved == base {
        return Err(GatewayError::invalid("file_path must name a file"));
    }
    Ok(resolved)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::{ConnectionState, ConnectionStatus};
    use crate::session::mock::MockSession;
    use tempfile::TempDir;

    async fn online(session: Arc<MockSession>) -> StatusHandle {
        let status = StatusHandle::new();
        status.set_session(Some(session)).await;
        status
            .publish(ConnectionState::new(ConnectionStatus::Connected))
            .await;
        status
    }

    #[test]
    fn test_normalize_jid() {
        assert_eq!(
            normalize_jid("+62 812-3456-7890").unwrap(),
            "6281234567890@s.whatsapp.net"
        );
        assert_eq!(
            normalize_jid("6281234567890").unwrap(),
            "6281234567890@s.whatsapp.net"
        );
        assert_eq!(normalize_jid("120363042@g.us").unwrap(), "120363042@g.us");
        assert!(normalize_jid("  ").is_err());
        assert!(normalize_jid("@g.us").is_err());
        assert!(normalize_jid("budi").is_err());
    }

    #[test]
    fn test_resolve_media_path_lexical() {
        let base = Path::new("/srv/public");
        assert_eq!(
            resolve_media_path(base, "qris/bayar.png").unwrap(),
            PathBuf::from("/srv/public/qris/bayar.png")
        );
        assert_eq!(
            resolve_media_path(base, "./a.png").unwrap(),
            PathBuf::from("/srv/public/a.png")
        );
        for bad in ["../etc/passwd", "a/../../b.png", "/etc/passwd", "", ".", "  "] {
            assert!(
                matches!(
                    resolve_media_path(base, bad),
                    Err(GatewayError::InvalidArgument(_))
                ),
                "accepted {:?}",
                bad
            );
        }
    }

    #[tokio::test]
    async fn test_send_text_without_session_never_calls_provider() {
        let session = Arc::new(MockSession::default());
        let status = StatusHandle::new();
        status.set_session(Some(session.clone())).await;
        let gateway = OutboundGateway::new(status, "/tmp");

        let err = gateway.send_text("6281", "halo").await.unwrap_err();
        assert!(matches!(err, GatewayError::NotConnected));
        assert_eq!(session.provider_calls(), 0);

        let gateway = OutboundGateway::new(StatusHandle::new(), "/tmp");
        assert!(matches!(
            gateway.list_groups().await,
            Err(GatewayError::NotConnected)
        ));
    }

    #[tokio::test]
    async fn test_logged_out_is_terminal() {
        let status = StatusHandle::new();
        status.publish(ConnectionState::logged_out()).await;
        let gateway = OutboundGateway::new(status, "/tmp");

        assert!(matches!(
            gateway.send_text("6281", "halo").await,
            Err(GatewayError::Terminal)
        ));
        assert!(matches!(
            gateway.ensure_online().await,
            Err(GatewayError::Terminal)
        ));
    }

    #[tokio::test]
    async fn test_send_text_normalizes_number() {
        let session = Arc::new(MockSession::default());
        let gateway = OutboundGateway::new(online(session.clone()).await, "/tmp");

        let receipt = gateway.send_text("+6281234", "halo").await.unwrap();
        assert_eq!(receipt.jid, "6281234@s.whatsapp.net");
        assert_eq!(
            session.texts(),
            vec![("6281234@s.whatsapp.net".to_string(), "halo".to_string())]
        );

        assert!(matches!(
            gateway.send_text("6281234", "   ").await,
            Err(GatewayError::InvalidArgument(_))
        ));
    }

    #[tokio::test]
    async fn test_provider_failure_becomes_send_failed() {
        let session = Arc::new(MockSession {
            fail_sends: true,
            ..Default::default()
        });
        let gateway = OutboundGateway::new(online(session).await, "/tmp");
        let err = gateway.send_text("6281", "halo").await.unwrap_err();
        assert!(matches!(err, GatewayError::SendFailed(ref text) if text.contains("rejected")));
    }

    #[tokio::test]
    async fn test_send_image_reads_from_base() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir(dir.path().join("bukti")).unwrap();
        std::fs::write(dir.path().join("bukti/tf.png"), b"\x89PNG\r\n\x1a\nfake").unwrap();

        let session = Arc::new(MockSession::default());
        let gateway = OutboundGateway::new(online(session.clone()).await, dir.path());

        let receipt = gateway
            .send_image("120363042@g.us", "bukti/tf.png", Some("Bukti transfer"))
            .await
            .unwrap();
        assert_eq!(receipt.jid, "120363042@g.us");

        let images = session.sent_images.lock().unwrap().clone();
        assert_eq!(
            images,
            vec![("120363042@g.us".to_string(), 12, "Bukti transfer".to_string())]
        );
    }

    #[tokio::test]
    async fn test_send_image_missing_and_traversal() {
        let dir = TempDir::new().unwrap();
        let outside = TempDir::new().unwrap();
        std::fs::write(outside.path().join("secret.png"), b"nope").unwrap();

        let session = Arc::new(MockSession::default());
        let gateway = OutboundGateway::new(online(session.clone()).await, dir.path());

        assert!(matches!(
            gateway.send_image("6281", "missing.png", None).await,
            Err(GatewayError::NotFound(_))
        ));
        assert!(matches!(
            gateway.send_image("6281", "../secret.png", None).await,
            Err(GatewayError::InvalidArgument(_))
        ));
        let absolute = outside.path().join("secret.png");
        assert!(matches!(
            gateway
                .send_image("6281", absolute.to_str().unwrap(), None)
                .await,
            Err(GatewayError::InvalidArgument(_))
        ));
        assert_eq!(session.provider_calls(), 0);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_send_image_rejects_symlink_escape() {
        let dir = TempDir::new().unwrap();
        let outside = TempDir::new().unwrap();
        std::fs::write(outside.path().join("secret.png"), b"nope").unwrap();
        std::os::unix::fs::symlink(outside.path().join("secret.png"), dir.path().join("link.png"))
            .unwrap();

        let session = Arc::new(MockSession::default());
        let gateway = OutboundGateway::new(online(session.clone()).await, dir.path());

        assert!(matches!(
            gateway.send_image("6281", "link.png", None).await,
            Err(GatewayError::InvalidArgument(_))
        ));
        assert_eq!(session.provider_calls(), 0);
    }

    #[tokio::test]
    async fn test_list_groups() {
        let session = Arc::new(MockSession::with_groups(vec![GroupSummary {
            id: "1@g.us".into(),
            name: "RT 05".into(),
            size: 40,
        }]));
        let gateway = OutboundGateway::new(online(session).await, "/tmp");
        let groups = gateway.list_groups().await.unwrap();
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].size, 40);
    }
}
