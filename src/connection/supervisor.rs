//! Connection supervisor
//!
//! A single task owns the session handle and the [`Lifecycle`]. Commands from
//! the rest of the process, events from the current session, and expired
//! reconnect timers all arrive on channels and are handled one at a time.
//!
//! Every session is created with a fresh generation number. Discarding a
//! session bumps the generation too, so events from an old session and timers
//! scheduled for it are recognised as stale and dropped.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use super::machine::{ConnectionEvent, Effect, Lifecycle};
use super::status::StatusHandle;
use crate::commands;
use crate::qr;
use crate::session::{EventSink, Session, SessionEvent, SessionFactory};
use crate::utils::RetryConfig;

pub const READY_NOTICE: &str = "Bot berhasil aktif dan siap digunakan ✅";

/// Upper bound on closing a session or wiping its credentials.
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone)]
pub struct SupervisorOptions {
    pub retry: RetryConfig,
    /// Send [`READY_NOTICE`] to our own chat the first time a connection opens
    pub notify_on_ready: bool,
    pub print_qr_in_terminal: bool,
}

impl Default for SupervisorOptions {
    fn default() -> Self {
        Self {
            retry: RetryConfig::default(),
            notify_on_ready: true,
            print_qr_in_terminal: false,
        }
    }
}

enum Command {
    Start,
    Refresh,
    Shutdown(oneshot::Sender<()>),
}

/// Cloneable handle to the supervisor task.
#[derive(Clone)]
pub struct SupervisorHandle {
    commands: mpsc::UnboundedSender<Command>,
    status: StatusHandle,
}

impl SupervisorHandle {
    /// Ask for a session to be started. Ignored while one already exists.
    pub fn start(&self) -> bool {
        self.commands.send(Command::Start).is_ok()
    }

    /// Discard the current session and start a new one immediately,
    /// resetting the retry budget.
    pub fn refresh(&self) -> bool {
        self.commands.send(Command::Refresh).is_ok()
    }

    pub fn status(&self) -> &StatusHandle {
        &self.status
    }

    pub async fn online_session(&self) -> Option<Arc<dyn Session>> {
        self.status.online_session().await
    }

    /// Close the session and stop the supervisor task.
    pub async fn shutdown(&self) {
        let (ack_tx, ack_rx) = oneshot::channel();
        if self.commands.send(Command::Shutdown(ack_tx)).is_ok() {
            let _ = ack_rx.await;
        }
    }
}

pub struct Supervisor {
    factory: Arc<dyn SessionFactory>,
    options: SupervisorOptions,
    lifecycle: Lifecycle,
    status: StatusHandle,
    session: Option<Arc<dyn Session>>,
    generation: u64,
    events_tx: mpsc::UnboundedSender<(u64, SessionEvent)>,
    restart_tx: mpsc::UnboundedSender<u64>,
}

impl Supervisor {
    /// Spawn the supervisor task. No session is created until
    /// [`SupervisorHandle::start`] is called.
    pub fn spawn(
        factory: Arc<dyn SessionFactory>,
        options: SupervisorOptions,
    ) -> (SupervisorHandle, JoinHandle<()>) {
        let (commands_tx, commands_rx) = mpsc::unbounded_channel();
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (restart_tx, restart_rx) = mpsc::unbounded_channel();
        let status = StatusHandle::new();

        let supervisor = Supervisor {
            factory,
            lifecycle: Lifecycle::new(options.retry.clone(), options.notify_on_ready),
            options,
            status: status.clone(),
            session: None,
            generation: 0,
            events_tx,
            restart_tx,
        };
        let task = tokio::spawn(supervisor.run(commands_rx, events_rx, restart_rx));

        (
            SupervisorHandle {
                commands: commands_tx,
                status,
            },
            task,
        )
    }

    async fn run(
        mut self,
        mut commands: mpsc::UnboundedReceiver<Command>,
        mut events: mpsc::UnboundedReceiver<(u64, SessionEvent)>,
        mut restarts: mpsc::UnboundedReceiver<u64>,
    ) {
        tracing::debug!("Connection supervisor started");

        loop {
            tokio::select! {
                command = commands.recv() => match command {
                    Some(Command::Start) => {
                        if self.session.is_some() {
                            tracing::debug!("Start ignored, session already running");
                        } else {
                            self.start_session().await;
                        }
                    }
                    Some(Command::Refresh) => {
                        tracing::info!("Refresh requested, restarting session");
                        self.apply(ConnectionEvent::Refresh).await;
                    }
                    Some(Command::Shutdown(ack)) => {
                        if let Some(session) = self.detach_session().await {
                            close(session).await;
                        }
                        let _ = ack.send(());
                        break;
                    }
                    None => {
                        if let Some(session) = self.detach_session().await {
                            close(session).await;
                        }
                        break;
                    }
                },
                Some((generation, event)) = events.recv() => {
                    if generation == self.generation {
                        self.on_session_event(event).await;
                    } else {
                        tracing::debug!(
                            "Dropping event from stale session {} (current {})",
                            generation,
                            self.generation
                        );
                    }
                }
                Some(generation) = restarts.recv() => {
                    if generation == self.generation && self.session.is_none() {
                        self.start_session().await;
                    }
                }
            }
        }

        tracing::debug!("Connection supervisor stopped");
    }

    async fn start_session(&mut self) {
        self.generation += 1;
        tracing::info!("Starting WhatsApp session (generation {})", self.generation);
        self.apply(ConnectionEvent::Starting).await;

        let sink = EventSink::new(self.generation, self.events_tx.clone());
        match self.factory.create(sink).await {
            Ok(session) => {
                self.session = Some(session.clone());
                self.status.set_session(Some(session)).await;
            }
            Err(e) => {
                tracing::error!("Failed to start WhatsApp session: {:#}", e);
                self.apply(ConnectionEvent::StartFailed(format!("{:#}", e)))
                    .await;
            }
        }
    }

    async fn on_session_event(&mut self, event: SessionEvent) {
        let event = match event {
            SessionEvent::Qr(raw) => {
                tracing::info!("New pairing QR code available");
                if self.options.print_qr_in_terminal
                    && let Some(rendered) = qr::render_unicode(&raw)
                {
                    println!("\n{}\nScan with WhatsApp > Linked Devices\n", rendered);
                }
                match qr::payload(&raw) {
                    Ok(payload) => ConnectionEvent::QrIssued(payload),
                    Err(e) => {
                        tracing::error!("Failed to render QR code: {}", e);
                        ConnectionEvent::QrEncodeFailed(e.to_string())
                    }
                }
            }
            SessionEvent::Connected => ConnectionEvent::Opened {
                authenticated: false,
            },
            SessionEvent::Authenticated => ConnectionEvent::Opened {
                authenticated: true,
            },
            SessionEvent::Closed(reason) => {
                if reason.is_logged_out() {
                    tracing::warn!("WhatsApp session logged out, re-pairing required");
                } else {
                    tracing::warn!("WhatsApp connection closed: {}", reason);
                }
                ConnectionEvent::Closed(reason)
            }
            SessionEvent::CredentialsFailed(err) => {
                tracing::error!("Failed to persist WhatsApp credentials: {}", err);
                ConnectionEvent::CredentialsFailed(err)
            }
            SessionEvent::Message(message) => {
                if let Some(session) = self.session.clone() {
                    tokio::spawn(async move {
                        commands::dispatch(session.as_ref(), &message).await;
                    });
                }
                return;
            }
        };
        self.apply(event).await;
    }

    async fn apply(&mut self, event: ConnectionEvent) {
        let (next, effects) = self.lifecycle.clone().transition(event);
        self.lifecycle = next;

        for effect in effects {
            match effect {
                Effect::DiscardSession => self.discard_session().await,
                Effect::ClearCredentials => self.clear_credentials().await,
                Effect::StartSession { delay } => self.schedule_start(delay),
                Effect::SendReadyNotice => self.send_ready_notice(),
            }
        }

        let state = self.lifecycle.state.clone();
        tracing::debug!("Connection status: {} ({})", state.status, state.message());
        self.status.publish(state).await;
    }

    /// Forget the current session without waiting for it to close.
    async fn detach_session(&mut self) -> Option<Arc<dyn Session>> {
        self.generation += 1;
        self.status.set_session(None).await;
        self.session.take()
    }

    /// Closing runs on its own task so a stuck socket never stalls commands.
    async fn discard_session(&mut self) {
        if let Some(session) = self.detach_session().await {
            tokio::spawn(close(session));
        }
    }

    async fn clear_credentials(&self) {
        match tokio::time::timeout(SHUTDOWN_TIMEOUT, self.factory.reset()).await {
            Ok(Ok(())) => tracing::info!("Cleared stored credentials, a new QR code will follow"),
            Ok(Err(e)) => tracing::error!("Failed to clear stored credentials: {:#}", e),
            Err(_) => tracing::error!("Clearing stored credentials timed out"),
        }
    }

    fn schedule_start(&self, delay: Duration) {
        let generation = self.generation;
        if delay.is_zero() {
            let _ = self.restart_tx.send(generation);
            return;
        }
        tracing::info!("Reconnecting in {:?}", delay);
        let restart_tx = self.restart_tx.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = restart_tx.send(generation);
        });
    }

    fn send_ready_notice(&self) {
        let Some(session) = self.session.clone() else {
            return;
        };
        tokio::spawn(async move {
            let Some(own) = session.own_jid().await else {
                tracing::debug!("Own JID unknown, skipping ready notice");
                return;
            };
            match session.send_text(&own, READY_NOTICE).await {
                Ok(_) => tracing::info!("Ready notice sent to {}", own),
                Err(e) => tracing::warn!("Failed to send ready notice: {}", e),
            }
        });
    }
}

async fn close(session: Arc<dyn Session>) {
    if tokio::time::timeout(SHUTDOWN_TIMEOUT, session.shutdown())
        .await
        .is_err()
    {
        tracing::warn!(
            "Session shutdown still pending after {:?}, dropping it",
            SHUTDOWN_TIMEOUT
        );
    }
}
