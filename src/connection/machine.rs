//! Connection lifecycle state machine
//!
//! Pure transition function: given the current lifecycle and one event, it
//! returns the next lifecycle plus the side effects the supervisor must run.
//! No I/O happens here, which keeps the reconnection policy testable.

use std::time::Duration;

use super::state::{ConnectionState, ConnectionStatus, DisconnectReason, QrPayload};
use crate::utils::RetryConfig;

/// Inputs to the state machine.
#[derive(Debug, Clone, PartialEq)]
pub enum ConnectionEvent {
    /// The supervisor began building a new session.
    Starting,
    /// Building the session failed before it emitted anything.
    StartFailed(String),
    QrIssued(QrPayload),
    QrEncodeFailed(String),
    Opened { authenticated: bool },
    Closed(DisconnectReason),
    CredentialsFailed(String),
    /// Operator-forced restart.
    Refresh,
}

/// Side effects requested by a transition, executed in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    /// Shut down and drop the current session handle.
    DiscardSession,
    /// Forget the paired device. Only follows a `DiscardSession`.
    ClearCredentials,
    /// Build a fresh session after `delay`.
    StartSession { delay: Duration },
    SendReadyNotice,
}

#[derive(Debug, Clone)]
pub struct Lifecycle {
    pub state: ConnectionState,
    /// Consecutive failed connection attempts since the last successful open
    pub attempts: u32,
    ready_notice_sent: bool,
    notify_on_ready: bool,
    policy: RetryConfig,
}

impl Lifecycle {
    pub fn new(policy: RetryConfig, notify_on_ready: bool) -> Self {
        Self {
            state: ConnectionState::default(),
            attempts: 0,
            ready_notice_sent: false,
            notify_on_ready,
            policy,
        }
    }

    pub fn transition(mut self, event: ConnectionEvent) -> (Self, Vec<Effect>) {
        let mut effects = Vec::new();

        match event {
            ConnectionEvent::Starting => {
                self.state = ConnectionState::new(ConnectionStatus::Connecting);
            }

            ConnectionEvent::StartFailed(err) => {
                self.attempts = self.attempts.saturating_add(1);
                let message = match self.schedule_restart(&mut effects) {
                    Some(delay) => format!(
                        "failed to start session: {} (retrying in {:?})",
                        err, delay
                    ),
                    None => format!(
                        "failed to start session: {} (gave up after {} attempts)",
                        err, self.policy.max_attempts
                    ),
                };
                self.state = ConnectionState::new(ConnectionStatus::Error).with_message(message);
            }

            ConnectionEvent::QrIssued(qr) => {
                self.state = ConnectionState::qr_ready(qr);
            }

            ConnectionEvent::QrEncodeFailed(err) => {
                self.state = ConnectionState::new(ConnectionStatus::Error)
                    .with_message(format!("failed to render QR code: {}", err));
            }

            ConnectionEvent::Opened { authenticated } => {
                let status = if authenticated || self.state.status == ConnectionStatus::Authenticated
                {
                    ConnectionStatus::Authenticated
                } else {
                    ConnectionStatus::Connected
                };
                self.state = ConnectionState::new(status);
                self.attempts = 0;
                if self.notify_on_ready && !self.ready_notice_sent {
                    self.ready_notice_sent = true;
                    effects.push(Effect::SendReadyNotice);
                }
            }

            ConnectionEvent::Closed(reason) if reason.is_logged_out() => {
                self.attempts = 0;
                self.state = ConnectionState::logged_out();
                effects.push(Effect::DiscardSession);
            }

            ConnectionEvent::Closed(reason) => {
                self.attempts = self.attempts.saturating_add(1);
                effects.push(Effect::DiscardSession);
                self.state = match self.schedule_restart(&mut effects) {
                    Some(delay) => ConnectionState::new(ConnectionStatus::Connecting).with_message(
                        format!(
                            "{}, reconnecting in {:?} (attempt {}/{})",
                            reason, delay, self.attempts, self.policy.max_attempts
                        ),
                    ),
                    None => ConnectionState::new(ConnectionStatus::Error).with_message(format!(
                        "{}, gave up after {} attempts",
                        reason, self.policy.max_attempts
                    )),
                };
            }

            ConnectionEvent::CredentialsFailed(err) => {
                self.state = ConnectionState::new(ConnectionStatus::Error)
                    .with_message(format!("failed to save credentials: {}", err));
            }

            ConnectionEvent::Refresh => {
                let logged_out = self.state.is_terminal();
                self.attempts = 0;
                self.state = ConnectionState::new(ConnectionStatus::Connecting);
                effects.push(Effect::DiscardSession);
                if logged_out {
                    effects.push(Effect::ClearCredentials);
                }
                effects.push(Effect::StartSession {
                    delay: Duration::ZERO,
                });
            }
        }

        (self, effects)
    }

    /// Push a restart if the current attempt is within budget, returning its delay.
    fn schedule_restart(&self, effects: &mut Vec<Effect>) -> Option<Duration> {
        if !self.policy.allows(self.attempts) {
            return None;
        }
        let delay = self.policy.delay_for_attempt(self.attempts);
        effects.push(Effect::StartSession { delay });
        Some(delay)
    }
}
