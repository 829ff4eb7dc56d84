//! Client delivery session as a sans-IO state machine.
//!
//! Every input returns the [`Command`]s the driver must carry out; the
//! session itself never touches the network or the clock.

use std::fmt;
use std::time::Duration;

use crate::models::notification::Notification;

use super::backoff::ReconnectPolicy;
use super::toast::ToastFilter;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Disconnected,
    Connecting,
    Connected,
    Polling,
}

impl SessionState {
    /// Coarse status for the UI. Polling is best effort, so it reads as
    /// disconnected.
    pub fn status(self) -> Status {
        match self {
            Self::Connected => Status::Connected,
            Self::Connecting => Status::Connecting,
            Self::Disconnected | Self::Polling => Status::Disconnected,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Connected,
    Connecting,
    Disconnected,
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Connected => "connected",
            Self::Connecting => "connecting",
            Self::Disconnected => "disconnected",
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    /// Open the socket, send auth, and wait for the ack.
    Connect,
    ScheduleReconnect(Duration),
    /// Fetch the newest-first list over HTTP.
    FetchList,
    StartPolling(Duration),
    StopPolling,
    Toast(Notification),
}

pub struct DeliverySession {
    state: SessionState,
    /// Consecutive failed reconnect attempts. The loss or failed first
    /// connect that started the cycle is not counted.
    failed_attempts: u32,
    /// Whether the current `Connecting` is a scheduled reconnect.
    reconnecting: bool,
    policy: ReconnectPolicy,
    toasts: ToastFilter,
    muted: bool,
}

impl DeliverySession {
    pub fn new(policy: ReconnectPolicy, muted: bool) -> Self {
        Self {
            state: SessionState::Disconnected,
            failed_attempts: 0,
            reconnecting: false,
            policy,
            toasts: ToastFilter::new(),
            muted,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn status(&self) -> Status {
        self.state.status()
    }

    pub fn failed_attempts(&self) -> u32 {
        self.failed_attempts
    }

    pub fn is_muted(&self) -> bool {
        self.muted
    }

    pub fn set_muted(&mut self, muted: bool) {
        self.muted = muted;
    }

    pub fn start(&mut self) -> Vec<Command> {
        match self.state {
            SessionState::Disconnected => {
                self.state = SessionState::Connecting;
                vec![Command::Connect]
            }
            _ => Vec::new(),
        }
    }

    pub fn on_reconnect_timer(&mut self) -> Vec<Command> {
        self.start()
    }

    /// Periodic push-recovery attempt while polling.
    pub fn on_recovery_timer(&mut self) -> Vec<Command> {
        match self.state {
            SessionState::Polling => vec![Command::Connect],
            _ => Vec::new(),
        }
    }

    pub fn on_poll_timer(&mut self) -> Vec<Command> {
        match self.state {
            SessionState::Polling => vec![Command::FetchList],
            _ => Vec::new(),
        }
    }

    /// Socket open, auth sent and acknowledged.
    pub fn on_connected(&mut self) -> Vec<Command> {
        let mut commands = Vec::new();
        match self.state {
            SessionState::Connecting => {}
            SessionState::Polling => commands.push(Command::StopPolling),
            SessionState::Connected | SessionState::Disconnected => return commands,
        }
        self.state = SessionState::Connected;
        self.failed_attempts = 0;
        self.reconnecting = false;
        commands.push(Command::FetchList);
        commands
    }

    pub fn on_connect_failed(&mut self) -> Vec<Command> {
        self.fail()
    }

    pub fn on_connection_lost(&mut self) -> Vec<Command> {
        self.fail()
    }

    fn fail(&mut self) -> Vec<Command> {
        match self.state {
            SessionState::Connecting if self.reconnecting => {
                self.failed_attempts = self.failed_attempts.saturating_add(1);
            }
            SessionState::Connecting | SessionState::Connected => {
                self.failed_attempts = 0;
            }
            // A failed recovery attempt while polling changes nothing.
            SessionState::Polling | SessionState::Disconnected => return Vec::new(),
        }

        if self.policy.should_poll(self.failed_attempts) {
            self.state = SessionState::Polling;
            self.reconnecting = false;
            vec![Command::StartPolling(self.policy.poll_interval)]
        } else {
            self.state = SessionState::Disconnected;
            self.reconnecting = true;
            vec![Command::ScheduleReconnect(
                self.policy.delay_for(self.failed_attempts + 1),
            )]
        }
    }

    /// A fetched newest-first list.
    pub fn on_list(&mut self, list: &[Notification]) -> Vec<Command> {
        match self.toasts.observe_list(list) {
            Some(newest) if !self.muted => vec![Command::Toast(newest.clone())],
            _ => Vec::new(),
        }
    }

    /// A pushed notification. Toasts it (once) and re-fetches to reconcile.
    pub fn on_push(&mut self, notification: Notification) -> Vec<Command> {
        let mut commands = Vec::new();
        if self.toasts.observe_push(&notification) && !self.muted {
            commands.push(Command::Toast(notification));
        }
        commands.push(Command::FetchList);
        commands
    }
}
