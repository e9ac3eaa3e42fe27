//! Transport state machine of the live channel.
//!
//! [`ChannelMachine`] is pure: it consumes [`Event`]s and returns the
//! [`Command`]s the driver has to carry out (start or stop timers, fetch,
//! open or close the stream, apply a payload). It owns no timers and does
//! no I/O, so every transition is unit tested without a runtime.
//!
//! ```text
//! Polling --first good poll--> Connecting --opened--> Streaming
//!    ^                              |                     |
//!    +------- error / heartbeat ----+---------------------+
//!             (poll now, reconnect after backoff)
//! ```

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::config::ChannelSettings;
use crate::live::backoff::Backoff;

/// Shortest polling interval
pub const MIN_REFRESH: Duration = Duration::from_secs(1);

/// How often data is applied
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "u64", into = "u64")]
pub enum RefreshRate {
    /// Apply every streamed push as it arrives
    Immediate,
    Every(Duration),
}

impl RefreshRate {
    pub fn every_secs(secs: u64) -> Self {
        Self::from(secs)
    }

    /// Interval between polls. Immediate mode polls at the minimum rate
    /// until a stream takes over.
    pub fn poll_interval(&self) -> Duration {
        match self {
            Self::Immediate => MIN_REFRESH,
            Self::Every(interval) => (*interval).max(MIN_REFRESH),
        }
    }

    pub fn is_immediate(&self) -> bool {
        matches!(self, Self::Immediate)
    }
}

impl Default for RefreshRate {
    fn default() -> Self {
        Self::Every(Duration::from_secs(10))
    }
}

impl From<u64> for RefreshRate {
    fn from(secs: u64) -> Self {
        match secs {
            0 => Self::Immediate,
            secs => Self::Every(Duration::from_secs(secs)),
        }
    }
}

impl From<RefreshRate> for u64 {
    fn from(rate: RefreshRate) -> Self {
        match rate {
            RefreshRate::Immediate => 0,
            RefreshRate::Every(interval) => interval.as_secs().max(1),
        }
    }
}

impl FromStr for RefreshRate {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.eq_ignore_ascii_case("immediate") {
            return Ok(Self::Immediate);
        }
        s.parse::<u64>()
            .map(Self::from)
            .map_err(|_| format!("invalid refresh rate {s:?}, expected seconds or \"immediate\""))
    }
}

impl fmt::Display for RefreshRate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Immediate => write!(f, "immediate"),
            Self::Every(interval) => write!(f, "{}s", interval.as_secs().max(1)),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChannelState {
    Polling,
    Connecting,
    Streaming,
}

#[derive(Clone, Debug, PartialEq)]
pub enum Event<P> {
    Start,
    PollTick,
    PollSucceeded(P),
    PollFailed,
    StreamOpened,
    StreamPayload(P),
    /// Anything else on the stream (comments, other events)
    StreamActivity,
    StreamFailed,
    HeartbeatElapsed,
    ReconnectDue,
    VisibilityChanged(bool),
    NetworkChanged(bool),
    RateChanged(RefreshRate),
}

#[derive(Clone, Debug, PartialEq)]
pub enum Command<P> {
    /// (Re)start the poll timer. Replaces any running one.
    StartPolling(Duration),
    StopPolling,
    /// Fetch now
    PollNow,
    OpenStream,
    CloseStream,
    /// (Re)start the heartbeat timer
    ArmHeartbeat(Duration),
    ScheduleReconnect(Duration),
    CancelReconnect,
    Apply(P),
    /// A push was stored for the next poll tick
    HoldPending,
    /// The fetch failed; fall back to the last good payload
    ReuseLastGood,
}

#[derive(Debug)]
pub struct ChannelMachine<P> {
    state: ChannelState,
    rate: RefreshRate,
    visible: bool,
    online: bool,
    polled_once: bool,
    reconnect_scheduled: bool,
    pending: Option<P>,
    backoff: Backoff,
    heartbeat: Duration,
}

impl<P> ChannelMachine<P> {
    pub fn new(rate: RefreshRate, settings: &ChannelSettings) -> Self {
        Self {
            state: ChannelState::Polling,
            rate,
            visible: true,
            online: true,
            polled_once: false,
            reconnect_scheduled: false,
            pending: None,
            backoff: Backoff::new(settings.backoff_initial, settings.backoff_max),
            heartbeat: settings.heartbeat_timeout,
        }
    }

    pub fn state(&self) -> ChannelState {
        self.state
    }

    pub fn rate(&self) -> RefreshRate {
        self.rate
    }

    pub fn is_visible(&self) -> bool {
        self.visible
    }

    pub fn is_online(&self) -> bool {
        self.online
    }

    pub fn has_pending(&self) -> bool {
        self.pending.is_some()
    }

    /// Whether the poll timer should be running
    fn polling_wanted(&self) -> bool {
        self.visible && !(self.state == ChannelState::Streaming && self.rate.is_immediate())
    }

    fn resume_polling(&self, commands: &mut Vec<Command<P>>) {
        if self.polling_wanted() {
            commands.push(Command::StartPolling(self.rate.poll_interval()));
        } else {
            commands.push(Command::StopPolling);
        }
    }

    fn connect(&mut self, commands: &mut Vec<Command<P>>) {
        debug!("opening stream");
        self.state = ChannelState::Connecting;
        self.reconnect_scheduled = false;
        commands.push(Command::OpenStream);
    }

    /// Tear the stream down and go back to polling
    fn fall_back(&mut self, why: &str, commands: &mut Vec<Command<P>>) {
        info!("stream lost ({why}), falling back to polling");
        self.state = ChannelState::Polling;
        self.pending = None;
        commands.push(Command::CloseStream);
        if self.visible {
            commands.push(Command::PollNow);
        }
        self.resume_polling(commands);
        if self.online {
            let delay = self.backoff.next_delay();
            debug!("stream reconnect in {delay:?}");
            self.reconnect_scheduled = true;
            commands.push(Command::ScheduleReconnect(delay));
        }
    }

    pub fn handle(&mut self, event: Event<P>) -> Vec<Command<P>> {
        let mut commands = Vec::new();

        match event {
            Event::Start => {
                if self.visible {
                    commands.push(Command::PollNow);
                }
                self.resume_polling(&mut commands);
            }

            Event::PollTick => match self.state {
                ChannelState::Streaming => {
                    if let Some(payload) = self.pending.take() {
                        commands.push(Command::Apply(payload));
                    }
                }
                ChannelState::Polling | ChannelState::Connecting => {
                    if self.visible {
                        commands.push(Command::PollNow);
                    }
                }
            },

            Event::PollSucceeded(payload) => {
                commands.push(Command::Apply(payload));
                let first = !self.polled_once;
                self.polled_once = true;
                if first
                    && self.state == ChannelState::Polling
                    && self.online
                    && !self.reconnect_scheduled
                {
                    self.connect(&mut commands);
                }
            }

            Event::PollFailed => commands.push(Command::ReuseLastGood),

            Event::StreamOpened => {
                if self.state == ChannelState::Connecting {
                    info!("stream open");
                    self.state = ChannelState::Streaming;
                    self.backoff.reset();
                    commands.push(Command::ArmHeartbeat(self.heartbeat));
                    self.resume_polling(&mut commands);
                } else {
                    // Late open after we gave up on it
                    commands.push(Command::CloseStream);
                }
            }

            Event::StreamPayload(payload) => {
                if self.state == ChannelState::Streaming {
                    commands.push(Command::ArmHeartbeat(self.heartbeat));
                    if self.rate.is_immediate() {
                        commands.push(Command::Apply(payload));
                    } else {
                        self.pending = Some(payload);
                        commands.push(Command::HoldPending);
                    }
                }
            }

            Event::StreamActivity => {
                if self.state == ChannelState::Streaming {
                    commands.push(Command::ArmHeartbeat(self.heartbeat));
                }
            }

            Event::StreamFailed => {
                if self.state != ChannelState::Polling {
                    self.fall_back("error", &mut commands);
                }
            }

            Event::HeartbeatElapsed => {
                if self.state == ChannelState::Streaming {
                    self.fall_back("heartbeat timeout", &mut commands);
                }
            }

            Event::ReconnectDue => {
                self.reconnect_scheduled = false;
                if self.state == ChannelState::Polling && self.online {
                    self.connect(&mut commands);
                }
            }

            Event::VisibilityChanged(visible) => {
                if self.visible != visible {
                    self.visible = visible;
                    if visible {
                        debug!("visible again, refreshing");
                        commands.push(Command::PollNow);
                    } else {
                        debug!("hidden, pausing polling");
                    }
                    self.resume_polling(&mut commands);
                }
            }

            Event::NetworkChanged(online) => {
                if self.online != online {
                    self.online = online;
                    if online {
                        info!("back online");
                        self.backoff.reset();
                        if self.reconnect_scheduled {
                            commands.push(Command::CancelReconnect);
                        }
                        if self.state == ChannelState::Polling && self.polled_once {
                            self.connect(&mut commands);
                        } else if self.visible {
                            commands.push(Command::PollNow);
                        }
                    } else {
                        info!("offline, stopping stream");
                        if self.reconnect_scheduled {
                            self.reconnect_scheduled = false;
                            commands.push(Command::CancelReconnect);
                        }
                        if self.state != ChannelState::Polling {
                            self.state = ChannelState::Polling;
                            self.pending = None;
                            commands.push(Command::CloseStream);
                        }
                        self.resume_polling(&mut commands);
                    }
                }
            }

            Event::RateChanged(rate) => {
                if self.rate != rate {
                    info!("refresh rate now {rate}");
                    self.rate = rate;
                    if rate.is_immediate() {
                        if let Some(payload) = self.pending.take() {
                            commands.push(Command::Apply(payload));
                        }
                    }
                    self.resume_polling(&mut commands);
                }
            }
        }

        commands
    }
}
