//! The async driver behind the live channel.
//!
//! [`LiveChannel::run`] owns the timers, the stream and the payload cache,
//! feeds what happens into the [`ChannelMachine`] and carries out the
//! commands it returns. Parsed payloads go to an `mpsc` sink; the receiver
//! applies them to a map. Payloads are delivered in completion order with no
//! sequence check.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use futures_util::StreamExt;
use livemap_transit::VehicleCollection;
use tokio::sync::mpsc;
use tokio::time::{sleep_until, Instant};
use tracing::{debug, info, warn};

use crate::config::ChannelSettings;
use crate::error::{LiveMapError, Result};
use crate::live::cache::TtlCache;
use crate::live::machine::{ChannelMachine, ChannelState, Command, Event, RefreshRate};
use crate::live::quality::ConnectionMonitor;
use crate::live::source::{ByteStream, VehicleSource};
use crate::live::sse::SseParser;

type Payload = Arc<VehicleCollection>;

/// One payload handed to the map
#[derive(Clone, Debug)]
pub struct LiveUpdate {
    pub collection: Payload,
    /// Reused after a failed fetch
    pub stale: bool,
    pub degraded: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Control {
    Visibility(bool),
    Network(bool),
    Rate(RefreshRate),
    Shutdown,
}

/// Sends [`Control`]s to a running channel
#[derive(Clone, Debug)]
pub struct ChannelHandle {
    tx: mpsc::Sender<Control>,
}

impl ChannelHandle {
    pub fn new() -> (Self, mpsc::Receiver<Control>) {
        let (tx, rx) = mpsc::channel(16);
        (Self { tx }, rx)
    }

    async fn send(&self, control: Control) {
        if self.tx.send(control).await.is_err() {
            debug!("live channel already stopped, dropping {control:?}");
        }
    }

    pub async fn set_visible(&self, visible: bool) {
        self.send(Control::Visibility(visible)).await;
    }

    pub async fn set_online(&self, online: bool) {
        self.send(Control::Network(online)).await;
    }

    pub async fn set_rate(&self, rate: RefreshRate) {
        self.send(Control::Rate(rate)).await;
    }

    pub async fn shutdown(&self) {
        self.send(Control::Shutdown).await;
    }
}

/// Pending deadlines. Setting one replaces whatever was scheduled before.
#[derive(Debug, Default)]
struct Timers {
    poll: Option<Instant>,
    poll_period: Option<Duration>,
    heartbeat: Option<Instant>,
    reconnect: Option<Instant>,
}

enum Wake {
    Control(Option<Control>),
    PollTick,
    Heartbeat,
    Reconnect,
    Chunk(Option<Result<Bytes>>),
}

pub struct LiveChannel<S: VehicleSource> {
    source: S,
    settings: ChannelSettings,
    machine: ChannelMachine<Payload>,
    cache: TtlCache<Payload>,
    monitor: ConnectionMonitor,
    stream: Option<ByteStream>,
    parser: SseParser,
    timers: Timers,
    last_delivered: Option<Payload>,
    delivered: usize,
    closed: bool,
}

impl<S: VehicleSource> LiveChannel<S> {
    pub fn new(source: S, rate: RefreshRate, settings: ChannelSettings) -> Self {
        Self {
            source,
            machine: ChannelMachine::new(rate, &settings),
            cache: TtlCache::new(settings.cache_ttl_for(rate)),
            monitor: ConnectionMonitor::new(&settings),
            settings,
            stream: None,
            parser: SseParser::new(),
            timers: Timers::default(),
            last_delivered: None,
            delivered: 0,
            closed: false,
        }
    }

    pub fn state(&self) -> ChannelState {
        self.machine.state()
    }

    /// Run until shut down, or until the sink or control channel closes.
    /// Returns how many updates were delivered.
    pub async fn run(
        mut self,
        sink: mpsc::Sender<LiveUpdate>,
        mut controls: mpsc::Receiver<Control>,
    ) -> usize {
        info!("live channel starting at {}", self.machine.rate());
        self.process(Event::Start, &sink).await;

        while !self.closed {
            let wake = tokio::select! {
                control = controls.recv() => Wake::Control(control),
                _ = wait_for(self.timers.poll) => Wake::PollTick,
                _ = wait_for(self.timers.heartbeat) => Wake::Heartbeat,
                _ = wait_for(self.timers.reconnect) => Wake::Reconnect,
                chunk = next_chunk(&mut self.stream) => Wake::Chunk(chunk),
            };

            let events = match wake {
                Wake::Control(None) | Wake::Control(Some(Control::Shutdown)) => break,
                Wake::Control(Some(Control::Visibility(visible))) => {
                    vec![Event::VisibilityChanged(visible)]
                }
                Wake::Control(Some(Control::Network(online))) => {
                    vec![Event::NetworkChanged(online)]
                }
                Wake::Control(Some(Control::Rate(rate))) => {
                    self.cache.set_ttl(self.settings.cache_ttl_for(rate));
                    vec![Event::RateChanged(rate)]
                }
                Wake::PollTick => {
                    self.rearm_poll();
                    vec![Event::PollTick]
                }
                Wake::Heartbeat => {
                    self.timers.heartbeat = None;
                    vec![Event::HeartbeatElapsed]
                }
                Wake::Reconnect => {
                    self.timers.reconnect = None;
                    vec![Event::ReconnectDue]
                }
                Wake::Chunk(Some(Ok(bytes))) => self.stream_events(&bytes),
                Wake::Chunk(Some(Err(e))) => {
                    warn!("stream error: {e}");
                    vec![Event::StreamFailed]
                }
                Wake::Chunk(None) => {
                    warn!("stream ended");
                    vec![Event::StreamFailed]
                }
            };

            for event in events {
                self.process(event, &sink).await;
            }
        }

        info!("live channel stopped after {} updates", self.delivered);
        self.delivered
    }

    /// Feed one event through the machine, along with every event its
    /// commands produce
    async fn process(&mut self, event: Event<Payload>, sink: &mpsc::Sender<LiveUpdate>) {
        let mut queue = VecDeque::from([event]);
        while let Some(event) = queue.pop_front() {
            for command in self.machine.handle(event) {
                if let Some(next) = self.execute(command, sink).await {
                    queue.push_back(next);
                }
            }
        }
    }

    async fn execute(
        &mut self,
        command: Command<Payload>,
        sink: &mpsc::Sender<LiveUpdate>,
    ) -> Option<Event<Payload>> {
        match command {
            Command::StartPolling(period) => {
                self.timers.poll_period = Some(period);
                self.rearm_poll();
                None
            }
            Command::StopPolling => {
                self.timers.poll = None;
                self.timers.poll_period = None;
                None
            }
            Command::PollNow => Some(self.poll().await),
            Command::OpenStream => match self.source.open_stream().await {
                Ok(stream) => {
                    self.stream = Some(stream);
                    self.parser = SseParser::new();
                    Some(Event::StreamOpened)
                }
                Err(e) => {
                    warn!("could not open stream: {e}");
                    Some(Event::StreamFailed)
                }
            },
            Command::CloseStream => {
                self.stream = None;
                self.timers.heartbeat = None;
                None
            }
            Command::ArmHeartbeat(timeout) => {
                self.timers.heartbeat = Some(Instant::now() + timeout);
                None
            }
            Command::ScheduleReconnect(delay) => {
                let delay = self.parser.retry().map_or(delay, |retry| retry.max(delay));
                self.timers.reconnect = Some(Instant::now() + delay);
                None
            }
            Command::CancelReconnect => {
                self.timers.reconnect = None;
                None
            }
            Command::Apply(payload) => {
                self.deliver(payload, false, sink).await;
                None
            }
            Command::HoldPending => {
                debug!("holding pushed payload for the next tick");
                None
            }
            Command::ReuseLastGood => {
                match self.cache.last_good().cloned() {
                    Some(payload) => self.deliver(payload, true, sink).await,
                    None => debug!("fetch failed and nothing cached yet"),
                }
                None
            }
        }
    }

    fn rearm_poll(&mut self) {
        self.timers.poll = self
            .timers
            .poll_period
            .map(|period| Instant::now() + self.monitor.adjust_interval(period));
    }

    async fn poll(&mut self) -> Event<Payload> {
        if let Some(payload) = self.cache.fresh() {
            debug!("serving poll from cache");
            return Event::PollSucceeded(payload.clone());
        }

        let was_degraded = self.monitor.is_degraded();
        let started = Instant::now();
        let result = self.source.fetch_vehicles().await;

        let parsed = result.and_then(|body| {
            VehicleCollection::from_geojson(&body).map_err(LiveMapError::from)
        });
        let event = match parsed {
            Ok(collection) => {
                self.monitor.record_success(started.elapsed());
                if collection.skipped > 0 {
                    debug!("{} features rejected", collection.skipped);
                }
                let payload = Arc::new(collection);
                self.cache.put(payload.clone());
                Event::PollSucceeded(payload)
            }
            Err(e) => {
                warn!("vehicle fetch failed: {e}");
                self.monitor.record_failure();
                Event::PollFailed
            }
        };

        if was_degraded != self.monitor.is_degraded() {
            self.rearm_poll();
        }
        event
    }

    fn stream_events(&mut self, bytes: &[u8]) -> Vec<Event<Payload>> {
        let mut events = Vec::new();
        for sse in self.parser.feed(bytes) {
            if !sse.carries_payload() {
                events.push(Event::StreamActivity);
                continue;
            }
            match VehicleCollection::from_geojson(&sse.data) {
                Ok(collection) => {
                    let payload = Arc::new(collection);
                    self.cache.put(payload.clone());
                    events.push(Event::StreamPayload(payload));
                }
                Err(e) => {
                    warn!("unreadable {} event: {e}", sse.event);
                    events.push(Event::StreamActivity);
                }
            }
        }
        if events.is_empty() && self.parser.take_activity() {
            events.push(Event::StreamActivity);
        }
        events
    }

    async fn deliver(&mut self, collection: Payload, stale: bool, sink: &mpsc::Sender<LiveUpdate>) {
        // A poll answered from cache hands back the payload already applied
        let repeat = self
            .last_delivered
            .as_ref()
            .is_some_and(|last| Arc::ptr_eq(last, &collection));
        if repeat && !stale {
            debug!("payload unchanged since last update");
            return;
        }
        self.last_delivered = Some(collection.clone());

        let update = LiveUpdate {
            collection,
            stale,
            degraded: self.monitor.is_degraded(),
        };
        if sink.send(update).await.is_err() {
            debug!("update receiver dropped");
            self.closed = true;
            return;
        }
        self.delivered += 1;
    }
}

async fn wait_for(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

async fn next_chunk(stream: &mut Option<ByteStream>) -> Option<Result<Bytes>> {
    match stream {
        Some(stream) => stream.next().await,
        None => std::future::pending().await,
    }
}
