//! Keeping the vehicle set current over the cheapest transport available.
//!
//! The channel polls `/vehicles` on an interval, upgrades to the
//! `/vehicles/stream` event stream after the first good poll, and falls
//! back to polling (reconnecting with backoff) whenever the stream fails.

pub mod backoff;
pub mod cache;
pub mod channel;
pub mod debounce;
pub mod machine;
pub mod quality;
pub mod source;
pub mod sse;

pub use backoff::Backoff;
pub use cache::{DiskCache, TtlCache};
pub use channel::{ChannelHandle, Control, LiveChannel, LiveUpdate};
pub use debounce::Debouncer;
pub use machine::{ChannelMachine, ChannelState, Command, Event, RefreshRate};
pub use quality::{ConnectionMonitor, LinkQuality};
pub use source::{ByteStream, HttpSource, VehicleSource};
pub use sse::{SseEvent, SseParser};
