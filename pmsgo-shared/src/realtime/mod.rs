/// Real-time task updates
///
/// - `event`: event payloads and the pub/sub envelope
/// - `gateway`: local broadcast plus optional Redis mirroring

pub mod event;
pub mod gateway;

pub use event::{Envelope, RealtimeEvent};
pub use gateway::{Backoff, RealtimeError, RealtimeGateway, DEFAULT_CHANNEL};
