//! # whisper-router
//!
//! Message routing, presence tracking, rate limiting, and call-signalling
//! relay — the online/offline delivery core described in spec §4.5–§4.8.
//! Knows nothing about sockets or frame parsing; the gateway calls into
//! these modules with already-validated, already-authenticated payloads and
//! writes whatever they hand back through the [`registry::ConnectionRegistry`].

pub mod call;
pub mod message;
pub mod presence;
pub mod rate;
pub mod registry;

pub use call::CallRouter;
pub use message::MessageRouter;
pub use presence::PresenceTracker;
pub use rate::RateLimiter;
pub use registry::ConnectionRegistry;
