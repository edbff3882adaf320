//! # whisper-adapters
//!
//! Boundary adapters: outbound facades to push notifications, presigned
//! attachment URLs, and TURN credential minting. Each is a narrow trait
//! (defined in `whisper_common::ports`) with a real implementation here —
//! no vendor SDK leaks past this crate into the router or gateway.

pub mod attachments;
pub mod push;
pub mod turn;

pub use attachments::S3AttachmentAdapter;
pub use push::{NoopPushAdapter, WebhookPushAdapter};
pub use turn::CoturnCredentialAdapter;
