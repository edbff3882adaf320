//! Durable store repositories — PostgreSQL only. Whisper2 has no
//! lite/embedded mode, so these functions take `&PgPool` directly rather
//! than the dual-backend `AnyPool`.

pub mod attachments;
pub mod backups;
pub mod identities;
