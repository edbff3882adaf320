//! Attachment metadata repository.
//!
//! The object bytes themselves live in S3-compatible storage; this table
//! tracks ownership plus an optional recipient grant, so `presign_download`
//! can check that the requester has a legitimate reason to read a given
//! object key: either they uploaded it, or a `send_message` referenced it
//! to them.

use sqlx::PgPool;

#[derive(Debug, sqlx::FromRow)]
pub struct AttachmentMetadata {
    pub object_key: String,
    pub owner: String,
    pub recipient: Option<String>,
    pub content_type: String,
    pub size_bytes: i64,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

pub async fn record_upload(
    pool: &PgPool,
    object_key: &str,
    owner: &str,
    content_type: &str,
    size_bytes: i64,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO attachment_metadata (object_key, owner, content_type, size_bytes, created_at)
        VALUES ($1, $2, $3, $4, NOW())
        "#,
    )
    .bind(object_key)
    .bind(owner)
    .bind(content_type)
    .bind(size_bytes)
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn find_by_key(
    pool: &PgPool,
    object_key: &str,
) -> Result<Option<AttachmentMetadata>, sqlx::Error> {
    sqlx::query_as::<_, AttachmentMetadata>(
        "SELECT * FROM attachment_metadata WHERE object_key = $1",
    )
    .bind(object_key)
    .fetch_optional(pool)
    .await
}

/// Grant a recipient download access, called when a `send_message` payload
/// references this object key. Silently a no-op if the key was never
/// uploaded through `record_upload` — the sender is free to reference
/// garbage, it just never resolves to a downloadable grant.
pub async fn grant_recipient(
    pool: &PgPool,
    object_key: &str,
    recipient: &str,
) -> Result<(), sqlx::Error> {
    sqlx::query("UPDATE attachment_metadata SET recipient = $2 WHERE object_key = $1")
        .bind(object_key)
        .bind(recipient)
        .execute(pool)
        .await?;
    Ok(())
}
