//! Contact backup blob repository — one opaque slot per identity.

use sqlx::PgPool;

use whisper_common::models::backup::ContactBackupBlob;

pub async fn get_backup(
    pool: &PgPool,
    whisper_id: &str,
) -> Result<Option<ContactBackupBlob>, sqlx::Error> {
    sqlx::query_as::<_, ContactBackupBlob>(
        "SELECT * FROM contact_backups WHERE whisper_id = $1",
    )
    .bind(whisper_id)
    .fetch_optional(pool)
    .await
}

/// Overwrite the backup blob. Returns `true` if this created a new row
/// (`created`), `false` if it replaced an existing one.
pub async fn put_backup(
    pool: &PgPool,
    whisper_id: &str,
    nonce: &str,
    ciphertext: &str,
    size_bytes: i64,
) -> Result<bool, sqlx::Error> {
    let existed = get_backup(pool, whisper_id).await?.is_some();

    sqlx::query(
        r#"
        INSERT INTO contact_backups (whisper_id, nonce, ciphertext, size_bytes, updated_at)
        VALUES ($1, $2, $3, $4, NOW())
        ON CONFLICT (whisper_id) DO UPDATE SET
            nonce = EXCLUDED.nonce,
            ciphertext = EXCLUDED.ciphertext,
            size_bytes = EXCLUDED.size_bytes,
            updated_at = NOW()
        "#,
    )
    .bind(whisper_id)
    .bind(nonce)
    .bind(ciphertext)
    .bind(size_bytes)
    .execute(pool)
    .await?;

    Ok(!existed)
}

pub async fn delete_backup(pool: &PgPool, whisper_id: &str) -> Result<bool, sqlx::Error> {
    let result = sqlx::query("DELETE FROM contact_backups WHERE whisper_id = $1")
        .bind(whisper_id)
        .execute(pool)
        .await?;
    Ok(result.rows_affected() > 0)
}
