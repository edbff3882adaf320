//! Identity and device repository.
//!
//! Registration is a single transaction: upsert the identity (first-time
//! only), replace the device record wholesale (an identity has at most one
//! live device), per the invariant in the data model.

use sqlx::PgPool;

use whisper_common::models::device::Device;
use whisper_common::models::identity::{Identity, IdentityStatus};

pub async fn find_identity(pool: &PgPool, whisper_id: &str) -> Result<Option<Identity>, sqlx::Error> {
    sqlx::query_as::<_, Identity>("SELECT * FROM identities WHERE whisper_id = $1")
        .bind(whisper_id)
        .fetch_optional(pool)
        .await
}

pub async fn find_device(pool: &PgPool, whisper_id: &str) -> Result<Option<Device>, sqlx::Error> {
    sqlx::query_as::<_, Device>("SELECT * FROM devices WHERE whisper_id = $1")
        .bind(whisper_id)
        .fetch_optional(pool)
        .await
}

/// Create a brand-new identity with its first device record.
pub async fn create_identity_with_device(
    pool: &PgPool,
    whisper_id: &str,
    device: &Device,
) -> Result<(), sqlx::Error> {
    let mut tx = pool.begin().await?;

    sqlx::query(
        "INSERT INTO identities (whisper_id, status, created_at) VALUES ($1, 'active', NOW())",
    )
    .bind(whisper_id)
    .execute(&mut *tx)
    .await?;

    insert_device(&mut tx, device).await?;

    tx.commit().await
}

/// Replace the device record for an already-existing identity (recovery /
/// re-registration flow). Invalidating the prior session is the caller's
/// responsibility via the volatile store.
pub async fn replace_device(
    pool: &PgPool,
    whisper_id: &str,
    device: &Device,
) -> Result<(), sqlx::Error> {
    let mut tx = pool.begin().await?;

    sqlx::query("DELETE FROM devices WHERE whisper_id = $1")
        .bind(whisper_id)
        .execute(&mut *tx)
        .await?;

    insert_device(&mut tx, device).await?;

    tx.commit().await
}

async fn insert_device(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    device: &Device,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO devices (
            whisper_id, device_id, platform, enc_public_key, sign_public_key,
            push_token, voip_token, registered_at
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, NOW())
        "#,
    )
    .bind(&device.whisper_id)
    .bind(device.device_id)
    .bind(device.platform)
    .bind(&device.enc_public_key)
    .bind(&device.sign_public_key)
    .bind(&device.push_token)
    .bind(&device.voip_token)
    .execute(&mut **tx)
    .await?;
    Ok(())
}

/// Called on disconnect — `last_seen_at` is ops-facing state, refreshed
/// once per session rather than per frame (presence TTL in the volatile
/// store already covers the hot path).
pub async fn touch_last_seen(pool: &PgPool, whisper_id: &str) -> Result<(), sqlx::Error> {
    sqlx::query("UPDATE devices SET last_seen_at = NOW() WHERE whisper_id = $1")
        .bind(whisper_id)
        .execute(pool)
        .await?;
    Ok(())
}

pub fn is_banned(identity: &Identity) -> bool {
    identity.status == IdentityStatus::Banned
}
