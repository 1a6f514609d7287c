use crate::error::StorageError;
use crate::event_classifier::EventKind;
use crate::event_decoder::{EventMeta, LotCreated, LotJoined, LotResolved};
use crate::settings::DatabaseSettings;
use crate::types::conversions::{
    address_to_string, hash_to_string, u256_to_numeric_text, u64_to_bigint,
};
use anyhow::Result;
use chrono::Utc;
use sqlx::{postgres::PgPoolOptions, Connection, Pool, Postgres, Row};
use std::time::Duration;

/// PostgreSQL connection pool type alias.
pub type DbPool = Pool<Postgres>;

/// Database schema holding one table per event kind
pub const SCHEMA: &str = "lot_events";

// Integer-valued uint256 columns; 78 digits holds 2^256 - 1
const UINT256: &str = "NUMERIC(78, 0)";

/// Connect with retries, then prepare the schema.
///
/// Retries cover startup races only (database container not yet accepting connections).
/// Once ingestion runs, write failures are not retried.
pub async fn connect(settings: &DatabaseSettings) -> Result<DbPool> {
    let database_url = settings
        .url
        .clone()
        .ok_or_else(|| anyhow::anyhow!("database.url or DATABASE_URL must be set"))?;

    log::info!("🔍 [Database] Connecting to PostgreSQL");

    let mut last_err: Option<anyhow::Error> = None;
    let max_attempts = settings.connect_attempts.max(1);
    for attempt in 1..=max_attempts {
        match PgPoolOptions::new()
            .max_connections(settings.max_connections)
            .acquire_timeout(Duration::from_secs(settings.acquire_timeout_seconds))
            .connect(&database_url)
            .await
        {
            Ok(pool) => {
                log::info!(
                    "✅ [Database] Connected (attempt {}/{}).",
                    attempt,
                    max_attempts
                );
                match initialize_database(&pool).await {
                    Ok(()) => return Ok(pool),
                    Err(e) => last_err = Some(e),
                }
            }
            Err(e) => {
                last_err = Some(e.into());
            }
        }
        if attempt == max_attempts {
            break;
        }
        // Backoff with cap
        let delay_ms = (1u64 << attempt.min(6)) * 200; // 200ms, 400ms, 800ms, ... capped at ~12.8s
        log::warn!(
            "[Database] Connect/init attempt {}/{} failed. Retrying in {} ms...",
            attempt,
            max_attempts,
            delay_ms
        );
        tokio::time::sleep(Duration::from_millis(delay_ms)).await;
    }
    Err(last_err.unwrap_or_else(|| anyhow::anyhow!("Unknown DB connection error")))
}

/// Idempotent schema preparation under an advisory lock, so concurrent indexers
/// starting together do not race on DDL.
pub async fn initialize_database(pool: &DbPool) -> Result<()> {
    const MIGRATION_LOCK_ID: i64 = 0x4C4F_5447_414D_4531; // "LOTGAME1"

    let mut conn = pool.acquire().await?;
    let mut tx = conn.begin().await?;

    log::info!("[Database] Acquiring migration lock...");
    sqlx::query("SELECT pg_advisory_xact_lock($1)")
        .bind(MIGRATION_LOCK_ID)
        .execute(tx.as_mut())
        .await?;

    sqlx::query(&format!("CREATE SCHEMA IF NOT EXISTS {}", SCHEMA))
        .execute(tx.as_mut())
        .await?;

    create_tables(&mut tx).await?;

    tx.commit().await?;
    log::info!("✅ [Database] Schema {} ready", SCHEMA);

    Ok(())
}

async fn create_tables(tx: &mut sqlx::Transaction<'_, Postgres>) -> Result<()> {
    sqlx::query(&format!(
        "CREATE TABLE IF NOT EXISTS {schema}.lot_created (
            id UUID PRIMARY KEY,
            lot_id {uint} NOT NULL,
            token_a TEXT NOT NULL,
            token_b_choices TEXT NOT NULL,
            start_epoch {uint} NOT NULL,
            duration {uint} NOT NULL,
            creator VARCHAR(42) NOT NULL,
            is_private BOOLEAN NOT NULL,
            is_challenge BOOLEAN NOT NULL,
            block_number BIGINT NOT NULL,
            transaction_hash VARCHAR(66) NOT NULL,
            log_index BIGINT NOT NULL,
            ingested_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
        )",
        schema = SCHEMA,
        uint = UINT256
    ))
    .execute(tx.as_mut())
    .await?;

    sqlx::query(&format!(
        "CREATE TABLE IF NOT EXISTS {schema}.lot_joined (
            id UUID PRIMARY KEY,
            lot_id {uint} NOT NULL,
            token TEXT NOT NULL,
            user_address VARCHAR(42) NOT NULL,
            size {uint} NOT NULL,
            block_number BIGINT NOT NULL,
            transaction_hash VARCHAR(66) NOT NULL,
            log_index BIGINT NOT NULL,
            ingested_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
        )",
        schema = SCHEMA,
        uint = UINT256
    ))
    .execute(tx.as_mut())
    .await?;

    sqlx::query(&format!(
        "CREATE TABLE IF NOT EXISTS {schema}.lot_resolved (
            id UUID PRIMARY KEY,
            lot_id {uint} NOT NULL,
            size {uint} NOT NULL,
            winning_token TEXT NOT NULL,
            start_price_token_a {uint} NOT NULL,
            start_price_token_b {uint} NOT NULL,
            resolve_price_token_a {uint} NOT NULL,
            resolve_price_token_b {uint} NOT NULL,
            block_number BIGINT NOT NULL,
            transaction_hash VARCHAR(66) NOT NULL,
            log_index BIGINT NOT NULL,
            ingested_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
        )",
        schema = SCHEMA,
        uint = UINT256
    ))
    .execute(tx.as_mut())
    .await?;

    for kind in EventKind::ALL {
        let table = kind.table_name();
        sqlx::query(&format!(
            "CREATE INDEX IF NOT EXISTS idx_{table}_block_number ON {schema}.{table}(block_number)",
            schema = SCHEMA,
            table = table
        ))
        .execute(tx.as_mut())
        .await?;
        sqlx::query(&format!(
            "CREATE INDEX IF NOT EXISTS idx_{table}_lot_id ON {schema}.{table}(lot_id)",
            schema = SCHEMA,
            table = table
        ))
        .execute(tx.as_mut())
        .await?;
    }

    Ok(())
}

/// Chain position columns as BIGINT, checked before the statement is built
fn position(meta: &EventMeta) -> Result<(i64, i64), StorageError> {
    Ok((u64_to_bigint(meta.block_number)?, u64_to_bigint(meta.log_index)?))
}

/// Insert a LotCreated row; on id conflict every column is overwritten
pub async fn upsert_lot_created(
    pool: &DbPool,
    meta: &EventMeta,
    event: &LotCreated,
) -> Result<(), StorageError> {
    let (block_number, log_index) = position(meta)?;
    sqlx::query(&format!(
        "INSERT INTO {}.lot_created (id, lot_id, token_a, token_b_choices, start_epoch,
            duration, creator, is_private, is_challenge, block_number, transaction_hash,
            log_index, ingested_at)
         VALUES ($1, $2::numeric, $3, $4, $5::numeric, $6::numeric, $7, $8, $9, $10, $11,
            $12, $13)
         ON CONFLICT(id) DO UPDATE SET
            lot_id=excluded.lot_id,
            token_a=excluded.token_a,
            token_b_choices=excluded.token_b_choices,
            start_epoch=excluded.start_epoch,
            duration=excluded.duration,
            creator=excluded.creator,
            is_private=excluded.is_private,
            is_challenge=excluded.is_challenge,
            block_number=excluded.block_number,
            transaction_hash=excluded.transaction_hash,
            log_index=excluded.log_index,
            ingested_at=excluded.ingested_at",
        SCHEMA
    ))
    .bind(meta.id)
    .bind(u256_to_numeric_text(event.lot_id))
    .bind(&event.token_a)
    .bind(event.token_b_choices_text())
    .bind(u256_to_numeric_text(event.start_epoch))
    .bind(u256_to_numeric_text(event.duration))
    .bind(address_to_string(event.creator))
    .bind(event.is_private)
    .bind(event.is_challenge)
    .bind(block_number)
    .bind(hash_to_string(meta.transaction_hash))
    .bind(log_index)
    .bind(Utc::now())
    .execute(pool)
    .await?;

    Ok(())
}

/// Insert a LotJoined row; on id conflict every column is overwritten
pub async fn upsert_lot_joined(
    pool: &DbPool,
    meta: &EventMeta,
    event: &LotJoined,
) -> Result<(), StorageError> {
    let (block_number, log_index) = position(meta)?;
    sqlx::query(&format!(
        "INSERT INTO {}.lot_joined (id, lot_id, token, user_address, size, block_number,
            transaction_hash, log_index, ingested_at)
         VALUES ($1, $2::numeric, $3, $4, $5::numeric, $6, $7, $8, $9)
         ON CONFLICT(id) DO UPDATE SET
            lot_id=excluded.lot_id,
            token=excluded.token,
            user_address=excluded.user_address,
            size=excluded.size,
            block_number=excluded.block_number,
            transaction_hash=excluded.transaction_hash,
            log_index=excluded.log_index,
            ingested_at=excluded.ingested_at",
        SCHEMA
    ))
    .bind(meta.id)
    .bind(u256_to_numeric_text(event.lot_id))
    .bind(&event.token)
    .bind(address_to_string(event.user))
    .bind(u256_to_numeric_text(event.size))
    .bind(block_number)
    .bind(hash_to_string(meta.transaction_hash))
    .bind(log_index)
    .bind(Utc::now())
    .execute(pool)
    .await?;

    Ok(())
}

/// Insert a LotResolved row; on id conflict every column is overwritten
pub async fn upsert_lot_resolved(
    pool: &DbPool,
    meta: &EventMeta,
    event: &LotResolved,
) -> Result<(), StorageError> {
    let (block_number, log_index) = position(meta)?;
    sqlx::query(&format!(
        "INSERT INTO {}.lot_resolved (id, lot_id, size, winning_token, start_price_token_a,
            start_price_token_b, resolve_price_token_a, resolve_price_token_b, block_number,
            transaction_hash, log_index, ingested_at)
         VALUES ($1, $2::numeric, $3::numeric, $4, $5::numeric, $6::numeric, $7::numeric,
            $8::numeric, $9, $10, $11, $12)
         ON CONFLICT(id) DO UPDATE SET
            lot_id=excluded.lot_id,
            size=excluded.size,
            winning_token=excluded.winning_token,
            start_price_token_a=excluded.start_price_token_a,
            start_price_token_b=excluded.start_price_token_b,
            resolve_price_token_a=excluded.resolve_price_token_a,
            resolve_price_token_b=excluded.resolve_price_token_b,
            block_number=excluded.block_number,
            transaction_hash=excluded.transaction_hash,
            log_index=excluded.log_index,
            ingested_at=excluded.ingested_at",
        SCHEMA
    ))
    .bind(meta.id)
    .bind(u256_to_numeric_text(event.lot_id))
    .bind(u256_to_numeric_text(event.size))
    .bind(&event.winning_token)
    .bind(u256_to_numeric_text(event.start_price_token_a))
    .bind(u256_to_numeric_text(event.start_price_token_b))
    .bind(u256_to_numeric_text(event.resolve_price_token_a))
    .bind(u256_to_numeric_text(event.resolve_price_token_b))
    .bind(block_number)
    .bind(hash_to_string(meta.transaction_hash))
    .bind(log_index)
    .bind(Utc::now())
    .execute(pool)
    .await?;

    Ok(())
}

/// Row count of one event table
pub async fn count_rows(pool: &DbPool, kind: EventKind) -> Result<i64, sqlx::Error> {
    let row = sqlx::query(&format!(
        "SELECT COUNT(*) AS count FROM {}.{}",
        SCHEMA,
        kind.table_name()
    ))
    .fetch_one(pool)
    .await?;
    row.try_get::<i64, _>("count")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::conversions::ConversionError;
    use ethers::types::H256;
    use uuid::Uuid;

    fn meta(block_number: u64, log_index: u64) -> EventMeta {
        EventMeta {
            id: Uuid::nil(),
            block_number,
            transaction_hash: H256::zero(),
            log_index,
        }
    }

    #[test]
    fn test_position_fits_bigint() {
        assert_eq!(position(&meta(8_585_483, 3)).unwrap(), (8_585_483, 3));
    }

    #[test]
    fn test_position_overflow_is_storage_error() {
        assert!(matches!(
            position(&meta(u64::MAX, 0)),
            Err(StorageError::Conversion(ConversionError::Overflow))
        ));
        assert!(matches!(
            position(&meta(1, i64::MAX as u64 + 1)),
            Err(StorageError::Conversion(ConversionError::Overflow))
        ));
    }
}
