//! HTTP page fetching + Postgres repositories for BLS.

use anyhow::Context;
use async_trait::async_trait;
use bls_core::{
    BrokerProfile, BrokerProfileValue, ListingRow, ListingStatus, RunStatus, ScrapedListing,
    SyncRun,
};
use chrono::{DateTime, Utc};
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, ACCEPT_LANGUAGE, CACHE_CONTROL, PRAGMA, USER_AGENT};
use serde_json::Value as JsonValue;
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Postgres, QueryBuilder, Row};
use thiserror::Error;
use tracing::debug;
use uuid::Uuid;

pub const CRATE_NAME: &str = "bls-storage";

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("failed to fetch: {status} for {url}")]
    HttpStatus { status: u16, url: String },
}

/// Seam between the scrape pipeline and the network, so pagination and
/// normalization are testable against scripted pages.
#[async_trait]
pub trait PageFetcher: Send + Sync {
    async fn fetch_page(&self, url: &str) -> Result<String, FetchError>;
}

/// Production fetcher. Sends a fixed browser-emulating header set; portals
/// serve bot-shaped clients a different (or empty) document.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: reqwest::Client,
}

fn browser_headers() -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(
        USER_AGENT,
        HeaderValue::from_static(
            "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
        ),
    );
    headers.insert(
        ACCEPT,
        HeaderValue::from_static(
            "text/html,application/xhtml+xml,application/xml;q=0.9,image/avif,image/webp,image/apng,*/*;q=0.8",
        ),
    );
    headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static("cs,en-US;q=0.9,en;q=0.8"));
    headers.insert(CACHE_CONTROL, HeaderValue::from_static("no-cache"));
    headers.insert(PRAGMA, HeaderValue::from_static("no-cache"));
    headers
}

impl HttpFetcher {
    pub fn new() -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .gzip(true)
            .brotli(true)
            .default_headers(browser_headers())
            .build()
            .context("building reqwest client")?;
        Ok(Self { client })
    }
}

#[async_trait]
impl PageFetcher for HttpFetcher {
    async fn fetch_page(&self, url: &str) -> Result<String, FetchError> {
        debug!(url, "fetching page");
        let response = self.client.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::HttpStatus {
                status: status.as_u16(),
                url: response.url().to_string(),
            });
        }
        Ok(response.text().await?)
    }
}

#[derive(Debug, Error)]
#[error("store error: {0}")]
pub struct StoreError(#[from] sqlx::Error);

pub async fn connect_pool(database_url: &str) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(5)
        .connect(database_url)
        .await
}

fn upsert_query(listings: &[ScrapedListing]) -> QueryBuilder<'_, Postgres> {
    let mut builder = QueryBuilder::new(
        "INSERT INTO listings \
         (title, price, description, images, external_url, external_source, location, status, broker_id) ",
    );
    builder.push_values(listings, |mut row, listing| {
        row.push_bind(&listing.title)
            .push_bind(listing.price)
            .push_bind(&listing.description)
            .push_bind(&listing.images)
            .push_bind(&listing.external_url)
            .push_bind(&listing.external_source)
            .push_bind(&listing.location)
            .push_bind(listing.status.as_str())
            .push_bind(listing.broker_id);
    });
    builder.push(
        " ON CONFLICT (external_url) DO UPDATE SET \
         title = EXCLUDED.title, \
         price = EXCLUDED.price, \
         description = EXCLUDED.description, \
         images = EXCLUDED.images, \
         external_source = EXCLUDED.external_source, \
         location = EXCLUDED.location, \
         status = EXCLUDED.status, \
         broker_id = EXCLUDED.broker_id \
         RETURNING id",
    );
    builder
}

/// Batch insert-or-update keyed by external_url, then touch last_synced_at
/// for every affected row. Returns the number of upserted rows.
pub async fn upsert_listings(pool: &PgPool, listings: &[ScrapedListing]) -> Result<u64, StoreError> {
    if listings.is_empty() {
        return Ok(0);
    }
    let rows = upsert_query(listings).build().fetch_all(pool).await?;
    let mut ids = Vec::with_capacity(rows.len());
    for row in &rows {
        ids.push(row.try_get::<Uuid, _>("id")?);
    }
    sqlx::query("UPDATE listings SET last_synced_at = NOW() WHERE id = ANY($1)")
        .bind(&ids)
        .execute(pool)
        .await?;
    Ok(ids.len() as u64)
}

/// The broker's currently-active persisted listings.
pub async fn active_listings(pool: &PgPool, broker_id: Uuid) -> Result<Vec<ListingRow>, StoreError> {
    let rows = sqlx::query(
        "SELECT id, external_url, status, last_synced_at \
         FROM listings WHERE broker_id = $1 AND status = 'active'",
    )
    .bind(broker_id)
    .fetch_all(pool)
    .await?;
    let mut listings = Vec::with_capacity(rows.len());
    for row in &rows {
        let status: String = row.try_get("status")?;
        listings.push(ListingRow {
            id: row.try_get("id")?,
            external_url: row.try_get("external_url")?,
            status: ListingStatus::parse(&status).unwrap_or(ListingStatus::Inactive),
            last_synced_at: row.try_get("last_synced_at")?,
        });
    }
    Ok(listings)
}

/// Transitions the given listings to inactive, refreshing last_synced_at.
/// Rows are never deleted; delisted properties just leave the active set.
pub async fn deactivate_listings(pool: &PgPool, external_urls: &[String]) -> Result<u64, StoreError> {
    if external_urls.is_empty() {
        return Ok(0);
    }
    let result = sqlx::query(
        "UPDATE listings SET status = 'inactive', last_synced_at = NOW() WHERE external_url = ANY($1)",
    )
    .bind(external_urls)
    .execute(pool)
    .await?;
    Ok(result.rows_affected())
}

/// All configuration rows tagged as broker profiles, in table order.
pub async fn fetch_broker_profiles(pool: &PgPool) -> Result<Vec<BrokerProfile>, StoreError> {
    let rows = sqlx::query(
        "SELECT id, broker_id, value FROM site_content \
         WHERE section = 'broker_profile' AND broker_id IS NOT NULL \
         ORDER BY id",
    )
    .fetch_all(pool)
    .await?;
    let mut profiles = Vec::with_capacity(rows.len());
    for row in &rows {
        let value: Option<JsonValue> = row.try_get("value")?;
        profiles.push(BrokerProfile {
            id: row.try_get("id")?,
            broker_id: row.try_get("broker_id")?,
            value: BrokerProfileValue::from_json(value.unwrap_or(JsonValue::Null)),
        });
    }
    Ok(profiles)
}

pub async fn log_sync_start(
    pool: &PgPool,
    run_id: Uuid,
    started_at: DateTime<Utc>,
) -> Result<(), StoreError> {
    sqlx::query("INSERT INTO sync_runs (id, started_at, status) VALUES ($1, $2, $3)")
        .bind(run_id)
        .bind(started_at)
        .bind(RunStatus::Running.as_str())
        .execute(pool)
        .await?;
    Ok(())
}

pub async fn log_sync_end(
    pool: &PgPool,
    run_id: Uuid,
    status: RunStatus,
    items_processed: i64,
    items_upserted: i64,
    error_message: Option<&str>,
) -> Result<(), StoreError> {
    sqlx::query(
        "UPDATE sync_runs \
         SET ended_at = NOW(), status = $2, items_processed = $3, items_upserted = $4, error_message = $5 \
         WHERE id = $1",
    )
    .bind(run_id)
    .bind(status.as_str())
    .bind(items_processed)
    .bind(items_upserted)
    .bind(error_message)
    .execute(pool)
    .await?;
    Ok(())
}

/// Most recent ledger rows, newest first.
pub async fn recent_sync_runs(pool: &PgPool, limit: i64) -> Result<Vec<SyncRun>, StoreError> {
    let rows = sqlx::query(
        "SELECT id, started_at, ended_at, status, items_processed, items_upserted, error_message \
         FROM sync_runs ORDER BY started_at DESC LIMIT $1",
    )
    .bind(limit)
    .fetch_all(pool)
    .await?;
    let mut runs = Vec::with_capacity(rows.len());
    for row in &rows {
        let status: String = row.try_get("status")?;
        runs.push(SyncRun {
            id: row.try_get("id")?,
            started_at: row.try_get("started_at")?,
            ended_at: row.try_get("ended_at")?,
            status: RunStatus::parse(&status).unwrap_or(RunStatus::Error),
            items_processed: row.try_get("items_processed")?,
            items_upserted: row.try_get("items_upserted")?,
            error_message: row.try_get("error_message")?,
        });
    }
    Ok(runs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use bls_core::ListingStatus;

    fn listing(url: &str) -> ScrapedListing {
        ScrapedListing {
            title: "Byt 2+kk".to_string(),
            price: 4_500_000,
            description: String::new(),
            images: vec![],
            external_url: url.to_string(),
            external_source: "remax".to_string(),
            location: "Praha".to_string(),
            status: ListingStatus::Active,
            broker_id: None,
        }
    }

    #[test]
    fn upsert_updates_conflicting_rows_instead_of_ignoring() {
        let listings = vec![listing("https://portal.example/d/1")];
        let sql = upsert_query(&listings).into_sql();
        assert!(sql.contains("ON CONFLICT (external_url) DO UPDATE"));
        assert!(sql.contains("RETURNING id"));
        assert!(!sql.contains("DO NOTHING"));
    }

    #[test]
    fn upsert_binds_one_tuple_per_listing() {
        let listings = vec![
            listing("https://portal.example/d/1"),
            listing("https://portal.example/d/2"),
        ];
        let sql = upsert_query(&listings).into_sql();
        // 9 columns per row
        assert!(sql.contains("($1, $2, $3, $4, $5, $6, $7, $8, $9)"));
        assert!(sql.contains("($10, $11, $12, $13, $14, $15, $16, $17, $18)"));
    }

    #[test]
    fn fetch_error_message_carries_status_code() {
        let err = FetchError::HttpStatus {
            status: 503,
            url: "https://portal.example/list".to_string(),
        };
        assert!(err.to_string().contains("503"));
    }

    #[test]
    fn browser_headers_emulate_a_real_client() {
        let headers = browser_headers();
        assert!(headers
            .get(USER_AGENT)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|ua| ua.contains("Mozilla/5.0")));
        assert_eq!(
            headers.get(CACHE_CONTROL).and_then(|v| v.to_str().ok()),
            Some("no-cache")
        );
    }
}
