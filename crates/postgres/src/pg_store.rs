use std::collections::BTreeMap;

use async_trait::async_trait;
use campground_scan::{
    AdhocScrapeRequest, AdhocStatus, DIGEST_TOP_CAMPGROUNDS, Store, StoreError, Subscription,
};
use chrono::{DateTime, NaiveDate, Utc};
use notification_services::{CampgroundActivity, DigestSummary, NotificationEvent};
use providers::{AvailabilityCell, CampgroundEntry, CampsiteEntry, DateRange};
use sqlx::postgres::PgRow;
use sqlx::types::Json;
use sqlx::{PgPool, Row};
use tracing::debug;
use uuid::Uuid;

/// PostgreSQL implementation of the scan store
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    /// Wraps an existing pool
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

const SUBSCRIPTION_COLUMNS: &str = "id, user_id, provider, campground_id, site_filter, \
     start_date, end_date, active, created_at";

const ADHOC_COLUMNS: &str = "id, provider, campground_id, requester_id, requested_at, status, finished_at";

/// Splits ranges into parallel start/end arrays for `UNNEST`
fn range_bounds(covered: &[DateRange]) -> (Vec<NaiveDate>, Vec<NaiveDate>) {
    covered.iter().map(|r| (r.start, r.end)).unzip()
}

/// Keeps covered cells only, one per (site, day), last one winning
fn covered_cells<'a>(
    covered: &[DateRange],
    cells: &'a [AvailabilityCell],
) -> Vec<&'a AvailabilityCell> {
    let mut unique: BTreeMap<(&str, NaiveDate), &AvailabilityCell> = BTreeMap::new();
    for cell in cells {
        if covered.iter().any(|r| r.contains(cell.day)) {
            unique.insert((cell.site_id.as_str(), cell.day), cell);
        }
    }
    unique.into_values().collect()
}

fn adhoc_from_row(row: &PgRow) -> Result<AdhocScrapeRequest, StoreError> {
    let status: String = row.try_get("status")?;
    Ok(AdhocScrapeRequest {
        id: row.try_get("id")?,
        provider: row.try_get("provider")?,
        campground_id: row.try_get("campground_id")?,
        requester_id: row.try_get("requester_id")?,
        requested_at: row.try_get("requested_at")?,
        status: status.parse().map_err(StoreError::Serialization)?,
        finished_at: row.try_get("finished_at")?,
    })
}

#[async_trait]
impl Store for PgStore {
    async fn active_subscriptions(&self) -> Result<Vec<Subscription>, StoreError> {
        let query = format!("SELECT {} FROM subscriptions WHERE active", SUBSCRIPTION_COLUMNS);
        Ok(sqlx::query_as::<_, Subscription>(&query)
            .fetch_all(&self.pool)
            .await?)
    }

    async fn active_subscriptions_for(
        &self,
        provider: &str,
        campground_id: &str,
    ) -> Result<Vec<Subscription>, StoreError> {
        let query = format!(
            "SELECT {} FROM subscriptions WHERE active AND provider = $1 AND campground_id = $2",
            SUBSCRIPTION_COLUMNS
        );
        Ok(sqlx::query_as::<_, Subscription>(&query)
            .bind(provider)
            .bind(campground_id)
            .fetch_all(&self.pool)
            .await?)
    }

    async fn deactivate_expired(&self, today: NaiveDate) -> Result<u64, StoreError> {
        let result = sqlx::query("UPDATE subscriptions SET active = FALSE WHERE active AND end_date < $1")
            .bind(today)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    async fn snapshot(
        &self,
        provider: &str,
        campground_id: &str,
        covered: &[DateRange],
    ) -> Result<Vec<AvailabilityCell>, StoreError> {
        let (starts, ends) = range_bounds(covered);
        let rows = sqlx::query(
            r#"
            SELECT site_id, site_name, day, available, price, checked_at
            FROM availability_cells
            WHERE provider = $1
              AND campground_id = $2
              AND EXISTS (
                  SELECT 1 FROM UNNEST($3::date[], $4::date[]) AS r(range_start, range_end)
                  WHERE availability_cells.day BETWEEN r.range_start AND r.range_end
              )
            "#,
        )
        .bind(provider)
        .bind(campground_id)
        .bind(&starts)
        .bind(&ends)
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| -> Result<AvailabilityCell, StoreError> {
                Ok(AvailabilityCell {
                    provider: provider.to_string(),
                    campground_id: campground_id.to_string(),
                    site_id: row.try_get("site_id")?,
                    site_name: row.try_get("site_name")?,
                    day: row.try_get("day")?,
                    available: row.try_get("available")?,
                    price: row.try_get("price")?,
                    checked_at: row.try_get("checked_at")?,
                })
            })
            .collect()
    }

    async fn apply_snapshot(
        &self,
        provider: &str,
        campground_id: &str,
        covered: &[DateRange],
        cells: &[AvailabilityCell],
    ) -> Result<(), StoreError> {
        let (starts, ends) = range_bounds(covered);
        let cells = covered_cells(covered, cells);

        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            DELETE FROM availability_cells
            WHERE provider = $1
              AND campground_id = $2
              AND EXISTS (
                  SELECT 1 FROM UNNEST($3::date[], $4::date[]) AS r(range_start, range_end)
                  WHERE availability_cells.day BETWEEN r.range_start AND r.range_end
              )
            "#,
        )
        .bind(provider)
        .bind(campground_id)
        .bind(&starts)
        .bind(&ends)
        .execute(&mut *tx)
        .await?;

        if !cells.is_empty() {
            let site_ids: Vec<&str> = cells.iter().map(|c| c.site_id.as_str()).collect();
            let site_names: Vec<&str> = cells.iter().map(|c| c.site_name.as_str()).collect();
            let days: Vec<NaiveDate> = cells.iter().map(|c| c.day).collect();
            let available: Vec<bool> = cells.iter().map(|c| c.available).collect();
            let prices: Vec<Option<f64>> = cells.iter().map(|c| c.price).collect();
            let checked_at: Vec<DateTime<Utc>> = cells.iter().map(|c| c.checked_at).collect();

            sqlx::query(
                r#"
                INSERT INTO availability_cells
                    (provider, campground_id, site_id, site_name, day, available, price, checked_at)
                SELECT $1, $2, c.site_id, c.site_name, c.day, c.available, c.price, c.checked_at
                FROM UNNEST($3::text[], $4::text[], $5::date[], $6::bool[], $7::float8[], $8::timestamptz[])
                    AS c(site_id, site_name, day, available, price, checked_at)
                ON CONFLICT (provider, campground_id, site_id, day) DO UPDATE SET
                    site_name = EXCLUDED.site_name,
                    available = EXCLUDED.available,
                    price = EXCLUDED.price,
                    checked_at = EXCLUDED.checked_at
                "#,
            )
            .bind(provider)
            .bind(campground_id)
            .bind(&site_ids)
            .bind(&site_names)
            .bind(&days)
            .bind(&available)
            .bind(&prices)
            .bind(&checked_at)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        debug!(
            "Stored {} cells for {}/{} over {} ranges",
            cells.len(),
            provider,
            campground_id,
            covered.len()
        );
        Ok(())
    }

    async fn upsert_campgrounds(&self, entries: &[CampgroundEntry]) -> Result<usize, StoreError> {
        let mut tx = self.pool.begin().await?;

        for entry in entries {
            sqlx::query(
                r#"
                INSERT INTO campgrounds
                    (provider, campground_id, name, description, latitude, longitude,
                     amenities, price, url, updated_at)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, NOW())
                ON CONFLICT (provider, campground_id) DO UPDATE SET
                    name = EXCLUDED.name,
                    description = EXCLUDED.description,
                    latitude = EXCLUDED.latitude,
                    longitude = EXCLUDED.longitude,
                    amenities = EXCLUDED.amenities,
                    price = EXCLUDED.price,
                    url = EXCLUDED.url,
                    updated_at = NOW()
                "#,
            )
            .bind(&entry.provider)
            .bind(&entry.campground_id)
            .bind(&entry.name)
            .bind(&entry.description)
            .bind(entry.latitude)
            .bind(entry.longitude)
            .bind(Json(&entry.amenities))
            .bind(entry.price)
            .bind(&entry.url)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(entries.len())
    }

    async fn upsert_campsites(&self, entries: &[CampsiteEntry]) -> Result<usize, StoreError> {
        let mut tx = self.pool.begin().await?;

        for entry in entries {
            sqlx::query(
                r#"
                INSERT INTO campsites
                    (provider, campground_id, site_id, name, site_type, loop_name, latitude,
                     longitude, amenities, equipment, price, max_people, accessible, url, updated_at)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, NOW())
                ON CONFLICT (provider, campground_id, site_id) DO UPDATE SET
                    name = EXCLUDED.name,
                    site_type = EXCLUDED.site_type,
                    loop_name = EXCLUDED.loop_name,
                    latitude = EXCLUDED.latitude,
                    longitude = EXCLUDED.longitude,
                    amenities = EXCLUDED.amenities,
                    equipment = EXCLUDED.equipment,
                    price = EXCLUDED.price,
                    max_people = EXCLUDED.max_people,
                    accessible = EXCLUDED.accessible,
                    url = EXCLUDED.url,
                    updated_at = NOW()
                "#,
            )
            .bind(&entry.provider)
            .bind(&entry.campground_id)
            .bind(&entry.site_id)
            .bind(&entry.name)
            .bind(&entry.site_type)
            .bind(&entry.loop_name)
            .bind(entry.latitude)
            .bind(entry.longitude)
            .bind(Json(&entry.amenities))
            .bind(Json(&entry.equipment))
            .bind(entry.price)
            .bind(entry.max_people.map(|n| n as i32))
            .bind(entry.accessible)
            .bind(&entry.url)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(entries.len())
    }

    async fn campground_ids(&self, provider: &str) -> Result<Vec<String>, StoreError> {
        Ok(sqlx::query_scalar(
            "SELECT campground_id FROM campgrounds WHERE provider = $1 ORDER BY campground_id",
        )
        .bind(provider)
        .fetch_all(&self.pool)
        .await?)
    }

    async fn create_adhoc_request_if_idle(
        &self,
        provider: &str,
        campground_id: &str,
        requester_id: &str,
        now: DateTime<Utc>,
        cooldown: chrono::Duration,
    ) -> Result<Option<AdhocScrapeRequest>, StoreError> {
        let mut tx = self.pool.begin().await?;

        // serialize concurrent requests for the same pair until commit
        sqlx::query("SELECT pg_advisory_xact_lock(hashtext($1))")
            .bind(format!("adhoc:{}/{}", provider, campground_id))
            .execute(&mut *tx)
            .await?;

        let recent: bool = sqlx::query_scalar(
            r#"
            SELECT EXISTS (
                SELECT 1 FROM adhoc_scrape_requests
                WHERE provider = $1 AND campground_id = $2 AND requested_at > $3
            )
            "#,
        )
        .bind(provider)
        .bind(campground_id)
        .bind(now - cooldown)
        .fetch_one(&mut *tx)
        .await?;

        if recent {
            tx.rollback().await?;
            return Ok(None);
        }

        let request = AdhocScrapeRequest {
            id: Uuid::new_v4(),
            provider: provider.to_string(),
            campground_id: campground_id.to_string(),
            requester_id: requester_id.to_string(),
            requested_at: now,
            status: AdhocStatus::Pending,
            finished_at: None,
        };

        sqlx::query(
            r#"
            INSERT INTO adhoc_scrape_requests
                (id, provider, campground_id, requester_id, requested_at, status)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(request.id)
        .bind(&request.provider)
        .bind(&request.campground_id)
        .bind(&request.requester_id)
        .bind(request.requested_at)
        .bind(request.status.as_str())
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(Some(request))
    }

    async fn latest_adhoc_request(
        &self,
        provider: &str,
        campground_id: &str,
    ) -> Result<Option<AdhocScrapeRequest>, StoreError> {
        let query = format!(
            "SELECT {} FROM adhoc_scrape_requests \
             WHERE provider = $1 AND campground_id = $2 \
             ORDER BY requested_at DESC LIMIT 1",
            ADHOC_COLUMNS
        );
        let row = sqlx::query(&query)
            .bind(provider)
            .bind(campground_id)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(adhoc_from_row).transpose()
    }

    async fn set_adhoc_status(
        &self,
        id: Uuid,
        status: AdhocStatus,
        at: DateTime<Utc>,
    ) -> Result<AdhocScrapeRequest, StoreError> {
        let finished_at = (status != AdhocStatus::Pending).then_some(at);
        let query = format!(
            "UPDATE adhoc_scrape_requests SET status = $2, finished_at = $3 \
             WHERE id = $1 RETURNING {}",
            ADHOC_COLUMNS
        );
        let row = sqlx::query(&query)
            .bind(id)
            .bind(status.as_str())
            .bind(finished_at)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| StoreError::NotFound(format!("adhoc request {}", id)))?;

        adhoc_from_row(&row)
    }

    async fn record_notifications(
        &self,
        events: &[NotificationEvent],
        at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        if events.is_empty() {
            return Ok(());
        }

        let subscription_ids: Vec<Uuid> = events.iter().map(|e| e.subscription_id).collect();
        let user_ids: Vec<&str> = events.iter().map(|e| e.user_id.as_str()).collect();
        let providers: Vec<&str> = events.iter().map(|e| e.provider.as_str()).collect();
        let campground_ids: Vec<&str> = events.iter().map(|e| e.campground_id.as_str()).collect();
        let site_ids: Vec<&str> = events.iter().map(|e| e.site_id.as_str()).collect();
        let days: Vec<NaiveDate> = events.iter().map(|e| e.day).collect();

        sqlx::query(
            r#"
            INSERT INTO notification_log
                (subscription_id, user_id, provider, campground_id, site_id, day, sent_at)
            SELECT n.subscription_id, n.user_id, n.provider, n.campground_id, n.site_id, n.day, $7
            FROM UNNEST($1::uuid[], $2::text[], $3::text[], $4::text[], $5::text[], $6::date[])
                AS n(subscription_id, user_id, provider, campground_id, site_id, day)
            "#,
        )
        .bind(&subscription_ids)
        .bind(&user_ids)
        .bind(&providers)
        .bind(&campground_ids)
        .bind(&site_ids)
        .bind(&days)
        .bind(at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn digest_summary(
        &self,
        since: DateTime<Utc>,
        until: DateTime<Utc>,
    ) -> Result<DigestSummary, StoreError> {
        let totals = sqlx::query(
            r#"
            SELECT COUNT(*) AS notifications, COUNT(DISTINCT user_id) AS users
            FROM notification_log
            WHERE sent_at >= $1 AND sent_at < $2
            "#,
        )
        .bind(since)
        .bind(until)
        .fetch_one(&self.pool)
        .await?;

        let active_subscriptions: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM subscriptions WHERE active")
                .fetch_one(&self.pool)
                .await?;

        let top_rows = sqlx::query(
            r#"
            SELECT provider, campground_id, COUNT(*) AS notifications
            FROM notification_log
            WHERE sent_at >= $1 AND sent_at < $2
            GROUP BY provider, campground_id
            ORDER BY notifications DESC, campground_id
            LIMIT $3
            "#,
        )
        .bind(since)
        .bind(until)
        .bind(DIGEST_TOP_CAMPGROUNDS as i64)
        .fetch_all(&self.pool)
        .await?;

        let top_campgrounds = top_rows
            .iter()
            .map(|row| -> Result<CampgroundActivity, StoreError> {
                let notifications: i64 = row.try_get("notifications")?;
                Ok(CampgroundActivity {
                    provider: row.try_get("provider")?,
                    campground_id: row.try_get("campground_id")?,
                    notifications: notifications.max(0) as u64,
                })
            })
            .collect::<Result<Vec<_>, StoreError>>()?;

        let notifications: i64 = totals.try_get("notifications")?;
        let users: i64 = totals.try_get("users")?;

        Ok(DigestSummary {
            since,
            until,
            notifications_sent: notifications.max(0) as u64,
            users_notified: users.max(0) as u64,
            active_subscriptions: active_subscriptions.max(0) as u64,
            top_campgrounds,
        })
    }
}
