//! Profile Repository
//!
//! Postgres implementation of [`ProfileRepository`]. Every query is scoped to
//! the machine id of the [`ProfileScope`] it was built with.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reel_core::domain::profile::{Profile, ProfileStatus};
use reel_core::domain::proxy::Proxy;
use sqlx::PgPool;

use super::{LeaseRequest, ProfileRepository, ProfileScope};
use crate::error::{Result, StoreError, is_unique_violation};

const PROFILE_COLUMNS: &str = "name, proxy, session_dir, fingerprint, machine_id, status, \
    credit_remaining, daily_run_count, last_run_at, last_credit_check_at, lease_holder, \
    lease_expires_at, created_at, updated_at";

/// Postgres-backed profile store
#[derive(Debug, Clone)]
pub struct PgProfileRepository {
    pool: PgPool,
    scope: ProfileScope,
}

impl PgProfileRepository {
    pub fn new(pool: PgPool, scope: ProfileScope) -> Self {
        Self { pool, scope }
    }

    async fn find(&self, name: &str) -> Result<Option<Profile>> {
        let sql = format!("SELECT {} FROM profiles WHERE name = $1", PROFILE_COLUMNS);
        let row = sqlx::query_as::<_, ProfileRow>(&sql)
            .bind(name)
            .fetch_optional(&self.pool)
            .await?;

        row.map(Profile::try_from).transpose()
    }

    /// Returns the existing profile if it belongs to this machine
    fn check_owner(&self, profile: Profile) -> Result<Profile> {
        if profile.machine_id != self.scope.machine_id {
            return Err(StoreError::Conflict(format!(
                "profile {} belongs to machine {}, not {}",
                profile.name, profile.machine_id, self.scope.machine_id
            )));
        }
        Ok(profile)
    }

    fn not_found(&self, name: &str) -> StoreError {
        StoreError::NotFound(format!(
            "profile {} on machine {}",
            name, self.scope.machine_id
        ))
    }
}

#[async_trait]
impl ProfileRepository for PgProfileRepository {
    async fn seed_proxies(&self, addresses: &[String]) -> Result<u64> {
        if addresses.is_empty() {
            return Ok(0);
        }

        // Ordinality keeps the list order as the age order used on assignment
        let result = sqlx::query(
            r#"
            INSERT INTO proxies (address, added_at)
            SELECT address, $2 + (ord::DOUBLE PRECISION * INTERVAL '1 microsecond')
            FROM UNNEST($1::TEXT[]) WITH ORDINALITY AS seed(address, ord)
            ON CONFLICT (address) DO NOTHING
            "#,
        )
        .bind(addresses.to_vec())
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    async fn list_proxies(&self) -> Result<Vec<Proxy>> {
        let rows = sqlx::query_as::<_, ProxyRow>(
            r#"
            SELECT address, profile_name, added_at
            FROM proxies
            ORDER BY added_at ASC, address ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(|r| r.into()).collect())
    }

    async fn ensure_profile(&self, name: &str) -> Result<Profile> {
        if let Some(existing) = self.find(name).await? {
            return self.check_owner(existing);
        }

        let now = Utc::now();
        let mut tx = self.pool.begin().await?;

        let proxy = sqlx::query_scalar::<_, String>(
            r#"
            UPDATE proxies
            SET profile_name = $1
            WHERE address = (
                SELECT address FROM proxies
                WHERE profile_name IS NULL
                ORDER BY added_at ASC, address ASC
                LIMIT 1
                FOR UPDATE SKIP LOCKED
            )
            RETURNING address
            "#,
        )
        .bind(name)
        .fetch_optional(&mut *tx)
        .await;

        let proxy = match proxy {
            Ok(Some(proxy)) => proxy,
            Ok(None) => {
                return Err(StoreError::ResourceExhausted(format!(
                    "no unassigned proxy left for profile {}",
                    name
                )));
            }
            // A concurrent caller bound a proxy to the same name first
            Err(e) if is_unique_violation(&e) => {
                tx.rollback().await?;
                let existing = self.find(name).await?.ok_or_else(|| self.not_found(name))?;
                return self.check_owner(existing);
            }
            Err(e) => return Err(e.into()),
        };

        let sql = format!(
            r#"
            INSERT INTO profiles (name, proxy, session_dir, machine_id, status,
                                  daily_run_count, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, 0, $6, $6)
            ON CONFLICT (name) DO NOTHING
            RETURNING {}
            "#,
            PROFILE_COLUMNS
        );
        let inserted = sqlx::query_as::<_, ProfileRow>(&sql)
            .bind(name)
            .bind(&proxy)
            .bind(self.scope.session_dir(name))
            .bind(&self.scope.machine_id)
            .bind(ProfileStatus::Active.as_str())
            .bind(now)
            .fetch_optional(&mut *tx)
            .await?;

        match inserted {
            Some(row) => {
                tx.commit().await?;
                tracing::info!("Profile {} created on proxy {}", name, proxy);
                Profile::try_from(row)
            }
            None => {
                tx.rollback().await?;
                let existing = self.find(name).await?.ok_or_else(|| self.not_found(name))?;
                self.check_owner(existing)
            }
        }
    }

    async fn get_profile(&self, name: &str) -> Result<Option<Profile>> {
        self.find(name).await
    }

    async fn list_profiles(&self) -> Result<Vec<Profile>> {
        let sql = format!(
            "SELECT {} FROM profiles WHERE machine_id = $1 ORDER BY created_at ASC, name ASC",
            PROFILE_COLUMNS
        );
        let rows = sqlx::query_as::<_, ProfileRow>(&sql)
            .bind(&self.scope.machine_id)
            .fetch_all(&self.pool)
            .await?;

        rows.into_iter().map(Profile::try_from).collect()
    }

    async fn select_available_profile(
        &self,
        excluding: &[String],
        lease: &LeaseRequest,
    ) -> Result<Option<Profile>> {
        let now = Utc::now();

        // Single statement: SKIP LOCKED keeps concurrent selectors off the
        // row being stamped, and the lease predicate is re-checked on the
        // committed version before the update applies.
        let sql = format!(
            r#"
            UPDATE profiles
            SET last_run_at = $1, lease_holder = $2, lease_expires_at = $3, updated_at = $1
            WHERE name = (
                SELECT name FROM profiles
                WHERE machine_id = $4
                  AND status = $5
                  AND (credit_remaining IS NULL OR credit_remaining >= $6)
                  AND (lease_expires_at IS NULL OR lease_expires_at <= $1)
                  AND NOT (name = ANY($7))
                ORDER BY last_run_at ASC NULLS FIRST, created_at ASC
                LIMIT 1
                FOR UPDATE SKIP LOCKED
            )
            RETURNING {}
            "#,
            PROFILE_COLUMNS
        );
        let row = sqlx::query_as::<_, ProfileRow>(&sql)
            .bind(now)
            .bind(&lease.holder)
            .bind(lease.expires_at(now))
            .bind(&self.scope.machine_id)
            .bind(ProfileStatus::Active.as_str())
            .bind(self.scope.min_credit)
            .bind(excluding.to_vec())
            .fetch_optional(&self.pool)
            .await?;

        row.map(Profile::try_from).transpose()
    }

    async fn release_profile(&self, name: &str, holder: &str) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE profiles
            SET lease_holder = NULL, lease_expires_at = NULL, updated_at = $3
            WHERE name = $1 AND lease_holder = $2
            "#,
        )
        .bind(name)
        .bind(holder)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn update_credit(&self, name: &str, remaining: i32) -> Result<()> {
        let now = Utc::now();
        let result = sqlx::query(
            r#"
            UPDATE profiles
            SET credit_remaining = $2,
                last_credit_check_at = $3,
                updated_at = $3,
                status = CASE
                    WHEN status IN ('active', 'low_credit') THEN
                        CASE WHEN $2 >= $4 THEN 'active' ELSE 'low_credit' END
                    ELSE status
                END
            WHERE name = $1 AND machine_id = $5
            "#,
        )
        .bind(name)
        .bind(remaining)
        .bind(now)
        .bind(self.scope.min_credit)
        .bind(&self.scope.machine_id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(self.not_found(name));
        }
        Ok(())
    }

    async fn increment_run_count(&self, name: &str) -> Result<()> {
        let result = sqlx::query(
            r#"
            UPDATE profiles
            SET daily_run_count = daily_run_count + 1, updated_at = $2
            WHERE name = $1 AND machine_id = $3
            "#,
        )
        .bind(name)
        .bind(Utc::now())
        .bind(&self.scope.machine_id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(self.not_found(name));
        }
        Ok(())
    }

    async fn reset_daily_counts(&self) -> Result<u64> {
        let result = sqlx::query(
            r#"
            UPDATE profiles
            SET daily_run_count = 0, updated_at = $1
            WHERE machine_id = $2 AND daily_run_count <> 0
            "#,
        )
        .bind(Utc::now())
        .bind(&self.scope.machine_id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    async fn set_fingerprint(&self, name: &str, fingerprint: &str) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE profiles
            SET fingerprint = $2, updated_at = $3
            WHERE name = $1 AND machine_id = $4 AND fingerprint IS NULL
            "#,
        )
        .bind(name)
        .bind(fingerprint)
        .bind(Utc::now())
        .bind(&self.scope.machine_id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn set_status(&self, name: &str, status: ProfileStatus) -> Result<()> {
        let result = sqlx::query(
            r#"
            UPDATE profiles
            SET status = $2, updated_at = $3
            WHERE name = $1 AND machine_id = $4
            "#,
        )
        .bind(name)
        .bind(status.as_str())
        .bind(Utc::now())
        .bind(&self.scope.machine_id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(self.not_found(name));
        }
        Ok(())
    }
}

// =============================================================================
// Database Row Types
// =============================================================================

#[derive(sqlx::FromRow)]
struct ProfileRow {
    name: String,
    proxy: String,
    session_dir: String,
    fingerprint: Option<String>,
    machine_id: String,
    status: String,
    credit_remaining: Option<i32>,
    daily_run_count: i32,
    last_run_at: Option<DateTime<Utc>>,
    last_credit_check_at: Option<DateTime<Utc>>,
    lease_holder: Option<String>,
    lease_expires_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<ProfileRow> for Profile {
    type Error = StoreError;

    fn try_from(row: ProfileRow) -> Result<Self> {
        let status = row
            .status
            .parse::<ProfileStatus>()
            .map_err(|e| StoreError::Corrupt(format!("profile {}: {}", row.name, e)))?;

        Ok(Profile {
            name: row.name,
            proxy: row.proxy,
            session_dir: row.session_dir,
            fingerprint: row.fingerprint,
            machine_id: row.machine_id,
            status,
            credit_remaining: row.credit_remaining,
            daily_run_count: row.daily_run_count,
            last_run_at: row.last_run_at,
            last_credit_check_at: row.last_credit_check_at,
            lease_holder: row.lease_holder,
            lease_expires_at: row.lease_expires_at,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct ProxyRow {
    address: String,
    profile_name: Option<String>,
    added_at: DateTime<Utc>,
}

impl From<ProxyRow> for Proxy {
    fn from(row: ProxyRow) -> Self {
        Proxy {
            address: row.address,
            profile_name: row.profile_name,
            added_at: row.added_at,
        }
    }
}
