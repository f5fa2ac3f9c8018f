//! Repository for the `coordination_leases` table.
//!
//! Expiry is judged against the database clock (`NOW()`), so worker
//! processes with skewed clocks still agree on who holds a lease.

use std::time::Duration;

use sqlx::PgPool;

pub struct LeaseRepo;

impl LeaseRepo {
    /// Insert the lease, or take over an expired one. Returns whether
    /// `holder` now owns `key`.
    pub async fn try_acquire(
        pool: &PgPool,
        key: &str,
        holder: &str,
        lease: Duration,
    ) -> Result<bool, sqlx::Error> {
        let acquired: Option<(String,)> = sqlx::query_as(
            "INSERT INTO coordination_leases (key, holder, expires_at) \
             VALUES ($1, $2, NOW() + make_interval(secs => $3)) \
             ON CONFLICT (key) DO UPDATE SET \
                holder = EXCLUDED.holder, \
                expires_at = EXCLUDED.expires_at \
             WHERE coordination_leases.expires_at <= NOW() \
             RETURNING key",
        )
        .bind(key)
        .bind(holder)
        .bind(lease.as_secs_f64())
        .fetch_optional(pool)
        .await?;
        Ok(acquired.is_some())
    }

    /// Delete the lease if `holder` still owns it.
    pub async fn release(pool: &PgPool, key: &str, holder: &str) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM coordination_leases WHERE key = $1 AND holder = $2")
            .bind(key)
            .bind(holder)
            .execute(pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Remove leases that expired more than `grace` ago.
    pub async fn purge_expired(pool: &PgPool, grace: Duration) -> Result<u64, sqlx::Error> {
        let result = sqlx::query(
            "DELETE FROM coordination_leases \
             WHERE expires_at < NOW() - make_interval(secs => $1)",
        )
        .bind(grace.as_secs_f64())
        .execute(pool)
        .await?;
        Ok(result.rows_affected())
    }
}
