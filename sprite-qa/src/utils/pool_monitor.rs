//! Connection pool monitoring utilities
//!
//! Instrumented transactions that log acquisition and hold timing, used for
//! every multi-statement write (job completion, verification outcome,
//! cleanup).

use sprite_common::Result;
use sqlx::{Sqlite, SqliteConnection, Transaction};
use std::time::Instant;

/// Transaction that reports how long it waited for and held its connection
pub struct MonitoredTransaction<'c> {
    tx: Transaction<'c, Sqlite>,
    guard: HoldGuard,
}

/// Logs how long the connection was held; reports drops that skipped
/// commit/rollback (error paths roll back implicitly).
struct HoldGuard {
    caller: &'static str,
    acquired_at: Instant,
    released: bool,
}

impl HoldGuard {
    fn release(&mut self, how: &'static str) {
        self.released = true;
        let held_ms = self.acquired_at.elapsed().as_millis();
        if held_ms > 2000 {
            tracing::warn!(
                caller = self.caller,
                held_ms,
                how,
                "Transaction held open over 2s"
            );
        } else {
            tracing::debug!(caller = self.caller, held_ms, how, "Connection released");
        }
    }
}

impl Drop for HoldGuard {
    fn drop(&mut self) {
        if !self.released {
            tracing::debug!(
                caller = self.caller,
                held_ms = self.acquired_at.elapsed().as_millis(),
                "Transaction dropped without commit (rolled back)"
            );
        }
    }
}

impl<'c> MonitoredTransaction<'c> {
    /// Connection to run statements on inside the transaction
    pub fn conn(&mut self) -> &mut SqliteConnection {
        &mut self.tx
    }

    /// Commit the transaction and log release timing
    pub async fn commit(self) -> Result<()> {
        let Self { tx, mut guard } = self;
        tx.commit().await?;
        guard.release("commit");
        Ok(())
    }

    /// Roll back the transaction and log release timing
    pub async fn rollback(self) -> Result<()> {
        let Self { tx, mut guard } = self;
        tx.rollback().await?;
        guard.release("rollback");
        Ok(())
    }
}

/// Begin a transaction tagged with `caller` for timing logs
///
/// # Example
/// ```ignore
/// let mut tx = begin_monitored(&pool, "cleanup::reset_all").await?;
/// sqlx::query("DELETE FROM verification_records").execute(tx.conn()).await?;
/// tx.commit().await?;
/// ```
pub async fn begin_monitored<'c>(
    pool: &'c sqlx::SqlitePool,
    caller: &'static str,
) -> Result<MonitoredTransaction<'c>> {
    let start = Instant::now();

    let tx = pool.begin().await?;

    let wait_ms = start.elapsed().as_millis();
    if wait_ms > 1000 {
        tracing::warn!(
            caller,
            wait_ms,
            "Slow transaction start, pool busy"
        );
    } else {
        tracing::debug!(caller, wait_ms, "Connection acquired");
    }

    Ok(MonitoredTransaction {
        tx,
        guard: HoldGuard {
            caller,
            acquired_at: Instant::now(),
            released: false,
        },
    })
}
