//! Query planner
//!
//! Turns a SELECT statement and a live storage transaction into an ordered
//! list of map/reduce jobs wrapped in an [`Executor`].

use crate::error::Result;
use crate::executor::Executor;
use crate::job::MapReduceJob;
use crate::statement::{reduce, NowValuer, SelectStatement};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::debug;

/// An interface for creating transactions
pub trait Db: Send + Sync {
    fn begin(&self) -> Result<Box<dyn Tx>>;
}

/// A storage transaction. Dropping the transaction releases it.
pub trait Tx: Send {
    /// Create one map/reduce job per unique tag set that matches the
    /// statement. Each job comes back with its measurement, tag set,
    /// mappers, and time bounds set; the planner fills in the group-by
    /// interval and the statement.
    fn create_map_reduce_jobs(
        &mut self,
        stmt: &SelectStatement,
        tag_keys: &[String],
    ) -> Result<Vec<MapReduceJob>>;
}

type NowFn = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

/// Creates execution plans for SELECT statements
pub struct Planner {
    db: Arc<dyn Db>,
    /// Returns the current time. Defaults to `Utc::now`.
    now: NowFn,
}

impl Planner {
    /// Create a planner over the given database
    pub fn new(db: Arc<dyn Db>) -> Self {
        Self {
            db,
            now: Arc::new(Utc::now),
        }
    }

    /// Replace the clock, e.g. with a fixed instant in tests
    pub fn with_now(mut self, now: impl Fn() -> DateTime<Utc> + Send + Sync + 'static) -> Self {
        self.now = Arc::new(now);
        self
    }

    /// Create an execution plan for the statement and return an executor.
    ///
    /// The statement's condition is rewritten with `now()` replaced by the
    /// captured instant, so every job sees the same absolute time range.
    pub fn plan(&self, stmt: &SelectStatement) -> Result<Executor> {
        let now = (self.now)();

        let mut stmt = stmt.clone();
        if let Some(condition) = stmt.condition.take() {
            stmt.condition = Some(reduce(condition, &NowValuer { now }));
        }

        // An unopened transaction; dropped (and thereby released) on any
        // failure below.
        let mut tx = self.db.begin()?;

        let (interval, tag_keys) = stmt.dimensions.normalize()?;

        let mut jobs = tx.create_map_reduce_jobs(&stmt, &tag_keys)?;

        let stmt = Arc::new(stmt);
        for job in &mut jobs {
            job.interval = interval;
            job.stmt = Some(Arc::clone(&stmt));
        }

        // Rows stream out in tag-set-key order regardless of how the
        // transaction enumerated the jobs.
        jobs.sort_by(|a, b| a.key().cmp(b.key()));

        debug!(jobs = jobs.len(), interval, source = %stmt.source, "planned select statement");
        Ok(Executor::new(tx, jobs))
    }
}
