//! Query executor
//!
//! Runs the planned jobs serially on a dedicated emission thread and
//! streams their rows through an unbuffered channel. Every mapper is closed
//! exactly once however execution ends.

use crate::error::{QueryError, Result};
use crate::job::MapReduceJob;
use crate::model::Row;
use crate::planner::Tx;
use std::fmt;
use std::sync::mpsc::{self, Receiver};
use std::thread;
use tracing::debug;

/// Executes the jobs of one planned statement and streams rows out.
///
/// An executor runs at most once; `execute` consumes it.
pub struct Executor {
    tx: Box<dyn Tx>,
    jobs: Vec<MapReduceJob>,
}

impl Executor {
    pub(crate) fn new(tx: Box<dyn Tx>, jobs: Vec<MapReduceJob>) -> Self {
        Self { tx, jobs }
    }

    /// Begin execution and return the channel rows arrive on.
    ///
    /// All jobs are opened up front; if any fails, everything opened so far
    /// is closed and the error is returned with no channel created. The
    /// channel is unbuffered: each send hands off to the consumer, and a
    /// consumer that drops the receiver stops emission at the next row.
    pub fn execute(mut self) -> Result<Receiver<Row>> {
        for i in 0..self.jobs.len() {
            if let Err(err) = self.jobs[i].open() {
                for job in &mut self.jobs {
                    job.close();
                }
                return Err(err);
            }
        }

        let (sender, receiver) = mpsc::sync_channel(0);
        let mut guard = JobGuard {
            jobs: self.jobs,
            _tx: self.tx,
        };

        thread::Builder::new()
            .name("strata-query-emit".to_string())
            .spawn(move || {
                debug!(jobs = guard.jobs.len(), "emission thread started");
                for job in &mut guard.jobs {
                    if job.execute(&sender).is_err() {
                        debug!("row receiver dropped, stopping emission");
                        break;
                    }
                }
                // close the channel before the guard closes the mappers
                drop(sender);
            })
            .map_err(|e| QueryError::Execution(format!("spawning emission thread: {e}")))?;

        Ok(receiver)
    }
}

impl fmt::Debug for Executor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Executor")
            .field("jobs", &self.jobs)
            .finish_non_exhaustive()
    }
}

/// Owns the jobs and the transaction for the duration of emission so that
/// every job is closed exactly once on every exit path, including panics
/// and consumer-side cancellation.
struct JobGuard {
    jobs: Vec<MapReduceJob>,
    _tx: Box<dyn Tx>,
}

impl Drop for JobGuard {
    fn drop(&mut self) {
        for job in &mut self.jobs {
            job.close();
        }
    }
}
