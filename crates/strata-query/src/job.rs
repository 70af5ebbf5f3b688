//! Map/reduce job execution
//!
//! One job exists per (measurement, tag set). A job owns the mappers that
//! cover every shard holding data for its tag set, drives them forward
//! through uniform time intervals, reduces their per-interval outputs, and
//! emits exactly one row.

use crate::aggregation::{initialize_reduce_func, ReduceFunc};
use crate::error::{QueryError, Result};
use crate::mapper::{Mapper, MapperValue};
use crate::model::{Row, TagSet, Value};
use crate::statement::{Call, SelectStatement};
use once_cell::sync::OnceCell;
use std::fmt;
use std::sync::mpsc::{SendError, SyncSender};
use std::sync::Arc;
use strata_core::{PointPayload, Timestamp};
use tracing::{debug, warn};

/// The unit of execution for one (measurement, tag set) pair.
///
/// The storage transaction constructs jobs with their measurement, tag set,
/// mappers, and time bounds; the planner imprints the group-by interval and
/// the statement before execution.
pub struct MapReduceJob {
    /// The measurement this job reads
    pub measurement: String,
    /// The tag set this job covers
    pub tag_set: TagSet,
    /// Minimum time bound of the query, nanosecond epoch
    pub tmin: Timestamp,
    /// Maximum time bound of the query, nanosecond epoch
    pub tmax: Timestamp,
    /// One mapper per shard holding data for this tag set
    mappers: Vec<Box<dyn Mapper + Send>>,
    /// Group-by interval in nanoseconds, zero when ungrouped; set by the planner
    pub(crate) interval: i64,
    /// The statement this job was created for; set by the planner
    pub(crate) stmt: Option<Arc<SelectStatement>>,
    key: OnceCell<String>,
}

impl MapReduceJob {
    /// Create a job. Mappers must be non-empty and `tmin <= tmax`.
    pub fn new(
        measurement: impl Into<String>,
        tag_set: TagSet,
        mappers: Vec<Box<dyn Mapper + Send>>,
        tmin: Timestamp,
        tmax: Timestamp,
    ) -> Self {
        Self {
            measurement: measurement.into(),
            tag_set,
            tmin,
            tmax,
            mappers,
            interval: 0,
            stmt: None,
            key: OnceCell::new(),
        }
    }

    /// The key this job sorts under: measurement name followed by the tag
    /// set key. Computed once.
    pub fn key(&self) -> &str {
        self.key
            .get_or_init(|| format!("{}{}", self.measurement, self.tag_set.key))
    }

    /// Open every mapper. On the first failure, close the mappers opened so
    /// far and return the error.
    pub fn open(&mut self) -> Result<()> {
        for i in 0..self.mappers.len() {
            if let Err(err) = self.mappers[i].open() {
                self.close();
                return Err(err);
            }
        }
        Ok(())
    }

    /// Close every mapper. Safe to call more than once.
    pub fn close(&mut self) {
        for mapper in &mut self.mappers {
            mapper.close();
        }
    }

    /// Execute the job, emitting exactly one row on `out`. Called from the
    /// executor's emission task; a send error means the receiver is gone
    /// and the caller should stop emitting.
    pub fn execute(&mut self, out: &SyncSender<Row>) -> std::result::Result<(), SendError<Row>> {
        let Some(stmt) = self.stmt.clone() else {
            return out.send(self.error_row(QueryError::Execution(
                "job executed before planning".to_string(),
            )));
        };
        debug!(measurement = %self.measurement, key = %self.key(), "executing map reduce job");

        // One reduce function per aggregate. A raw query gets a single nil
        // call bound to the raw reducer.
        let aggregates = stmt.aggregate_calls();
        let is_raw = aggregates.is_empty();
        let mut calls: Vec<Option<Call>> = aggregates.into_iter().map(Some).collect();
        if is_raw {
            calls.push(None);
        }
        let mut reduce_funcs: Vec<ReduceFunc> = Vec::with_capacity(calls.len());
        for call in &calls {
            match initialize_reduce_func(call.as_ref()) {
                Ok(f) => reduce_funcs.push(f),
                Err(err) => return out.send(self.error_row(err)),
            }
        }

        let (interval, point_count) = bucket_layout(self.tmin, self.tmax, self.interval, is_raw);
        debug!(interval, point_count, "bucket layout");

        // Seed each bucket with the UTC wall time of its lower edge.
        let mut result_values: Vec<Vec<Value>> = (0..point_count)
            .map(|i| {
                let mut vals = Vec::with_capacity(calls.len() + 1);
                vals.push(Value::time(self.tmin + i as i64 * interval));
                vals
            })
            .collect();

        for (call, reduce) in calls.iter().zip(&reduce_funcs) {
            if let Err(err) = self.process_aggregate(call.as_ref(), reduce, interval, &mut result_values)
            {
                warn!(measurement = %self.measurement, error = %err, "map reduce job failed");
                return out.send(self.error_row(err));
            }
        }

        if is_raw {
            return out.send(self.process_raw_results(&stmt, result_values));
        }

        let mut columns = Vec::with_capacity(calls.len() + 1);
        columns.push("time".to_string());
        for call in calls.iter().flatten() {
            columns.push(call.name.clone());
        }

        out.send(Row {
            name: self.measurement.clone(),
            tags: self.tag_set.tags.clone(),
            columns,
            values: result_values,
            err: None,
        })
    }

    /// Run one aggregate across every mapper and every bucket, appending the
    /// reduced value to each bucket row.
    fn process_aggregate(
        &mut self,
        call: Option<&Call>,
        reduce: &ReduceFunc,
        interval: i64,
        result_values: &mut [Vec<Value>],
    ) -> Result<()> {
        for mapper in &mut self.mappers {
            mapper.begin(call, self.tmin)?;
        }

        let mut outputs: Vec<Option<MapperValue>> = vec![None; self.mappers.len()];
        for bucket in result_values.iter_mut() {
            for (slot, mapper) in outputs.iter_mut().zip(&mut self.mappers) {
                *slot = mapper.next_interval(interval)?;
            }
            bucket.push(reduce(&outputs)?);
        }
        Ok(())
    }

    /// Convert the raw reducer's output into a row of per-record values.
    fn process_raw_results(&self, stmt: &SelectStatement, result_values: Vec<Vec<Value>>) -> Row {
        let mut columns = stmt.names_in_select();
        // time is always in the columns the caller gets back
        if !columns.iter().any(|c| c == "time") {
            columns.insert(0, "time".to_string());
        }

        // a single selected value is delivered bare rather than as a field map
        let single_value = columns.len() == 2;

        let mut row = Row {
            name: self.measurement.clone(),
            tags: self.tag_set.tags.clone(),
            columns,
            values: Vec::new(),
            err: None,
        };

        // raw queries reduce into one bucket shaped [time, batch]
        let batch = match result_values.into_iter().next() {
            Some(bucket) if bucket.len() == 2 => match bucket.into_iter().nth(1) {
                Some(Value::Batch(points)) => points,
                _ => {
                    debug!(measurement = %self.measurement, "raw bucket holds no batch");
                    return row;
                }
            },
            _ => {
                debug!(measurement = %self.measurement, "raw result shape mismatch");
                return row;
            }
        };

        for point in batch {
            let vals = row
                .columns
                .iter()
                .map(|column| {
                    if column == "time" {
                        Value::time(point.timestamp)
                    } else {
                        match &point.payload {
                            PointPayload::Value(v) if single_value => Value::from(v.clone()),
                            payload => payload
                                .field(column)
                                .cloned()
                                .map(Value::from)
                                .unwrap_or(Value::Null),
                        }
                    }
                })
                .collect();
            row.values.push(vals);
        }

        row
    }

    fn error_row(&self, err: QueryError) -> Row {
        Row::error(self.measurement.clone(), self.tag_set.tags.clone(), err)
    }
}

impl fmt::Debug for MapReduceJob {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MapReduceJob")
            .field("measurement", &self.measurement)
            .field("key", &self.tag_set.key)
            .field("mappers", &self.mappers.len())
            .field("tmin", &self.tmin)
            .field("tmax", &self.tmax)
            .field("interval", &self.interval)
            .finish()
    }
}

/// Compute the effective interval and bucket count for a query range.
///
/// Without a start time or a group-by interval, and for raw queries, the
/// whole range is one bucket. Otherwise the upper edge snaps up to the next
/// interval multiple, so the grid is self-aligning and does not depend on
/// `tmax` modulo the interval.
fn bucket_layout(tmin: i64, tmax: i64, interval: i64, is_raw: bool) -> (i64, usize) {
    if tmin == 0 || interval == 0 || is_raw {
        (tmax - tmin, 1)
    } else {
        let interval_top = tmax / interval * interval + interval;
        (interval, ((interval_top - tmin) / interval) as usize)
    }
}
