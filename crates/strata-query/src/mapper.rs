//! The mapper interface supplied by the storage layer
//!
//! A mapper is a forward-only, per-shard cursor. The storage transaction
//! constructs one mapper per shard per tag set; the engine drives them
//! forward through time in uniform intervals and never touches shard
//! internals directly.

use crate::error::Result;
use crate::statement::Call;
use strata_core::{FieldValue, RawPoint, Timestamp};

/// One mapper's partial result for a single time interval.
///
/// The shape depends on the aggregate the mapper was bound to with
/// [`Mapper::begin`]; the matching reducer rejects any other shape.
#[derive(Debug, Clone, PartialEq)]
pub enum MapperValue {
    /// A single value, e.g. a per-shard sum or count
    Scalar(FieldValue),
    /// A count/sum pair for weighted mean reduction
    MeanPartial { count: u64, sum: f64 },
    /// A value with the timestamp it was observed at, for first/last
    Timed {
        timestamp: Timestamp,
        value: FieldValue,
    },
    /// All observed values, for percentile reduction
    Samples(Vec<f64>),
    /// Time-ordered raw records within the interval, for raw queries
    Batch(Vec<RawPoint>),
}

impl MapperValue {
    /// Short description of the variant, for error messages
    pub fn kind(&self) -> &'static str {
        match self {
            MapperValue::Scalar(_) => "scalar",
            MapperValue::MeanPartial { .. } => "mean partial",
            MapperValue::Timed { .. } => "timed value",
            MapperValue::Samples(_) => "samples",
            MapperValue::Batch(_) => "raw batch",
        }
    }
}

/// A forward-only cursor over one shard's data for one tag set.
///
/// Lifecycle: `open` acquires shard resources, `begin` binds the cursor to
/// an aggregate call and a start time, `next_interval` yields consecutive
/// half-open windows `[start + k*i, start + (k+1)*i)`, and `close` releases
/// resources. `begin` may be called again with a different call; it must
/// reset the cursor to the start time. `close` is idempotent.
pub trait Mapper: Send {
    /// Acquire shard resources. Failure leaves the mapper unopened.
    fn open(&mut self) -> Result<()>;

    /// Bind to an aggregate call (None for raw queries) and commit to a
    /// forward scan starting at `start`.
    fn begin(&mut self, call: Option<&Call>, start: Timestamp) -> Result<()>;

    /// Produce the partial result for the next interval of the given width.
    /// Returns `Ok(None)` when the window holds no data or the cursor is
    /// exhausted. Outputs are time-ordered and non-overlapping.
    fn next_interval(&mut self, interval: i64) -> Result<Option<MapperValue>>;

    /// Release resources. Idempotent; valid in any state.
    fn close(&mut self);
}
