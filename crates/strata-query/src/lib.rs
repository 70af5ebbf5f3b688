//! Strata Query - Query planning and map/reduce execution
//!
//! This crate is the query-execution core of the database:
//! - Statement model and GROUP BY normalization
//! - Planning: one map/reduce job per matching tag set
//! - Job execution: time bucketing, per-aggregate reduction, raw results
//! - Serial execution with rows streamed over an unbuffered channel
//!
//! Storage supplies the other half of the contract: a [`Db`] that opens
//! transactions, a [`Tx`] that enumerates jobs, and a [`Mapper`] per shard.

pub mod aggregation;
pub mod error;
pub mod executor;
pub mod job;
pub mod mapper;
pub mod model;
pub mod planner;
pub mod statement;

pub use aggregation::{initialize_reduce_func, ReduceFunc};
pub use error::{QueryError, Result};
pub use executor::Executor;
pub use job::MapReduceJob;
pub use mapper::{Mapper, MapperValue};
pub use model::{sort_rows, Row, TagSet, Value};
pub use planner::{Db, Planner, Tx};
pub use statement::{BinaryOp, Call, Dimensions, Expr, Field, Literal, SelectStatement};
