//! Strata Core - Core types for the time series database
//!
//! This crate provides the fundamental data types used throughout Strata:
//! - `Timestamp`: Nanosecond-precision Unix epoch timestamps
//! - `SeriesId`: Unique identifier for a time series (measurement + tags)
//! - `FieldValue`: Typed field values (Float, Integer, String, Boolean)
//! - `RawPoint` / `PointPayload`: A single raw query record

pub mod types;

pub use types::*;
