//! Batch resolution of rs-identifiers against published partitions.
//!
//! A [`LookupSession`](engine::LookupSession) loads each partition at most
//! once and keeps it until invalidated. Results are returned as a
//! [`QueryResult`](result::QueryResult) whose rows line up with the input,
//! one row per identifier, duplicates and malformed inputs included.

pub mod engine;
pub mod result;
