//! Audit trail of every provider attempt.
//!
//! - `logger` - [`CallLogger`], the non-blocking writer front end
//! - `sink` - the [`AuditSink`] storage seam and query filter
//! - `memory`, `jsonl` - bundled sinks
//! - `stats` - success-rate and latency aggregates
//! - `masking` - credential redaction for logged request parameters

mod jsonl;
mod logger;
mod masking;
mod memory;
mod sink;
mod stats;

pub use jsonl::{JsonlSink, DEFAULT_JSONL_PATH};
pub use logger::CallLogger;
pub use masking::mask_params;
pub use memory::MemorySink;
pub use sink::{AttemptFilter, AttemptIter, AuditSink};
pub use stats::AuditStats;
