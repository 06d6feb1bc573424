//! Facility tags for the structured log sink (spec §6).
//!
//! The spec calls for "a world-global structured log sink with severity
//! {debug, info, warn, error, fatal} and a facility tag {model, storage,
//! parser, query}." `tracing` already gives us the severity levels and a
//! per-event `target`; these constants are the facility tags to pass as
//! `target` so call sites read the same across the whole crate.

pub const FACILITY_MODEL: &str = "rdf_engine::model";
pub const FACILITY_STORAGE: &str = "rdf_engine::storage";
pub const FACILITY_PARSER: &str = "rdf_engine::parser";
pub const FACILITY_QUERY: &str = "rdf_engine::query";

/// Logs at `error` on `facility` and then aborts the process.
///
/// Fatal is terminal (spec §7): nothing else in this crate panics or
/// aborts. Reserve this for conditions where continuing would corrupt
/// state no caller can inspect (e.g. a poisoned factory-registry lock).
#[cold]
pub fn fatal(facility: &str, message: &str) -> ! {
    tracing::error!(target: "rdf_engine::fatal", facility, message);
    std::process::abort();
}
