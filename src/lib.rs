//! Registry lookups for Colombian business tax identifiers (NITs).
//!
//! Reads identifiers from a spreadsheet, fetches each registry page in turn,
//! extracts address, city and department, optionally attaches DANE codes and
//! writes one output row per input row.

pub mod batch;
pub mod cli;
pub mod config;
pub mod export;
pub mod extract;
pub mod geo;
pub mod identifier;
pub mod logger;
pub mod lookup;
pub mod rate_limit;
pub mod registry;
pub mod sheet;

pub use batch::{BatchRun, BatchRunner, BatchSummary, CancellationFlag, ProgressReporter};
pub use identifier::Nit;
pub use lookup::{LookupResult, ResultTable, RowStatus, Sentinel};
