//! `crossmatch-recon`: web-analytics vs CRM reconciliation engine.
//!
//! Pure engine crate: receives the two staged relations, returns one
//! classified record per transaction id plus summary breakdowns.
//! No CLI dependencies; file reading belongs to the caller.

pub mod aggregate;
pub mod classify;
pub mod config;
pub mod engine;
pub mod error;
pub mod load;
pub mod matcher;
pub mod model;
pub mod quality;

pub use config::ReconConfig;
pub use engine::{run, run_with_rules};
pub use error::ReconError;
pub use model::{ReconInput, ReconRecord, ReconResult, ReconSummary};
