//! CLI subcommand implementations.

pub mod ingest;
pub mod query;
pub mod run;
pub mod status;
