//! CLI subcommand implementations.

pub mod check_mapping;
pub mod clean;
pub mod harvest;
