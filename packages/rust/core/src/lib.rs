//! Core pipeline orchestration for coursepub.
//!
//! This crate ties together discovery, filtering, building, and publishing
//! into an end-to-end workflow ([`run_pipeline`]), and reports which artifacts
//! are held back ([`status`]).

pub mod filter;
pub mod pipeline;
pub mod status;

pub use filter::{FilterCallbacks, FilterOptions, NodeRef, filter_nodes, filter_nodes_with};
pub use pipeline::{
    PipelineResult, ProgressReporter, SilentProgress, run_pipeline, write_snapshot,
};
pub use status::{Status, StatusEntry, status};
