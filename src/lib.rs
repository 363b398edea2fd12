//! Rigger — deployment script generation for a Capistrano-style task runner.
//!
//! Project, stage, and host records become two generated scripts (project
//! and stage). A run writes them, hands them to the runner, and captures
//! what it prints. Every run is journaled as JSONL with BLAKE3 artifact hashes.

pub mod cli;
pub mod core;
pub mod journal;
pub mod transport;
