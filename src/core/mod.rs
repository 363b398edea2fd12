//! Core deployment logic — records, value casting, script generation, execution.

pub mod codegen;
pub mod error;
pub mod executor;
pub mod literal;
pub mod parser;
pub mod state;
pub mod typecast;
pub mod types;
