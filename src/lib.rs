//! Bolão closure engine.
//!
//! Library crate exposing all modules for use by integration tests
//! and the binary entry point.

pub mod allocation;
pub mod closure;
pub mod config;
pub mod consolidation;
pub mod patterns;
pub mod selection;
pub mod storage;
pub mod types;
