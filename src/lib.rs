//! CROUPIER: roulette round settlement engine
//!
//! Library crate exposing all modules for use by integration tests
//! and the binary entry point.

pub mod config;
pub mod types;
pub mod rules;
pub mod engine;
pub mod projection;
pub mod storage;
