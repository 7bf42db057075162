// ABOUTME: Library root for beach - exposes public types for testing.
// ABOUTME: The main binary is in main.rs.

pub mod config;
pub mod console;
pub mod credential;
pub mod diagnostics;
pub mod error;
pub mod output;
pub mod session;
pub mod ssh;
pub mod types;
