// ABOUTME: Validated domain types shared across modules.
// ABOUTME: Currently the `username@hostname` login target.

mod target;

pub use target::{Target, TargetError};
