//! Type-safe tool argument modules.
//!
//! This module contains the types that implement `ToolArgs` for each external
//! Windows tool. Each one maps Rust fields to the exact flags the tool expects.

pub mod netsh;
pub mod reg;
pub mod system;
pub mod winget;
