//! Tapforge CLI library
//!
//! Exposes the configuration loader and tool-draft derivation for
//! integration testing; the binary in `main.rs` wires them to the capture
//! and relay crates.

pub mod config;
pub mod forge;

pub use config::AppConfig;
pub use forge::derive_tool_drafts;
