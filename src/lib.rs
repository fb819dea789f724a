// ABOUTME: Root library module for the calbridge server binary
// ABOUTME: HTTP routes, result pages, and the standalone chat host

pub mod host;
pub mod pages;
pub mod server;

// Re-export the engine so the binary and tests need a single import path
pub use calbridge_core::{config, AppContext, BridgeError, Config};
