//! WASM bindings for the tonality diamond
//!
//! This module provides the JavaScript-facing API for running a diamond
//! session in a browser, with audio rendered for an AudioWorklet.

mod engine;
mod error;

pub use engine::DiamondEngine;
pub use error::DiamondError;

// Re-export wasm_bindgen for convenience
pub use wasm_bindgen::prelude::*;
