//! Error types for WASM bindings

use wasm_bindgen::prelude::*;

/// Error type for WASM bindings
#[wasm_bindgen]
#[derive(Debug)]
pub struct DiamondError {
    message: String,
}

#[wasm_bindgen]
impl DiamondError {
    /// Get the error message
    #[wasm_bindgen(getter)]
    pub fn message(&self) -> String {
        self.message.clone()
    }
}

impl From<serde_wasm_bindgen::Error> for DiamondError {
    fn from(e: serde_wasm_bindgen::Error) -> Self {
        Self {
            message: e.to_string(),
        }
    }
}

impl From<serde_json::Error> for DiamondError {
    fn from(e: serde_json::Error) -> Self {
        Self {
            message: format!("invalid configuration: {}", e),
        }
    }
}

impl From<String> for DiamondError {
    fn from(message: String) -> Self {
        Self { message }
    }
}

impl From<&str> for DiamondError {
    fn from(message: &str) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl DiamondError {
    /// Convert to JsValue for use as error return
    pub fn into_js(self) -> JsValue {
        JsValue::from_str(&self.message)
    }
}
