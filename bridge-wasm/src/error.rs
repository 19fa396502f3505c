//! Conversion of JavaScript exceptions into bridge errors.

use bridge_traits::error::BridgeError;
use wasm_bindgen::{JsCast, JsValue};

/// Convert a thrown JavaScript value into a [`BridgeError`] tagged with `context`.
pub fn js_error(context: &str, err: JsValue) -> BridgeError {
    let message = if err.is_string() {
        err.as_string().unwrap_or_default()
    } else if let Some(js_err) = err.dyn_ref::<js_sys::Error>() {
        js_err.message().into()
    } else {
        format!("{err:?}")
    };
    BridgeError::OperationFailed(format!("{context}: {message}"))
}

/// The global `window`, or `NotAvailable` inside workers.
pub fn window() -> Result<web_sys::Window, BridgeError> {
    web_sys::window().ok_or_else(|| BridgeError::NotAvailable("window".to_string()))
}
