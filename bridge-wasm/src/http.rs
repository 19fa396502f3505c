//! `fetch`-backed [`HttpClient`] used to reach the token endpoint from a
//! browser.
//!
//! The token endpoint must allow CORS from the application origin. A request
//! timeout aborts the underlying fetch through an `AbortController`.

use async_trait::async_trait;
use bridge_traits::{
    error::{BridgeError, Result as BridgeResult},
    http::{HttpClient, HttpMethod, HttpRequest, HttpResponse},
};
use bytes::Bytes;
use futures::{
    future::{select, Either},
    pin_mut,
};
use gloo_timers::future::TimeoutFuture;
use js_sys::{Array, Uint8Array};
use std::collections::HashMap;
use wasm_bindgen::{JsCast, JsValue};
use wasm_bindgen_futures::JsFuture;
use web_sys::{AbortController, AbortSignal, Headers, Request, RequestInit, RequestMode, Response, Window};

use crate::error::{js_error, window};

/// HTTP client for the current browser window.
pub struct WasmHttpClient {
    window: Window,
}

impl WasmHttpClient {
    /// Fails with `NotAvailable` outside a window context (e.g. in a worker).
    pub fn new() -> BridgeResult<Self> {
        Ok(Self { window: window()? })
    }
}

fn method_name(method: &HttpMethod) -> &'static str {
    match method {
        HttpMethod::Get => "GET",
        HttpMethod::Post => "POST",
    }
}

fn to_fetch_request(request: &HttpRequest, signal: Option<&AbortSignal>) -> BridgeResult<Request> {
    let headers = Headers::new().map_err(|err| js_error("create headers", err))?;
    for (name, value) in &request.headers {
        headers
            .set(name, value)
            .map_err(|err| js_error("set header", err))?;
    }

    let init = RequestInit::new();
    init.set_method(method_name(&request.method));
    init.set_mode(RequestMode::Cors);
    init.set_headers(&headers);
    init.set_signal(signal);
    if let Some(body) = &request.body {
        init.set_body(&Uint8Array::from(body.as_ref()).into());
    }

    Request::new_with_str_and_init(&request.url, &init).map_err(|err| js_error("build request", err))
}

fn response_headers(response: &Response) -> HashMap<String, String> {
    let mut headers = HashMap::new();
    let Ok(Some(entries)) = js_sys::try_iter(&response.headers()) else {
        return headers;
    };
    for entry in entries.flatten() {
        let pair = Array::from(&entry);
        if let (Some(name), Some(value)) = (pair.get(0).as_string(), pair.get(1).as_string()) {
            headers.insert(name, value);
        }
    }
    headers
}

async fn response_body(response: &Response) -> BridgeResult<Bytes> {
    let promise = response
        .array_buffer()
        .map_err(|err| js_error("read response", err))?;
    let buffer = JsFuture::from(promise)
        .await
        .map_err(|err| js_error("read response", err))?;
    Ok(Bytes::from(Uint8Array::new(&buffer).to_vec()))
}

fn as_network_error(err: JsValue) -> BridgeError {
    BridgeError::Network(js_error("fetch", err).to_string())
}

#[async_trait(?Send)]
impl HttpClient for WasmHttpClient {
    async fn execute(&self, request: HttpRequest) -> BridgeResult<HttpResponse> {
        let abort = match request.timeout {
            Some(_) => Some(AbortController::new().map_err(|err| js_error("abort controller", err))?),
            None => None,
        };
        let signal = abort.as_ref().map(AbortController::signal);
        let fetch_request = to_fetch_request(&request, signal.as_ref())?;
        let fetch = JsFuture::from(self.window.fetch_with_request(&fetch_request));

        let outcome = match (request.timeout, abort) {
            (Some(timeout), Some(abort)) => {
                let millis = u32::try_from(timeout.as_millis()).unwrap_or(u32::MAX);
                let deadline = TimeoutFuture::new(millis);
                pin_mut!(fetch, deadline);
                match select(fetch, deadline).await {
                    Either::Left((outcome, _)) => outcome,
                    Either::Right(((), _)) => {
                        abort.abort();
                        return Err(BridgeError::Network(format!(
                            "request to {} timed out after {} ms",
                            request.url, millis
                        )));
                    }
                }
            }
            _ => fetch.await,
        };

        let response: Response = outcome
            .map_err(as_network_error)?
            .dyn_into()
            .map_err(|_| BridgeError::OperationFailed("fetch did not yield a Response".into()))?;
        let body = response_body(&response).await?;

        tracing::debug!(status = response.status(), url = %request.url, "fetch completed");
        Ok(HttpResponse {
            status: response.status(),
            headers: response_headers(&response),
            body,
        })
    }
}
