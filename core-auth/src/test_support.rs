//! In-memory bridge implementations for unit tests.

use async_trait::async_trait;
use bridge_traits::error::{BridgeError, Result as BridgeResult};
use bridge_traits::http::{HttpClient, HttpRequest, HttpResponse};
use bridge_traits::storage::SecureStore;
use bridge_traits::time::Clock;
use bytes::Bytes;
use chrono::{DateTime, TimeDelta, Utc};
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

#[derive(Default)]
pub struct MemorySecureStore {
    entries: Mutex<HashMap<String, Vec<u8>>>,
}

impl MemorySecureStore {
    pub fn insert(&self, key: &str, value: &[u8]) {
        self.entries
            .lock()
            .unwrap()
            .insert(key.to_string(), value.to_vec());
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.lock().unwrap().contains_key(key)
    }
}

#[async_trait]
impl SecureStore for MemorySecureStore {
    async fn set_secret(&self, key: &str, value: &[u8]) -> BridgeResult<()> {
        self.insert(key, value);
        Ok(())
    }

    async fn get_secret(&self, key: &str) -> BridgeResult<Option<Vec<u8>>> {
        Ok(self.entries.lock().unwrap().get(key).cloned())
    }

    async fn delete_secret(&self, key: &str) -> BridgeResult<()> {
        self.entries.lock().unwrap().remove(key);
        Ok(())
    }
}

pub struct FailingSecureStore;

#[async_trait]
impl SecureStore for FailingSecureStore {
    async fn set_secret(&self, _key: &str, _value: &[u8]) -> BridgeResult<()> {
        Err(BridgeError::NotAvailable("keychain locked".to_string()))
    }

    async fn get_secret(&self, _key: &str) -> BridgeResult<Option<Vec<u8>>> {
        Err(BridgeError::NotAvailable("keychain locked".to_string()))
    }

    async fn delete_secret(&self, _key: &str) -> BridgeResult<()> {
        Err(BridgeError::NotAvailable("keychain locked".to_string()))
    }
}

/// Answers requests with queued responses, in order.
#[derive(Default)]
pub struct ScriptedHttpClient {
    responses: Mutex<VecDeque<HttpResponse>>,
    requests: Mutex<Vec<HttpRequest>>,
}

impl ScriptedHttpClient {
    pub fn push_json(&self, status: u16, body: serde_json::Value) {
        self.push(status, body.to_string());
    }

    pub fn push_text(&self, status: u16, body: &str) {
        self.push(status, body.to_string());
    }

    fn push(&self, status: u16, body: String) {
        self.responses.lock().unwrap().push_back(HttpResponse {
            status,
            headers: HashMap::new(),
            body: Bytes::from(body),
        });
    }

    pub fn requests(&self) -> Vec<HttpRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl HttpClient for ScriptedHttpClient {
    async fn execute(&self, request: HttpRequest) -> BridgeResult<HttpResponse> {
        self.requests.lock().unwrap().push(request);
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| BridgeError::Network("connection refused".to_string()))
    }
}

/// Clock frozen at 2024-01-01T00:00:00Z until moved.
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl Default for ManualClock {
    fn default() -> Self {
        Self {
            now: Mutex::new(DateTime::from_timestamp(1_704_067_200, 0).unwrap()),
        }
    }
}

impl ManualClock {
    pub fn advance(&self, delta: TimeDelta) {
        *self.now.lock().unwrap() += delta;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap()
    }
}
