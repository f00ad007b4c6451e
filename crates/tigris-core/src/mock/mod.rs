//! In-memory storage client for testing.
//!
//! [`MockStorageClient`] runs the real pre-send hooks, records every request it
//! receives, and answers with canned responses. It never touches the network.
//!
//! # Feature Flag
//!
//! This module is only available when the `test-utils` feature is enabled:
//!
//! ```toml
//! [dev-dependencies]
//! tigris-core = { version = "...", features = ["test-utils"] }
//! ```

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;

use crate::{Error, HookRegistry, Operation, StorageClient, StorageRequest, StorageResponse};

/// Errors returned by [`MockStorageClient`].
#[derive(Debug, thiserror::Error)]
pub enum MockError {
    /// A pre-send hook rejected the request.
    #[error(transparent)]
    Hook(#[from] Error),

    /// A failure scheduled with [`MockStorageClient::fail_next`].
    #[error("mock failure: {0}")]
    Injected(String),
}

/// A storage client that records requests instead of sending them.
#[derive(Debug, Default)]
pub struct MockStorageClient {
    hooks: HookRegistry,
    requests: Mutex<Vec<StorageRequest>>,
    responses: Mutex<HashMap<Operation, StorageResponse>>,
    failure: Mutex<Option<String>>,
    hang: AtomicBool,
    yield_on_send: AtomicBool,
}

impl MockStorageClient {
    /// Creates a client answering every operation with an empty `200 OK`.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the response returned for an operation.
    pub fn with_response(self, operation: Operation, response: StorageResponse) -> Self {
        self.set_response(operation, response);
        self
    }

    /// Replaces the response returned for an operation.
    pub fn set_response(&self, operation: Operation, response: StorageResponse) {
        self.responses.lock().insert(operation, response);
    }

    /// Makes the next send fail after recording the request.
    pub fn fail_next(&self, message: impl Into<String>) {
        *self.failure.lock() = Some(message.into());
    }

    /// Makes every following send wait forever after recording the request.
    pub fn hang(&self, hang: bool) {
        self.hang.store(hang, Ordering::SeqCst);
    }

    /// Makes every following send yield to the runtime once after recording
    /// the request, so concurrently polled futures interleave.
    pub fn yield_on_send(&self, yield_on_send: bool) {
        self.yield_on_send.store(yield_on_send, Ordering::SeqCst);
    }

    /// Returns every request received so far, oldest first.
    pub fn requests(&self) -> Vec<StorageRequest> {
        self.requests.lock().clone()
    }

    /// Returns the most recent request.
    pub fn last_request(&self) -> Option<StorageRequest> {
        self.requests.lock().last().cloned()
    }

    /// Returns the number of requests received.
    pub fn request_count(&self) -> usize {
        self.requests.lock().len()
    }

    /// Forgets all recorded requests.
    pub fn clear(&self) {
        self.requests.lock().clear();
    }
}

#[async_trait::async_trait]
impl StorageClient for MockStorageClient {
    type Error = MockError;

    fn hooks(&self) -> &HookRegistry {
        &self.hooks
    }

    async fn send(&self, request: StorageRequest) -> Result<StorageResponse, MockError> {
        let operation = request.operation;
        self.requests.lock().push(request);

        if self.yield_on_send.load(Ordering::SeqCst) {
            tokio::task::yield_now().await;
        }

        if self.hang.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }

        if let Some(message) = self.failure.lock().take() {
            return Err(MockError::Injected(message));
        }

        let response = self.responses.lock().get(&operation).cloned();
        Ok(response.unwrap_or_else(StorageResponse::ok))
    }
}
