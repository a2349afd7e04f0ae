use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;

pub type RequestId = u64;

/// A call to `service_name.method_name` with positional arguments.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Request {
    pub request_id: RequestId,
    pub service_name: String,
    pub method_name: String,
    pub args: Vec<Value>,
}

impl Request {
    pub fn new(
        request_id: RequestId,
        service_name: impl Into<String>,
        method_name: impl Into<String>,
        args: Vec<Value>,
    ) -> Self {
        Request {
            request_id,
            service_name: service_name.into(),
            method_name: method_name.into(),
            args,
        }
    }
}

/// Monotonic request id source.
///
/// Clones share the same counter, so a proxy and every client it opens
/// draw from one sequence. Ids start at 1.
#[derive(Debug, Clone, Default)]
pub struct RequestIdSequence {
    counter: Arc<AtomicU64>,
}

impl RequestIdSequence {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next_id(&self) -> RequestId {
        self.counter.fetch_add(1, Ordering::Relaxed) + 1
    }
}
