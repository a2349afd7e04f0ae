//! msrpc Circuit Breaker
//!
//! Wraps calls with failure-aware state transitions:
//!
//! ```text
//!            ready_to_trip(counts)              any failure
//!   Closed ───────────────────────► Open ◄─────────────────── HalfOpen
//!     ▲                               │                          │
//!     │                               │ timeout elapsed          │
//!     │                               └────────────────────────► │
//!     └──────────────────────────────────────────────────────────┘
//!              consecutive successes > max_requests
//! ```
//!
//! The breaker is generic over the wrapped call's value and error types and
//! offers both [`CircuitBreaker::execute`] and
//! [`CircuitBreaker::execute_async`].

pub mod breaker;
pub mod error;
pub mod settings;
pub mod state;

pub use breaker::CircuitBreaker;
pub use error::BreakerError;
pub use settings::{Settings, DEFAULT_FAILURE_THRESHOLD, DEFAULT_TIMEOUT};
pub use state::{Counts, State};
