//! msrpc Client
//!
//! - [`TcpClient`]: one connection, one exchange, with a background reader
//!   task and a read timeout
//! - [`TcpClientProxy`]: resolves services through a
//!   [`ServiceRegistry`](msrpc_common::registry::ServiceRegistry), retries
//!   transport failures and rate-limit replies, and optionally routes calls
//!   through a circuit breaker

pub mod backoff;
pub mod client;
pub mod options;
pub mod proxy;

pub use backoff::calculate_backoff;
pub use client::TcpClient;
pub use options::ClientOptions;
pub use proxy::{breaker_from_config, CallBreaker, TcpClientProxy};
