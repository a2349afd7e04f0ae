//! msrpc Server
//!
//! Accepts framed requests over TCP and dispatches them to explicitly
//! registered services.
//!
//! - **Dispatch**: `Service.Method` lookup in a read-only [`ServiceTable`];
//!   unknown names answer code 500 with "no service found" or
//!   "no service method found"
//! - **Admission**: an optional token-bucket limiter answers code 700 when no
//!   token frees up within the limiter timeout
//! - **Execution**: handlers run on blocking threads, or on a bounded
//!   [`msrpc_pool::Pool`] when configured
//!
//! # Example
//!
//! ```no_run
//! use msrpc_server::{Service, ServiceTable, ServerConfig, TcpServer};
//!
//! # async fn run() -> msrpc_common::Result<()> {
//! let services = ServiceTable::new()
//!     .with(Service::new("Echo").method("Say", |(msg,): (String,)| Ok::<_, String>(msg)));
//!
//! let server = TcpServer::bind(ServerConfig::new("127.0.0.1:9222"), services).await?;
//! server.run().await
//! # }
//! ```

pub mod config;
pub mod server;
pub mod service;
pub mod shutdown;

pub use config::ServerConfig;
pub use server::TcpServer;
pub use service::{DispatchError, Handler, HandlerResult, Service, ServiceTable};
pub use shutdown::Shutdown;
