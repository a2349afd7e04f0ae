//! msrpc Worker Pool
//!
//! A bounded set of reusable OS threads that run submitted closures.
//!
//! - **Bounded**: never more than `capacity` live workers; `submit` parks on a
//!   condition variable when all are busy
//! - **Reusable**: a worker returns to the idle list after each task; stopped
//!   workers free their arena slot for the next spawn
//! - **Self-trimming**: a sweeper stops workers idle for longer than the expiry
//! - **Panic-safe**: a panicking task is reported to the panic handler (or
//!   logged) and the worker stays in service

pub mod error;
pub mod pool;
mod worker;

#[cfg(test)]
mod tests;

pub use error::{PoolError, Result};
pub use pool::{PanicHandler, Pool, PoolConfig, DEFAULT_EXPIRY};
