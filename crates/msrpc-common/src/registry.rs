//! Service discovery boundary.
//!
//! Servers announce `name -> host:port` after binding; client proxies resolve
//! a name to an address before every attempt. Backends such as etcd live
//! outside this workspace and plug in by implementing [`ServiceRegistry`].

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::protocol::error::{MsrpcError, Result};

/// Connection settings handed to a registry backend.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistryOptions {
    /// Backend endpoints, e.g. `["127.0.0.1:2379"]`.
    pub endpoints: Vec<String>,
    /// Dial timeout for the backend, in milliseconds. Zero means the
    /// backend's own default.
    pub dial_timeout_ms: u64,
}

#[async_trait]
pub trait ServiceRegistry: Send + Sync {
    /// Opens (or reopens) the connection to the backend.
    async fn create_client(&self, options: &RegistryOptions) -> Result<()>;

    /// Publishes `host:port` under `name`.
    async fn register_service(&self, name: &str, host: &str, port: u16) -> Result<()>;

    /// Returns the `host:port` address registered for `name`.
    async fn resolve(&self, name: &str) -> Result<String>;

    async fn close(&self) -> Result<()>;
}

/// In-memory registry backed by a fixed table.
///
/// # Example
///
/// ```
/// use msrpc_common::registry::{ServiceRegistry, StaticRegistry};
///
/// # tokio::runtime::Runtime::new().unwrap().block_on(async {
/// let registry = StaticRegistry::new().with_service("Echo", "127.0.0.1:9222");
/// assert_eq!(registry.resolve("Echo").await.unwrap(), "127.0.0.1:9222");
/// assert!(registry.resolve("Math").await.is_err());
/// # });
/// ```
#[derive(Debug, Default)]
pub struct StaticRegistry {
    services: RwLock<HashMap<String, String>>,
    closed: AtomicBool,
}

impl StaticRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a registry from `(name, address)` pairs.
    pub fn from_entries<I, N, A>(entries: I) -> Self
    where
        I: IntoIterator<Item = (N, A)>,
        N: Into<String>,
        A: Into<String>,
    {
        let services = entries
            .into_iter()
            .map(|(name, addr)| (name.into(), addr.into()))
            .collect();
        Self {
            services: RwLock::new(services),
            closed: AtomicBool::new(false),
        }
    }

    pub fn with_service(mut self, name: impl Into<String>, addr: impl Into<String>) -> Self {
        self.services.get_mut().insert(name.into(), addr.into());
        self
    }

    pub async fn len(&self) -> usize {
        self.services.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.services.read().await.is_empty()
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(MsrpcError::Registry("registry client is closed".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl ServiceRegistry for StaticRegistry {
    async fn create_client(&self, options: &RegistryOptions) -> Result<()> {
        tracing::debug!("Static registry ignores endpoints {:?}", options.endpoints);
        self.closed.store(false, Ordering::Release);
        Ok(())
    }

    async fn register_service(&self, name: &str, host: &str, port: u16) -> Result<()> {
        self.ensure_open()?;
        let addr = format!("{}:{}", host, port);
        tracing::info!("Registered service {} at {}", name, addr);
        self.services.write().await.insert(name.to_string(), addr);
        Ok(())
    }

    async fn resolve(&self, name: &str) -> Result<String> {
        self.ensure_open()?;
        self.services
            .read()
            .await
            .get(name)
            .cloned()
            .ok_or_else(|| MsrpcError::Registry(format!("service {} is not registered", name)))
    }

    async fn close(&self) -> Result<()> {
        self.closed.store(true, Ordering::Release);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_register_then_resolve() {
        let registry = StaticRegistry::new();
        registry.register_service("Echo", "10.0.0.1", 9222).await.unwrap();
        assert_eq!(registry.resolve("Echo").await.unwrap(), "10.0.0.1:9222");
        assert_eq!(registry.len().await, 1);
    }

    #[tokio::test]
    async fn test_resolve_unknown_service() {
        let registry = StaticRegistry::from_entries([("Echo", "127.0.0.1:1")]);
        assert!(matches!(
            registry.resolve("Math").await,
            Err(MsrpcError::Registry(_))
        ));
    }

    #[tokio::test]
    async fn test_reregister_overwrites_address() {
        let registry = StaticRegistry::new().with_service("Echo", "127.0.0.1:1");
        registry.register_service("Echo", "127.0.0.1", 2).await.unwrap();
        assert_eq!(registry.resolve("Echo").await.unwrap(), "127.0.0.1:2");
    }

    #[tokio::test]
    async fn test_closed_registry_rejects_calls_until_reopened() {
        let registry = StaticRegistry::new().with_service("Echo", "127.0.0.1:1");
        registry.close().await.unwrap();
        assert!(registry.resolve("Echo").await.is_err());
        assert!(registry.register_service("Math", "127.0.0.1", 3).await.is_err());

        registry.create_client(&RegistryOptions::default()).await.unwrap();
        assert_eq!(registry.resolve("Echo").await.unwrap(), "127.0.0.1:1");
    }
}
