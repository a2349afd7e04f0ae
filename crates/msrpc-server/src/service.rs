//! Explicit service registration.
//!
//! Each method is registered with a typed handler. The wire arguments (a JSON
//! array) are decoded into the handler's parameter type, so a tuple such as
//! `(String, i64)` maps arguments positionally and a mismatch is reported as
//! an invalid-arguments error instead of reaching the handler.

use std::collections::HashMap;
use std::fmt::Display;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

/// Reasons a request did not produce a result. The `Display` text is what
/// the caller sees in the response message.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DispatchError {
    #[error("no service found")]
    NoService,

    #[error("no service method found")]
    NoMethod,

    #[error("invalid arguments: {0}")]
    InvalidArguments(String),

    /// The handler returned an error.
    #[error("{0}")]
    Failed(String),

    #[error("handler panicked")]
    Panicked,

    #[error("worker pool closed")]
    PoolClosed,
}

pub type HandlerResult = std::result::Result<Value, DispatchError>;

/// Type-erased handler: wire arguments in, encoded result out.
pub type Handler = Arc<dyn Fn(Vec<Value>) -> HandlerResult + Send + Sync>;

/// A named group of methods.
///
/// # Example
///
/// ```
/// use msrpc_server::Service;
///
/// let echo = Service::new("Echo")
///     .method("Say", |(msg,): (String,)| Ok::<_, String>(msg))
///     .method("Concat", |(a, b): (String, String)| Ok::<_, String>(a + &b));
/// assert_eq!(echo.name(), "Echo");
/// ```
pub struct Service {
    name: String,
    methods: HashMap<String, Handler>,
}

impl Service {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            methods: HashMap::new(),
        }
    }

    /// Registers `handler` under `method`.
    ///
    /// `A` is decoded from the argument array, `R` is encoded as the result,
    /// and `E`'s display text becomes the error message.
    pub fn method<A, R, E, F>(mut self, method: impl Into<String>, handler: F) -> Self
    where
        A: DeserializeOwned,
        R: Serialize,
        E: Display,
        F: Fn(A) -> Result<R, E> + Send + Sync + 'static,
    {
        let handler = move |args: Vec<Value>| -> HandlerResult {
            let params: A =
                decode_args(args).map_err(|e| DispatchError::InvalidArguments(e.to_string()))?;
            let result = handler(params).map_err(|e| DispatchError::Failed(e.to_string()))?;
            serde_json::to_value(result)
                .map_err(|e| DispatchError::Failed(format!("failed to encode result: {}", e)))
        };
        self.methods.insert(method.into(), Arc::new(handler));
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn method_names(&self) -> impl Iterator<Item = &str> {
        self.methods.keys().map(String::as_str)
    }
}

/// Empty argument lists also decode into types that expect `null`, such as `()`.
fn decode_args<A: DeserializeOwned>(args: Vec<Value>) -> serde_json::Result<A> {
    if args.is_empty() {
        if let Ok(params) = serde_json::from_value(Value::Null) {
            return Ok(params);
        }
    }
    serde_json::from_value(Value::Array(args))
}

/// All services a server exposes, keyed by name.
///
/// Built before the server starts and read-only afterwards.
#[derive(Default)]
pub struct ServiceTable {
    services: HashMap<String, Service>,
}

impl ServiceTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a service, replacing any service with the same name.
    pub fn register(&mut self, service: Service) -> &mut Self {
        self.services.insert(service.name.clone(), service);
        self
    }

    pub fn with(mut self, service: Service) -> Self {
        self.register(service);
        self
    }

    pub fn lookup(&self, service: &str, method: &str) -> Result<Handler, DispatchError> {
        let service = self.services.get(service).ok_or(DispatchError::NoService)?;
        service
            .methods
            .get(method)
            .cloned()
            .ok_or(DispatchError::NoMethod)
    }

    pub fn service_names(&self) -> impl Iterator<Item = &str> {
        self.services.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.services.len()
    }

    pub fn is_empty(&self) -> bool {
        self.services.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use serde_json::json;

    #[derive(Deserialize)]
    struct Pair {
        a: i64,
        b: i64,
    }

    fn table() -> ServiceTable {
        ServiceTable::new()
            .with(
                Service::new("Math")
                    .method("Add", |(a, b): (i64, i64)| Ok::<_, String>(a + b))
                    .method("AddPair", |(pair,): (Pair,)| Ok::<_, String>(pair.a + pair.b))
                    .method("Div", |(a, b): (i64, i64)| {
                        if b == 0 {
                            Err("division by zero".to_string())
                        } else {
                            Ok(a / b)
                        }
                    }),
            )
            .with(Service::new("Clock").method("Zero", |(): ()| Ok::<_, String>(0)))
    }

    fn call(table: &ServiceTable, service: &str, method: &str, args: Vec<Value>) -> HandlerResult {
        let handler = table.lookup(service, method)?;
        handler(args)
    }

    #[test]
    fn test_positional_arguments() {
        assert_eq!(call(&table(), "Math", "Add", vec![json!(2), json!(3)]), Ok(json!(5)));
    }

    #[test]
    fn test_struct_argument() {
        assert_eq!(
            call(&table(), "Math", "AddPair", vec![json!({"a": 4, "b": 5})]),
            Ok(json!(9))
        );
    }

    #[test]
    fn test_no_arguments() {
        assert_eq!(call(&table(), "Clock", "Zero", vec![]), Ok(json!(0)));
    }

    #[test]
    fn test_missing_service_and_method() {
        let table = table();
        assert_eq!(call(&table, "Nope", "Add", vec![]), Err(DispatchError::NoService));
        assert_eq!(call(&table, "Math", "Nope", vec![]), Err(DispatchError::NoMethod));
        assert_eq!(DispatchError::NoService.to_string(), "no service found");
        assert_eq!(DispatchError::NoMethod.to_string(), "no service method found");
    }

    #[test]
    fn test_argument_mismatch() {
        let result = call(&table(), "Math", "Add", vec![json!("two"), json!(3)]);
        assert!(matches!(result, Err(DispatchError::InvalidArguments(_))));

        let result = call(&table(), "Math", "Add", vec![json!(1)]);
        assert!(matches!(result, Err(DispatchError::InvalidArguments(_))));
    }

    #[test]
    fn test_handler_error_message() {
        assert_eq!(
            call(&table(), "Math", "Div", vec![json!(1), json!(0)]),
            Err(DispatchError::Failed("division by zero".to_string()))
        );
    }

    #[test]
    fn test_table_listing() {
        let table = table();
        assert_eq!(table.len(), 2);
        let mut names: Vec<_> = table.service_names().collect();
        names.sort();
        assert_eq!(names, vec!["Clock", "Math"]);
    }
}
