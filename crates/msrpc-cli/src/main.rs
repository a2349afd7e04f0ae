//! # msrpc CLI Entry Point
//!
//! ## Usage
//!
//! ```bash
//! # Start a server with the demo services
//! msrpc serve -c conf/app.toml -b 0.0.0.0:9222
//!
//! # Make an RPC call (outputs raw JSON)
//! msrpc call 127.0.0.1:9222 Math Add -a '[1, 2]'
//! ```

use std::path::Path;
use std::sync::Arc;

use anyhow::Result;
use argh::FromArgs;
use msrpc_client::{breaker_from_config, ClientOptions, TcpClientProxy};
use msrpc_common::config::{load_config_or_default, MsrpcConfig, DEFAULT_CONFIG_PATH};
use msrpc_common::registry::StaticRegistry;
use msrpc_server::{ServerConfig, TcpServer};
use serde_json::Value;

/// Main CLI structure parsed from command-line arguments.
#[derive(FromArgs)]
/// msrpc - binary RPC over TCP
struct Cli {
    #[argh(subcommand)]
    command: Commands,
}

#[derive(FromArgs)]
#[argh(subcommand)]
enum Commands {
    Serve(ServeArgs),
    Call(CallArgs),
}

/// Arguments for starting a server.
///
/// The server exposes `Echo.Say`, `Math.Add` and `Math.Div` and runs until
/// Ctrl-C.
#[derive(FromArgs)]
#[argh(subcommand, name = "serve")]
/// start an msrpc server with the demo services
struct ServeArgs {
    /// path to the TOML configuration file
    ///
    /// Defaults are used when the file does not exist.
    #[argh(option, short = 'c', default = "DEFAULT_CONFIG_PATH.into()")]
    config: String,

    /// address to bind to, overriding `server.bind_address`
    #[argh(option, short = 'b')]
    bind: Option<String>,
}

/// Arguments for making a single RPC call.
///
/// Outputs raw JSON (no pretty-printing) to stdout. Errors are reported
/// to stderr with non-zero exit code.
///
/// # Examples
///
/// ```bash
/// msrpc call 127.0.0.1:9222 Echo Say -a '["hi"]'
/// msrpc call 127.0.0.1:9222 Math Div -a '[1, 4]' | jq .
/// ```
#[derive(FromArgs)]
#[argh(subcommand, name = "call")]
/// call a service method on a server
struct CallArgs {
    /// address of the server (host:port)
    #[argh(positional)]
    address: String,

    /// service name, e.g. "Math"
    #[argh(positional)]
    service: String,

    /// method name, e.g. "Add"
    #[argh(positional)]
    method: String,

    /// JSON array of positional arguments. Defaults to `[]`.
    #[argh(option, short = 'a', long = "args", default = "\"[]\".into()")]
    args: String,

    /// path to the TOML configuration file (retries, codec, breaker)
    #[argh(option, short = 'c', default = "DEFAULT_CONFIG_PATH.into()")]
    config: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli: Cli = argh::from_env();

    // call keeps stdout clean for piping into other tools
    if !matches!(cli.command, Commands::Call(_)) {
        let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
        tracing_subscriber::fmt().with_env_filter(env_filter).init();
    }

    match cli.command {
        Commands::Serve(args) => run_serve(args).await,
        Commands::Call(args) => run_call(args).await,
    }
}

fn load_config(path: &str) -> Result<MsrpcConfig> {
    Ok(load_config_or_default(Path::new(path))?)
}

/// Executes the `serve` subcommand.
async fn run_serve(args: ServeArgs) -> Result<()> {
    let mut config = load_config(&args.config)?;
    if let Some(bind) = args.bind {
        config.server.bind_address = bind;
    }

    let server_config = ServerConfig::from_config(&config)?;
    if let Some(limit) = &server_config.rate_limit {
        tracing::info!(
            "Rate limiting enabled: {} requests per second, burst {}",
            limit.requests_per_second,
            limit.burst_size
        );
    }

    let server = TcpServer::bind(server_config, msrpc_cli::demo::demo_services()).await?;
    let mut names: Vec<_> = server.services().service_names().collect();
    names.sort_unstable();
    tracing::info!("Serving {} on {}", names.join(", "), server.local_addr()?);

    let shutdown = server.shutdown_handle();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                tracing::info!("Received Ctrl-C");
                shutdown.trigger();
            }
            Err(e) => tracing::error!("Failed to listen for Ctrl-C: {}", e),
        }
    });

    server.run().await?;
    Ok(())
}

/// Parses the `--args` value, which must be a JSON array.
fn parse_args(raw: &str) -> Result<Vec<Value>> {
    match serde_json::from_str(raw) {
        Ok(Value::Array(values)) => Ok(values),
        Ok(other) => Err(anyhow::anyhow!(
            "Arguments must be a JSON array, got: {}",
            other
        )),
        Err(e) => Err(anyhow::anyhow!("Invalid JSON in args: {}", e)),
    }
}

/// Executes the `call` subcommand.
///
/// No tracing is initialized for this command so the output can be piped.
///
/// # Errors
///
/// Returns an error if:
/// - The args string is not a JSON array
/// - The configuration file is invalid
/// - The call fails after all retries, or the server returns an error
async fn run_call(args: CallArgs) -> Result<()> {
    let call_args = parse_args(&args.args)?;
    let config = load_config(&args.config)?;

    let registry = Arc::new(StaticRegistry::new().with_service(&args.service, &args.address));
    let mut proxy = TcpClientProxy::new(ClientOptions::from_config(&config.client)?, registry);
    if let Some(breaker) = breaker_from_config(&args.service, &config.breaker) {
        proxy = proxy.with_breaker(breaker);
    }

    let result = proxy.call(&args.service, &args.method, call_args).await?;
    println!("{}", serde_json::to_string(&result)?);

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_cli_parse_serve_defaults() {
        let args: Cli = Cli::from_args(&["msrpc"], &["serve"]).unwrap();
        match args.command {
            Commands::Serve(ServeArgs { config, bind }) => {
                assert_eq!(config, "conf/app.toml");
                assert!(bind.is_none());
            }
            _ => panic!("Expected Serve command"),
        }
    }

    #[test]
    fn test_cli_parse_serve_with_options() {
        let args: Cli =
            Cli::from_args(&["msrpc"], &["serve", "-c", "other.toml", "-b", "127.0.0.1:7000"]).unwrap();
        match args.command {
            Commands::Serve(ServeArgs { config, bind }) => {
                assert_eq!(config, "other.toml");
                assert_eq!(bind.as_deref(), Some("127.0.0.1:7000"));
            }
            _ => panic!("Expected Serve command"),
        }
    }

    #[test]
    fn test_cli_parse_call() {
        let args: Cli = Cli::from_args(
            &["msrpc"],
            &["call", "127.0.0.1:9222", "Math", "Add", "-a", "[1, 2]"],
        )
        .unwrap();
        match args.command {
            Commands::Call(CallArgs {
                address,
                service,
                method,
                args,
                config,
            }) => {
                assert_eq!(address, "127.0.0.1:9222");
                assert_eq!(service, "Math");
                assert_eq!(method, "Add");
                assert_eq!(args, "[1, 2]");
                assert_eq!(config, "conf/app.toml");
            }
            _ => panic!("Expected Call command"),
        }
    }

    #[test]
    fn test_cli_parse_call_default_args() {
        let args: Cli = Cli::from_args(&["msrpc"], &["call", "127.0.0.1:9222", "Echo", "Say"]).unwrap();
        match args.command {
            Commands::Call(CallArgs { args, .. }) => assert_eq!(args, "[]"),
            _ => panic!("Expected Call command"),
        }
    }

    #[test]
    fn test_cli_call_missing_method() {
        assert!(Cli::from_args(&["msrpc"], &["call", "127.0.0.1:9222", "Echo"]).is_err());
    }

    #[test]
    fn test_parse_args() {
        assert_eq!(parse_args("[]").unwrap(), Vec::<Value>::new());
        assert_eq!(parse_args(r#"["hi", 2]"#).unwrap(), vec![json!("hi"), json!(2)]);
        assert!(parse_args(r#"{"a": 1}"#).is_err());
        assert!(parse_args("not json").is_err());
    }

    #[test]
    fn test_load_missing_config_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = load_config(dir.path().join("absent.toml").to_str().unwrap()).unwrap();
        assert_eq!(config, MsrpcConfig::default());
    }

    #[test]
    fn test_load_invalid_config() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("app.toml");
        std::fs::write(&path, "[client]\nserializer = \"xml\"\n").unwrap();
        assert!(load_config(path.to_str().unwrap()).is_err());
    }

    #[tokio::test]
    async fn test_call_against_demo_server() {
        let server = TcpServer::bind(ServerConfig::new("127.0.0.1:0"), msrpc_cli::demo::demo_services())
            .await
            .unwrap();
        let addr = server.local_addr().unwrap();
        tokio::spawn(server.run());

        let args = CallArgs {
            address: addr.to_string(),
            service: "Math".to_string(),
            method: "Add".to_string(),
            args: "[1, 2]".to_string(),
            config: "does-not-exist.toml".to_string(),
        };
        run_call(args).await.unwrap();
    }
}
