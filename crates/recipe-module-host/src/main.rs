// Entry point for the recipe module host.
//
// Usage:
//   recipe-module-host <operation> [--params <file>] [--format json|yaml] [--no-http-client]
//   recipe-module-host --list
//
// The parameter document is read from `--params` or stdin. The ExecutionResult
// is printed as JSON on stdout, diagnostics go to stderr.

use anyhow::{Context, Result};
use clap::Parser;
use recipe_module_host::{exit_code, exit_code_for, parse_parameters, read_document, DocumentFormat};
use recipe_modules::{Method, ModuleRegistry, ModuleSettings};
use recipe_sdk::{Package, TracingTraceWriter};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

/// Command-line arguments for the module host.
#[derive(Parser, Debug)]
#[command(name = "recipe-module-host", version, about = "Run one recipe step operation")]
struct Args {
    /// Operation to run, e.g. `run`, `download_file` or `make_dir`.
    #[arg(required_unless_present = "list")]
    operation: Option<String>,

    /// File holding the parameter document. Read from stdin when omitted.
    #[arg(long)]
    params: Option<PathBuf>,

    /// Syntax of the parameter document.
    #[arg(long, value_enum, default_value_t = DocumentFormat::Json)]
    format: DocumentFormat,

    /// Download with the fallback stream transport only.
    #[arg(long = "no-http-client")]
    no_http_client: bool,

    /// Print every available operation and exit.
    #[arg(long)]
    list: bool,
}

fn main() -> ExitCode {
    let args = Args::parse();

    // stdout carries the result document, so diagnostics go to stderr
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(log_filter())
        .init();

    // Ctrl+C terminates a running command instead of orphaning it.
    let cancellation_token = CancellationToken::new();
    {
        let token = cancellation_token.clone();
        if let Err(e) = ctrlc::set_handler(move || token.cancel()) {
            tracing::warn!("Failed to install the Ctrl+C handler: {e}");
        }
    }

    let runtime = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            eprintln!("Failed to build Tokio runtime: {e}");
            return ExitCode::from(exit_code::FATAL);
        }
    };

    match runtime.block_on(run(args, cancellation_token)) {
        Ok(code) => ExitCode::from(code),
        Err(e) => {
            eprintln!("{e:#}");
            ExitCode::from(exit_code::FATAL)
        }
    }
}

/// `RUST_LOG` when set and valid, `info` otherwise.
fn log_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
}

async fn run(args: Args, cancellation_token: CancellationToken) -> Result<u8> {
    tracing::debug!("recipe-module-host {} ({})", Package::VERSION, Package::COMMIT_HASH);

    let mut settings = ModuleSettings::from_env();
    if args.no_http_client {
        settings = settings.without_http_client();
    }
    let registry = ModuleRegistry::with_default_modules(
        &settings,
        Arc::new(TracingTraceWriter),
        cancellation_token,
    )?;

    if args.list {
        for (module, operation) in registry.operations() {
            println!("{operation}\t{module}");
        }
        return Ok(exit_code::SUCCESS);
    }

    let operation = args.operation.context("An operation name is required")?;
    let document = read_document(args.params.as_deref())?;
    let parameters = parse_parameters(&document, args.format)?;

    let result = registry
        .run(&Method::with_parameters(operation, parameters))
        .await?;
    println!(
        "{}",
        serde_json::to_string(&result).context("Failed to serialize the result")?
    );
    Ok(exit_code_for(&result))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_operation_and_flags() {
        let args = Args::try_parse_from([
            "recipe-module-host",
            "download_file",
            "--params",
            "params.yaml",
            "--format",
            "yaml",
            "--no-http-client",
        ])
        .unwrap();
        assert_eq!(args.operation.as_deref(), Some("download_file"));
        assert_eq!(args.params, Some(PathBuf::from("params.yaml")));
        assert_eq!(args.format, DocumentFormat::Yaml);
        assert!(args.no_http_client);
    }

    #[test]
    fn list_does_not_need_an_operation() {
        let args = Args::try_parse_from(["recipe-module-host", "--list"]).unwrap();
        assert!(args.list);
        assert_eq!(args.format, DocumentFormat::Json);
        assert!(Args::try_parse_from(["recipe-module-host"]).is_err());
    }

    #[tokio::test]
    async fn runs_an_operation_from_a_parameter_file() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("made");
        let params = dir.path().join("params.json");
        std::fs::write(
            &params,
            serde_json::json!({ "dir": target.to_string_lossy() }).to_string(),
        )
        .unwrap();

        let args = Args::try_parse_from([
            "recipe-module-host".into(),
            "make_dir".into(),
            "--params".into(),
            params.into_os_string(),
        ])
        .unwrap();
        let code = run(args, CancellationToken::new()).await.unwrap();
        assert_eq!(code, exit_code::SUCCESS);
        assert!(target.is_dir());
    }

    #[test]
    fn log_filter_honors_rust_log() {
        std::env::set_var("RUST_LOG", "debug");
        assert_eq!(log_filter().to_string(), "debug");
        std::env::remove_var("RUST_LOG");
        assert_eq!(log_filter().to_string(), "info");
    }

    #[tokio::test]
    async fn first_unexpected_key_follows_document_order() {
        let dir = tempfile::tempdir().unwrap();
        let params = dir.path().join("params.yaml");
        std::fs::write(&params, "command: ls
zzz: 1
aaa: 2
").unwrap();

        let args = Args::try_parse_from([
            "recipe-module-host".into(),
            "run".into(),
            "--params".into(),
            params.into_os_string(),
            "--format".into(),
            "yaml".into(),
        ])
        .unwrap();
        let err = run(args, CancellationToken::new()).await.unwrap_err();
        assert_eq!(err.to_string(), "Unexpected parameter name \"zzz\".");
    }

    #[tokio::test]
    async fn unknown_operation_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let params = dir.path().join("params.json");
        std::fs::write(&params, "[]").unwrap();

        let args = Args::try_parse_from([
            "recipe-module-host".into(),
            "format_disk".into(),
            "--params".into(),
            params.into_os_string(),
        ])
        .unwrap();
        assert!(run(args, CancellationToken::new()).await.is_err());
    }
}
