use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use config::{FunctionMode, RawConfig, SignatureConfig, SignatureType};
use context::{DaprClient, InvocationContext};
use engine::{call_shape, SignatureRouter};
use loader::{load, LoadSpec};
use tracing_subscriber::EnvFilter;

/// Serve a user-supplied function behind an HTTP endpoint.
#[derive(Debug, Parser)]
#[command(name = "fount", version)]
struct Args {
    /// Dot-separated path of the exported function to execute.
    #[arg(long)]
    target: String,

    /// Wire-invocation convention: http, cloudevent or openfunction.
    #[arg(long, default_value = "http")]
    source: String,

    /// openfunction sub-variant: subscribe or binding-receive.
    #[arg(long)]
    mode: Option<String>,

    /// Port to listen on.
    #[arg(long, default_value_t = 3000)]
    port: u16,

    /// Path of the topology configuration document.
    #[arg(long, default_value = "config.json")]
    config: PathBuf,

    /// File or directory containing the function module.
    #[arg(default_value = "./index.js")]
    code_location: PathBuf,
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let args = Args::parse();

    let Some(source) = SignatureType::parse(&args.source) else {
        tracing::error!("unknown signature type '{}'", args.source);
        return ExitCode::FAILURE;
    };
    let mode = match args.mode.as_deref() {
        None => None,
        Some(value) => match FunctionMode::parse(value) {
            Some(mode) => Some(mode),
            None => {
                tracing::error!("unknown function mode '{value}'");
                return ExitCode::FAILURE;
            }
        },
    };

    let mut raw = match RawConfig::load(&args.config) {
        Ok(raw) => raw,
        Err(err) => {
            tracing::error!("{err}");
            return ExitCode::FAILURE;
        }
    };
    raw.apply_env();

    let config = match SignatureConfig::validate(raw, source, mode) {
        Ok(config) => config,
        Err(errors) => {
            for err in &errors {
                tracing::error!("invalid configuration: {err}");
            }
            return ExitCode::FAILURE;
        }
    };

    let context = InvocationContext::new(Arc::new(DaprClient::from_env()), &config);

    let handle = match load(LoadSpec {
        code_location: args.code_location,
        target: args.target,
        shape: call_shape(source),
        context: Some(context.clone()),
    })
    .await
    {
        Ok(handle) => handle,
        Err(err) => {
            tracing::error!("{err}");
            return ExitCode::FAILURE;
        }
    };

    let router = Arc::new(SignatureRouter::new(config, handle, context));
    if let Err(err) = http::serve(router, args.port).await {
        tracing::error!("server error: {err}");
        return ExitCode::FAILURE;
    }
    ExitCode::SUCCESS
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_the_documented_surface() {
        let args = Args::parse_from(["fount", "--target", "handler"]);
        assert_eq!(args.source, "http");
        assert_eq!(args.port, 3000);
        assert_eq!(args.config, PathBuf::from("config.json"));
        assert_eq!(args.code_location, PathBuf::from("./index.js"));
    }

    #[test]
    fn mode_and_source_are_accepted() {
        let args = Args::parse_from([
            "fount",
            "--target",
            "handler",
            "--source",
            "openfunction",
            "--mode",
            "subscribe",
            "--port",
            "8080",
            "functions/",
        ]);
        assert_eq!(SignatureType::parse(&args.source), Some(SignatureType::OpenFunction));
        assert_eq!(
            args.mode.as_deref().and_then(FunctionMode::parse),
            Some(FunctionMode::Subscribe)
        );
        assert_eq!(args.code_location, PathBuf::from("functions/"));
    }
}
