use std::process::ExitCode;

use deltaflow::config::{load_config, AppConfig, Dialect};
use deltaflow::error::StreamError;
use deltaflow::normalize::normalize_stream;
use deltaflow::observability::init_tracing;
use deltaflow::protocol::openai_chat::stream::OpenAiChatDialect;
use deltaflow::protocol::openai_completion::stream::OpenAiCompletionDialect;
use deltaflow::protocol::parts::StreamPart;
use futures_util::{Stream, StreamExt};
use tokio::io::{AsyncWrite, AsyncWriteExt, BufWriter};
use tokio_util::io::ReaderStream;
use tokio_util::sync::CancellationToken;

const USAGE: &str = "usage: deltaflow [--config <path>] <capture.sse>";

struct Args {
    config: Option<String>,
    capture: String,
}

fn parse_args(mut args: impl Iterator<Item = String>) -> Result<Args, String> {
    let mut config = None;
    let mut capture = None;
    while let Some(arg) = args.next() {
        if arg == "--config" || arg == "-c" {
            config = Some(args.next().ok_or("--config requires a path")?);
        } else if arg == "--help" || arg == "-h" {
            return Err(USAGE.to_string());
        } else if arg.starts_with('-') {
            return Err(format!("unknown flag '{arg}'"));
        } else if capture.is_some() {
            return Err("expected a single capture file".to_string());
        } else {
            capture = Some(arg);
        }
    }
    let capture = capture.ok_or_else(|| USAGE.to_string())?;
    Ok(Args { config, capture })
}

fn main() -> ExitCode {
    let args = match parse_args(std::env::args().skip(1)) {
        Ok(args) => args,
        Err(msg) => {
            eprintln!("{msg}");
            return ExitCode::from(2);
        }
    };

    let config = match args.config.as_deref() {
        Some(path) => match load_config(path) {
            Ok(config) => config,
            Err(e) => {
                eprintln!("Failed to load configuration: {e}");
                return ExitCode::FAILURE;
            }
        },
        None => AppConfig::default(),
    };

    init_tracing(&config.logging.log_level);

    let runtime = match tokio::runtime::Builder::new_current_thread()
        .enable_io()
        .enable_time()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            eprintln!("Failed to initialize Tokio runtime: {e}");
            return ExitCode::FAILURE;
        }
    };

    runtime.block_on(run(config, args.capture))
}

async fn run(config: AppConfig, capture: String) -> ExitCode {
    let file = match tokio::fs::File::open(&capture).await {
        Ok(file) => file,
        Err(e) => {
            eprintln!("Failed to open {capture}: {e}");
            return ExitCode::FAILURE;
        }
    };
    let bytes = ReaderStream::with_capacity(file, config.stream.read_chunk_size);

    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            on_signal.cancel();
        }
    });

    let options = config.stream.to_options().with_cancel(cancel);
    let provider = config.stream.provider.clone();
    tracing::info!(
        "deltaflow replaying {} as {} (provider '{}')",
        capture,
        config.stream.dialect,
        provider
    );

    match config.stream.dialect {
        Dialect::Chat => {
            replay(normalize_stream(bytes, OpenAiChatDialect::new(provider), options)).await
        }
        Dialect::Completion => {
            replay(normalize_stream(
                bytes,
                OpenAiCompletionDialect::new(provider),
                options,
            ))
            .await
        }
    }
}

/// Print one JSON line per part.
async fn replay<S>(parts: S) -> ExitCode
where
    S: Stream<Item = Result<StreamPart, StreamError>>,
{
    let mut parts = std::pin::pin!(parts);
    let mut stdout = BufWriter::new(tokio::io::stdout());
    let mut status = ExitCode::SUCCESS;

    while let Some(item) = parts.next().await {
        match item {
            Ok(part) => {
                let line = match serde_json::to_string(&part) {
                    Ok(line) => line,
                    Err(e) => {
                        tracing::error!("failed to serialize {} part: {e}", part.type_name());
                        continue;
                    }
                };
                if let Err(e) = write_line(&mut stdout, &line).await {
                    eprintln!("Failed to write output: {e}");
                    return ExitCode::FAILURE;
                }
            }
            Err(StreamError::Aborted) => {
                eprintln!("Replay interrupted before finish");
                status = ExitCode::from(130);
            }
            Err(e) => {
                eprintln!("{e}");
                status = ExitCode::FAILURE;
            }
        }
    }

    if let Err(e) = stdout.flush().await {
        eprintln!("Failed to write output: {e}");
        return ExitCode::FAILURE;
    }
    status
}

async fn write_line<W>(out: &mut W, line: &str) -> std::io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    out.write_all(line.as_bytes()).await?;
    out.write_all(b"\n").await
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> impl Iterator<Item = String> {
        list.iter()
            .map(|s| (*s).to_string())
            .collect::<Vec<_>>()
            .into_iter()
    }

    #[test]
    fn test_parse_args_capture_only() {
        let parsed = parse_args(args(&["capture.sse"])).unwrap();
        assert_eq!(parsed.capture, "capture.sse");
        assert!(parsed.config.is_none());
    }

    #[test]
    fn test_parse_args_with_config() {
        let parsed = parse_args(args(&["--config", "c.yaml", "capture.sse"])).unwrap();
        assert_eq!(parsed.config.as_deref(), Some("c.yaml"));
        assert_eq!(parsed.capture, "capture.sse");
    }

    #[test]
    fn test_parse_args_errors() {
        assert!(parse_args(args(&[])).is_err());
        assert!(parse_args(args(&["--config"])).is_err());
        assert!(parse_args(args(&["--verbose", "x.sse"])).is_err());
        assert!(parse_args(args(&["a.sse", "b.sse"])).is_err());
    }
}
