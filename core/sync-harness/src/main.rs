//! bookmark-sync: drives the sync engine against the loopback backend.
//!
//! Reads one command per line from stdin and writes one JSON reply per line
//! to stdout. Type `help` for the command list.

use std::path::PathBuf;
use std::process::ExitCode;

use bookmark_sync::{load_config, LoopbackBackend, SyncConfig, SyncContext, SyncEngine};
use clap::{Parser, Subcommand};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

mod commands;
mod fixture;
mod logging;

use commands::{parse_command, Command, Reply};
use fixture::Fixture;

#[derive(Parser)]
#[command(name = "bookmark-sync")]
#[command(about = "Bookmark sync engine harness")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the engine and read commands from stdin
    Run {
        /// Config file (defaults to ~/.bookmark-sync/config.toml)
        #[arg(long)]
        config: Option<PathBuf>,

        /// JSON fixture with the starting remote rows and session
        #[arg(long)]
        fixture: Option<PathBuf>,
    },

    /// Print the effective configuration
    Config {
        #[arg(long)]
        config: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let _logging_guard = logging::init();
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Run { config, fixture } => run(config, fixture).await,
        Commands::Config { config } => print_config(config),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(message) => {
            tracing::error!(error = %message, "bookmark-sync exited with error");
            eprintln!("bookmark-sync: {}", message);
            ExitCode::FAILURE
        }
    }
}

fn resolve_config(path: Option<PathBuf>) -> Result<SyncConfig, String> {
    load_config(path.as_deref()).map_err(String::from)
}

fn print_config(path: Option<PathBuf>) -> Result<(), String> {
    let config = resolve_config(path)?;
    let rendered = toml::to_string_pretty(&config).map_err(|err| err.to_string())?;
    print!("{}", rendered);
    Ok(())
}

async fn run(config_path: Option<PathBuf>, fixture_path: Option<PathBuf>) -> Result<(), String> {
    let config = resolve_config(config_path)?;
    let fixture = match fixture_path {
        Some(path) => Fixture::load(&path).map_err(|err| err.to_string())?,
        None => Fixture::default(),
    };

    let backend = LoopbackBackend::new();
    fixture.apply(&backend, &config.sync.collection);

    let engine = SyncEngine::new(SyncContext::new(backend.backends(), config));
    let session = engine.start().await;
    tracing::info!(session = session.as_str(), "Engine started");

    let context = commands::Session {
        engine: &engine,
        backend: &backend,
        user: &fixture.user,
    };

    let mut stdout = tokio::io::stdout();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        let line = tokio::select! {
            line = lines.next_line() => line,
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Interrupted");
                break;
            }
        };

        let line = match line {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(err) => {
                tracing::warn!(error = %err, "Failed to read stdin");
                break;
            }
        };
        if line.trim().is_empty() {
            continue;
        }

        let (reply, quit) = match parse_command(&line) {
            Ok(Command::Quit) => (context.execute(Command::Quit).await, true),
            Ok(command) => (context.execute(command).await, false),
            Err(error) => (Reply::error(error), false),
        };

        if let Err(err) = write_reply(&mut stdout, &reply).await {
            tracing::warn!(error = %err, "Failed to write reply");
            break;
        }

        if quit {
            break;
        }
    }

    engine.shutdown().await;
    Ok(())
}

async fn write_reply<W>(out: &mut W, reply: &Reply) -> std::io::Result<()>
where
    W: tokio::io::AsyncWrite + Unpin,
{
    let mut line = reply.to_line();
    line.push('\n');
    out.write_all(line.as_bytes()).await?;
    out.flush().await
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::pin::Pin;
    use std::task::{Context, Poll};

    /// Accepts writes but fails every flush.
    struct FailingFlush;

    impl tokio::io::AsyncWrite for FailingFlush {
        fn poll_write(
            self: Pin<&mut Self>,
            _cx: &mut Context<'_>,
            buf: &[u8],
        ) -> Poll<std::io::Result<usize>> {
            Poll::Ready(Ok(buf.len()))
        }

        fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
            Poll::Ready(Err(std::io::Error::new(
                std::io::ErrorKind::BrokenPipe,
                "closed",
            )))
        }

        fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
            Poll::Ready(Ok(()))
        }
    }

    #[tokio::test]
    async fn reply_is_one_json_line() {
        let mut out = Vec::new();
        write_reply(&mut out, &Reply::ok(serde_json::json!({"n": 1})))
            .await
            .expect("write");
        let text = String::from_utf8(out).expect("utf8");
        assert!(text.ends_with('\n'));
        assert_eq!(text.lines().count(), 1);
    }

    #[tokio::test]
    async fn flush_failure_is_reported() {
        let err = write_reply(&mut FailingFlush, &Reply::ok(serde_json::json!(null)))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), std::io::ErrorKind::BrokenPipe);
    }
}
