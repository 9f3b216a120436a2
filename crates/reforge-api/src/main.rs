//! Reforge CLI and REST API entry point.
//!
//! Binary name: `reforge`
//!
//! Parses CLI arguments, initializes the checkpoint database and services,
//! then dispatches to the appropriate command handler or starts the REST API
//! server.

mod cli;
mod http;
mod state;

use clap::Parser;
use clap_complete::generate;

use cli::{Cli, Commands};
use reforge_observe::tracing_setup::{filter_for_verbosity, init_tracing, shutdown_tracing};
use state::{AppState, StoreMode};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Shell completions don't need tracing or app state
    if let Commands::Completions { shell } = &cli.command {
        let mut cmd = <Cli as clap::CommandFactory>::command();
        generate(*shell, &mut cmd, "reforge", &mut std::io::stdout());
        return Ok(());
    }

    init_tracing(filter_for_verbosity(cli.verbose, cli.quiet), cli.otel)
        .map_err(|e| anyhow::anyhow!("failed to initialize tracing: {e}"))?;

    let result = run(cli).await;
    shutdown_tracing();
    result
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let mode = if cli.ephemeral {
        StoreMode::Ephemeral
    } else {
        StoreMode::Durable
    };
    let state = AppState::init(mode).await?;
    let json = cli.json;

    match cli.command {
        Commands::Create {
            goal,
            files,
            max_iterations,
            no_drive,
        } => {
            cli::workflow::create_workflow(&state, goal, files, max_iterations, no_drive, json)
                .await?;
        }

        Commands::Status { id, diff } => {
            cli::workflow::show_status(&state, &id, diff, json).await?;
        }

        Commands::List { status } => {
            cli::workflow::list_workflows(&state, status, json).await?;
        }

        Commands::Resume {
            id,
            action,
            feedback,
        } => {
            cli::workflow::resume_workflow(&state, &id, action.into(), feedback, json).await?;
        }

        Commands::Feedback { id, text } => {
            cli::workflow::submit_feedback(&state, &id, text, json).await?;
        }

        Commands::Cancel { id } => {
            cli::workflow::cancel_workflow(&state, &id, json).await?;
        }

        Commands::History { id } => {
            cli::workflow::show_history(&state, &id, json).await?;
        }

        Commands::Drive { id } => {
            cli::workflow::drive_workflow(&state, &id, json).await?;
        }

        Commands::Recover => {
            cli::workflow::recover(&state, json).await?;
        }

        Commands::Serve {
            port,
            host,
            no_recover,
        } => {
            if !no_recover {
                let coordinator = state.coordinator.clone();
                tokio::spawn(async move {
                    match coordinator.recover().await {
                        Ok(report) => tracing::info!(
                            resumed = report.resumed.len(),
                            skipped = report.skipped.len(),
                            failed = report.failed.len(),
                            "startup recovery finished"
                        ),
                        Err(e) => tracing::error!(error = %e, "startup recovery failed"),
                    }
                });
            }

            let addr = format!("{host}:{port}");
            let listener = tokio::net::TcpListener::bind(&addr).await?;

            println!(
                "  {} Reforge API listening on {}",
                console::style("*").bold(),
                console::style(format!("http://{addr}")).cyan()
            );
            println!("  {}", console::style("Press Ctrl+C to stop").dim());

            let router = http::router::build_router(state.clone());

            axum::serve(listener, router)
                .with_graceful_shutdown(shutdown_signal())
                .await?;

            state.close().await;
            println!("\n  Server stopped.");
        }

        Commands::Completions { .. } => unreachable!("handled above"),
    }

    Ok(())
}

/// Wait for Ctrl+C or SIGTERM for graceful shutdown.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
