use std::process;

use anyhow::Context;
use clap::Parser;
use tracing::{error, info};

use clipcast::cli::{Args, Commands};
use clipcast::commands::App;
use clipcast::config::AppConfig;
use clipcast::logging::init_logging;

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    let args = Args::parse();

    let _guard = match init_logging(&args.logging_options()) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("Error: {e}");
            process::exit(1);
        }
    };

    match run(args).await {
        Ok(message) => {
            info!("{}", message);
            println!("{message}");
        }
        Err(e) => {
            error!("{:#}", e);
            eprintln!("Error: {e:#}");
            process::exit(1);
        }
    }
}

/// Execute the selected command and return the terminal message.
async fn run(args: Args) -> anyhow::Result<String> {
    let mut config =
        AppConfig::load(args.config.as_deref()).context("Failed to load configuration")?;
    if let Some(dir) = args.work_dir {
        config.work_dir = dir;
    }
    let app = App::from_config(config)?;

    match args.command {
        Commands::Validate(a) => {
            let job = app
                .validate(&a.document)
                .await
                .with_context(|| format!("Invalid document {}", a.document.display()))?;
            Ok(format!("Document for job '{}' is valid", job.id))
        }
        Commands::Compose(a) => {
            let report = app.compose(&a.document).await.context("Composition failed")?;
            Ok(format!(
                "Composed {} for job '{}'",
                report.output.display(),
                report.job_id
            ))
        }
        Commands::Broadcast(a) => {
            let report = app
                .broadcast(&a.document, a.source.as_deref())
                .await
                .context("Broadcast could not start")?;
            broadcast_message(&report)
        }
        Commands::Run(a) => {
            let (composition, report) = app.run(&a.document).await.context("Run failed")?;
            info!(output = %composition.output.display(), "Composition complete");
            broadcast_message(&report)
        }
    }
}

fn broadcast_message(report: &clipcast::broadcast::BroadcastReport) -> anyhow::Result<String> {
    if report.is_success() {
        Ok(format!("Broadcast of job '{}' finished", report.job_id))
    } else {
        anyhow::bail!(
            "Broadcast of job '{}' failed: {}",
            report.job_id,
            report.error.as_deref().unwrap_or("unknown error")
        )
    }
}
