//! Render worker binary.
//!
//! Takes one or more submission files, runs them through the bounded
//! executor and prints each finished job's manifest as JSON. Exits
//! nonzero when any job fails.

use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use reel_pipeline::{JobExecutor, JobSubmission, WorkerConfig};

#[tokio::main]
async fn main() {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Colored output for dev, JSON for production
    let use_json = std::env::var("LOG_FORMAT")
        .map(|v| v.to_lowercase() == "json")
        .unwrap_or(false);

    let env_filter = EnvFilter::from_default_env()
        .add_directive("reel=info".parse().unwrap());

    if use_json {
        tracing_subscriber::registry()
            .with(fmt::layer().json())
            .with(env_filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(
                fmt::layer()
                    .with_ansi(true)
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_file(false)
                    .with_line_number(false),
            )
            .with(env_filter)
            .init();
    }

    let args: Vec<String> = std::env::args().skip(1).collect();
    if args.is_empty() {
        eprintln!("usage: reel-pipeline <submission.json>...");
        std::process::exit(2);
    }

    info!("Starting reel-pipeline worker");
    let config = WorkerConfig::from_env();
    info!("Worker config: {:?}", config);

    let executor = JobExecutor::new(config);

    let mut ids = Vec::new();
    for path in &args {
        let submission = match JobSubmission::from_file(path) {
            Ok(s) => s,
            Err(e) => {
                error!("Failed to load submission {}: {}", path, e);
                std::process::exit(1);
            }
        };
        match executor.submit(submission) {
            Ok(id) => {
                info!(job_id = %id, "submitted {}", path);
                ids.push(id);
            }
            Err(e) => {
                error!("Failed to submit {}: {}", path, e);
                std::process::exit(1);
            }
        }
    }

    // Ctrl-C drains in-flight jobs before exiting
    let wait_all = async {
        let mut any_failed = false;
        for id in &ids {
            if let Some(job) = executor.wait(id).await {
                match &job.manifest {
                    Some(manifest) => {
                        let json = serde_json::to_string_pretty(manifest)
                            .unwrap_or_else(|e| format!("{{\"error\":\"{}\"}}", e));
                        println!("{}", json);
                    }
                    None => {
                        error!(job_id = %id, stage = %job.stage, "job did not complete");
                        any_failed = true;
                    }
                }
            }
        }
        any_failed
    };

    let failed = tokio::select! {
        any_failed = wait_all => any_failed,
        _ = tokio::signal::ctrl_c() => {
            info!("Received shutdown signal");
            executor.shutdown().await;
            true
        }
    };

    if failed {
        std::process::exit(1);
    }
    info!("Worker shutdown complete");
}
