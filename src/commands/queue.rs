use chrono::Utc;
use clap::Args;
use serde::Serialize;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use uuid::Uuid;

use super::OutputFormat;
use moodsync::context::AppContext;
use moodsync::models::OfflineQueueEntry;
use moodsync::pipeline::{ConnectivityMonitor, FlushReport, SubmitOutcome};
use moodsync::remote::{HttpRemoteStore, RemoteStore};

#[derive(Args)]
pub struct QueueCommand {
    /// Output format
    #[arg(long, short, value_enum, default_value = "text")]
    format: OutputFormat,
}

#[derive(Serialize)]
struct QueueOutput {
    pending: Vec<OfflineQueueEntry>,
    failed: Vec<OfflineQueueEntry>,
}

impl QueueCommand {
    pub async fn run<R: RemoteStore>(
        &self,
        ctx: &AppContext<R>,
    ) -> Result<(), Box<dyn std::error::Error>> {
        let output = QueueOutput {
            pending: ctx.pipeline().pending().await?,
            failed: ctx.pipeline().failed().await?,
        };

        match self.format {
            OutputFormat::Json => {
                println!("{}", serde_json::to_string_pretty(&output)?);
            }
            OutputFormat::Text => {
                if output.pending.is_empty() && output.failed.is_empty() {
                    println!("Queue is empty.");
                    return Ok(());
                }

                if !output.pending.is_empty() {
                    println!("Pending ({}):", output.pending.len());
                    for item in &output.pending {
                        print_item(item);
                    }
                }
                if !output.failed.is_empty() {
                    if !output.pending.is_empty() {
                        println!();
                    }
                    println!("Failed ({}), retry with `mood retry <id>`:", output.failed.len());
                    for item in &output.failed {
                        print_item(item);
                    }
                }
            }
        }
        Ok(())
    }
}

fn print_item(item: &OfflineQueueEntry) {
    let mood = item
        .entry
        .mood_value
        .map(|v| v.to_string())
        .unwrap_or_else(|| "-".to_string());
    println!(
        "  {}  {}  mood {}  attempts {}",
        item.entry.id, item.entry.date, mood, item.attempt_count
    );

    if let Some(next) = item.next_attempt_at {
        let wait = (next - Utc::now()).num_seconds();
        if wait > 0 {
            println!("    next attempt in {}s", wait);
        }
    }
    if let Some(error) = &item.last_error {
        println!("    last error: {}", error);
    }
}

#[derive(Args)]
pub struct FlushCommand {
    /// Keep retrying, waiting out backoff delays, until the queue is empty
    /// or every entry has failed
    #[arg(long, short)]
    wait: bool,
}

impl FlushCommand {
    pub async fn run<R: RemoteStore>(
        &self,
        ctx: &AppContext<R>,
    ) -> Result<(), Box<dyn std::error::Error>> {
        let report = if self.wait {
            ctx.pipeline().drain().await?
        } else {
            ctx.pipeline().flush_queue().await?
        };
        print_report(&report);
        Ok(())
    }
}

fn print_report(report: &FlushReport) {
    if report.skipped {
        println!("A flush is already running.");
        return;
    }

    println!("Synced: {}", report.synced.len());
    for failure in &report.failures {
        println!("Failed: {}", failure);
    }
    println!("Still queued: {}", report.remaining);
    if let Some(wait) = report.retry_in.filter(|_| report.remaining > 0) {
        println!("Next retry possible in {:.1}s", wait.as_secs_f64());
    }
}

#[derive(Args)]
pub struct RetryCommand {
    /// Id of the failed entry (see `mood queue`)
    id: Uuid,
}

impl RetryCommand {
    pub async fn run<R: RemoteStore>(
        &self,
        ctx: &AppContext<R>,
    ) -> Result<(), Box<dyn std::error::Error>> {
        match ctx.pipeline().retry_failed(self.id).await? {
            SubmitOutcome::Synced => println!("Entry {} synced.", self.id),
            SubmitOutcome::Queued { reason } => {
                println!("Entry {} queued again ({}).", self.id, reason)
            }
        }
        Ok(())
    }
}

#[derive(Args)]
pub struct WatchCommand {
    /// Seconds between server reachability checks
    #[arg(long, default_value = "30")]
    interval: u64,
}

impl WatchCommand {
    /// Check the server and flush whenever it is reachable, until Ctrl-C.
    pub async fn run(&self, ctx: &AppContext<HttpRemoteStore>) -> Result<(), Box<dyn std::error::Error>> {
        let pipeline = ctx.pipeline();
        let (handle, monitor) = ConnectivityMonitor::new(false);

        println!(
            "Watching {} every {}s, Ctrl-C to stop.",
            pipeline.remote().server_url(),
            self.interval
        );

        let checker = async {
            let mut ticker = tokio::time::interval(Duration::from_secs(self.interval.max(1)));
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let online = pipeline.remote().check().await;
                        handle.set_online(online);
                        if online {
                            handle.flush_now();
                        }
                    }
                    _ = tokio::signal::ctrl_c() => {
                        handle.shutdown();
                        break;
                    }
                }
            }
        };

        tokio::join!(monitor.run(pipeline), checker);
        Ok(())
    }
}
