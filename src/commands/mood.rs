use chrono::{Local, NaiveDate};
use clap::Args;
use serde::Serialize;

use super::OutputFormat;
use moodsync::context::AppContext;
use moodsync::models::MoodLogEntry;
use moodsync::pipeline::{PipelineError, ReconcileOutcome, SubmitOutcome};
use moodsync::remote::RemoteStore;

#[derive(Args)]
pub struct LogCommand {
    /// Mood from 1 (worst) to 10 (best)
    mood: u8,

    /// How strongly the mood is felt, 1 to 10
    #[arg(long, short)]
    intensity: Option<u8>,

    /// Free-form note
    #[arg(long, short)]
    note: Option<String>,

    /// Day the mood belongs to (YYYY-MM-DD, default: today)
    #[arg(long)]
    date: Option<NaiveDate>,

    /// Output format
    #[arg(long, short, value_enum, default_value = "text")]
    format: OutputFormat,
}

#[derive(Serialize)]
struct LogOutput<'a> {
    entry: &'a MoodLogEntry,
    queued: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    reason: Option<&'a str>,
}

impl LogCommand {
    pub async fn run<R: RemoteStore>(
        &self,
        ctx: &AppContext<R>,
    ) -> Result<(), Box<dyn std::error::Error>> {
        let date = self.date.unwrap_or_else(|| Local::now().date_naive());
        let mut entry = MoodLogEntry::new(ctx.user_id(), date, self.mood);
        if let Some(intensity) = self.intensity {
            entry = entry.with_intensity(intensity);
        }
        if let Some(note) = &self.note {
            entry = entry.with_note(note.trim());
        }

        let outcome = ctx.pipeline().submit(entry.clone()).await?;
        entry.sync_state = outcome.sync_state();

        match self.format {
            OutputFormat::Json => {
                let reason = match &outcome {
                    SubmitOutcome::Queued { reason } => Some(reason.as_str()),
                    SubmitOutcome::Synced => None,
                };
                let output = LogOutput {
                    entry: &entry,
                    queued: reason.is_some(),
                    reason,
                };
                println!("{}", serde_json::to_string_pretty(&output)?);
            }
            OutputFormat::Text => {
                println!("Logged mood:");
                println!("{}", entry);
                if let SubmitOutcome::Queued { reason } = &outcome {
                    println!();
                    println!("Saved offline ({}).", reason);
                    println!("It will sync on the next `mood flush` or while `mood watch` runs.");
                }
            }
        }
        Ok(())
    }
}

#[derive(Args)]
pub struct TodayCommand {
    /// Day to show (YYYY-MM-DD, default: today)
    #[arg(long)]
    date: Option<NaiveDate>,

    /// Refresh from the server before showing
    #[arg(long, short)]
    refresh: bool,

    /// Output format
    #[arg(long, short, value_enum, default_value = "text")]
    format: OutputFormat,
}

impl TodayCommand {
    pub async fn run<R: RemoteStore>(
        &self,
        ctx: &AppContext<R>,
    ) -> Result<(), Box<dyn std::error::Error>> {
        let date = self.date.unwrap_or_else(|| Local::now().date_naive());
        let pipeline = ctx.pipeline();

        if self.refresh {
            match pipeline.reconcile_today(ctx.user_id(), date).await {
                Ok(ReconcileOutcome::Updated(_)) => {}
                Ok(ReconcileOutcome::Stale) => {
                    tracing::debug!("refresh overtaken by a newer submission");
                }
                Err(PipelineError::Transient(e)) => {
                    eprintln!("Could not reach the server ({}); showing cached value.", e);
                }
                Err(e) => return Err(e.into()),
            }
        }

        let today = pipeline.today(ctx.user_id(), date).await?;

        match self.format {
            OutputFormat::Json => {
                println!("{}", serde_json::to_string_pretty(&today)?);
            }
            OutputFormat::Text => match today {
                Some(entry) => println!("{}", entry),
                None => println!("No mood logged for {}.", date),
            },
        }
        Ok(())
    }
}
