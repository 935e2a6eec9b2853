use clap::ValueEnum;

mod config_cmd;
mod mood;
mod queue;

pub use config_cmd::ConfigCommand;
pub use mood::{LogCommand, TodayCommand};
pub use queue::{FlushCommand, QueueCommand, RetryCommand, WatchCommand};

#[derive(Clone, ValueEnum, Default)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}
