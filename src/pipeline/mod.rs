mod backoff;
mod connectivity;
mod error;
mod mood_pipeline;


pub use backoff::{BackoffPolicy, DEFAULT_BASE_DELAY, DEFAULT_MAX_ATTEMPTS, DEFAULT_MAX_DELAY};
pub use connectivity::{ConnectivityHandle, ConnectivityMonitor, FlushTrigger};
pub use error::PipelineError;
pub use mood_pipeline::{FlushReport, MoodPipeline, ReconcileOutcome, SubmitOutcome};
