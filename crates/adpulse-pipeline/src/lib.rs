//! Stage orchestration for adpulse runs.
//!
//! Wraps every stage in bounded retry with exponential back-off, checks each
//! inter-stage message against a declared [`schema::Shape`], and appends
//! envelopes and outputs to the run's output directory.

pub mod external;
pub mod orchestrator;
pub mod output;
pub mod retry;
pub mod schema;

pub use external::JsonFileGenerator;
pub use orchestrator::{
    NextStage, Pipeline, RunReport, RunRequest, GENERATE_AGENT, LOAD_AGENT, SUMMARY_AGENT,
    VALIDATE_AGENT,
};
pub use output::{OutputWriter, ENVELOPES_FILE, SUMMARY_FILE, VALIDATED_FILE};
pub use retry::{run_with_retry, RetryPolicy, StageOutcome, StageState};
pub use schema::{check, check_message, Field, Shape};
