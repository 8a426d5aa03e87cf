pub mod io;
pub mod job;
pub mod launch;
pub mod pipeline;
pub mod redirect;
pub mod signal;
pub mod state;
pub mod wait;

pub use job::Job;
pub use launch::{LaunchOptions, Launched, launch};
pub use pipeline::{InputSource, OutputSink, Pipeline, PipelineStage, StageWiring, plan_io};
pub use state::{ExitInfo, JobStatus, WaitEvent};
pub use wait::ForegroundOutcome;
