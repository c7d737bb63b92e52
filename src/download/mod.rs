//! Download pipeline: admission, retry supervision, transfer, and sinks.
//!
//! A task enters through [`Scheduler::submit`], passes the environment
//! preflight, and is bounded by the [`AdmissionController`]. Admitted tasks
//! run under the [`RetrySupervisor`], which drives the [`TransferEngine`]
//! through attempt/retry cycles into a [`Sink`].

mod admission;
mod document;
mod engine;
mod error;
mod preflight;
mod scheduler;
mod sink;
mod supervisor;

pub use admission::AdmissionController;
pub use document::DocumentComposer;
pub use engine::{ProgressFn, TransferEngine, TransferOutcome};
pub use error::DownloadError;
pub use preflight::{check_preconditions, EnvironmentProbe, SystemProbe, MIN_FREE_SPACE_BYTES};
pub use scheduler::{Scheduler, SubmitError};
pub use sink::{FsSink, Sink, SinkHandle};
pub use supervisor::{RetrySupervisor, TaskOutcome};
