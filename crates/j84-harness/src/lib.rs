//! J1939-84 harness: library crate for the compliance test runner.
//!
//! Exposes the step framework, part controllers, data repository and
//! listeners so the binary and external crates (e.g. `j84-e2e-tests`) drive
//! the same code.

pub mod checks;
pub mod config;
pub mod control;
pub mod engine;
pub mod error;
pub mod listener;
pub mod part;
pub mod registry;
pub mod repository;
pub mod run;
pub mod step;
pub mod steps;

pub use config::HarnessConfig;
pub use control::{Ending, RunControl};
pub use error::{ConfigError, RunResult, StepError};
pub use listener::{Answer, MessageKind, RecordingListener, ReportListener, ResultsListener};
pub use part::{PartController, PartReport};
pub use registry::PartRegistry;
pub use repository::DataRepository;
pub use run::{ERROR_EXIT_CODE, RunSummary, TestRun};
pub use step::{Step, StepContext, StepInfo};
