//! Pipeline execution engine

pub mod poller;
pub mod runner;
pub mod task;
pub mod trigger;

pub use poller::{PolicyError, PollPolicy, PollingInvoker};
pub use runner::{EventHandler, ExecutionEvent, PipelineRunner, RunReport};
pub use task::{JobTask, StageResult};
pub use trigger::{EventTrigger, StorageEvent, StorageEventKind, TriggerRule};
