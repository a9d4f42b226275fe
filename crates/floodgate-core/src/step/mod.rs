//! Job definitions and the execution engine.

pub mod executor;
pub mod forward;
pub mod job;

pub use executor::{
    ExecutionOutcome, Executor, JobSubmitter, TargetCaller, TargetRequest, TargetResponse,
    TransportError,
};
pub use forward::{ForwardOutcome, ForwardSignal, auto_forward};
pub use job::{ExecutionStrategy, Fallback, Job, JobBuilder};
