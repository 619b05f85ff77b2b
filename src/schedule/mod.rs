pub mod types;
pub mod registry;
pub mod processors;
pub mod response;
pub mod transport;
pub mod lifecycle;
pub mod worker;
#[cfg(test)]
mod tests;

pub use types::{Task, TaskAction, TaskFailure, TaskResult};
pub use registry::{ProcessorRegistry, RegistryError};
pub use processors::TaskProcessor;
pub use response::{build_envelope, ResponseEnvelope};
pub use transport::{ApiResponse, HttpTransport, TransportError, WorkflowTransport};
pub use lifecycle::{ShutdownReason, WorkerLifecycle, WorkerState};
pub use worker::{WorkerStats, WorkflowWorker};
