pub mod errors;
pub mod export;
pub mod history;
pub mod model;
pub mod ports;
pub mod recorder;
pub mod sinks;

pub use errors::{TlError, TlResult};
pub use export::script::{
    CodeGenerator, FallbackContract, ReplayPlan, ScriptFormat, StepAnnotation,
};
pub use history::{summarize, AttemptSummary, StepHistory};
pub use model::{ActionLog, SinkRecord, StepContext, TraceEntry};
pub use ports::PersistenceSink;
pub use recorder::TraceRecorder;
pub use sinks::{JsonlSink, MemorySink, NullSink};
