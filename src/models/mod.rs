//! Model artifacts and their execution

pub mod assembler;
pub mod executor;
pub mod loader;
#[cfg(feature = "onnx")]
pub mod onnx;
pub mod runtime;
pub mod signature;

pub use assembler::{ColumnSelection, ResultAssembler};
pub use executor::BatchExecutor;
pub use loader::{ArtifactLoader, LoadedArtifact};
pub use runtime::{ExecutionContext, OutputTensors, WideModel};
pub use signature::{InputMap, Signature};
