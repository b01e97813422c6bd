//! Type definitions shared by the prediction pipeline

pub mod input;
pub mod result;
pub mod value;

pub use input::{FieldValue, NormalizedInput, RawInput};
pub use result::PredictionResult;
pub use value::Value;
