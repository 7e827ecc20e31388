pub mod error;

pub use error::{AnalyzeError, AnalyzeResult};
