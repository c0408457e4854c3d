use thiserror::Error;

/// Structural failures raised by the record pipeline itself.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum PipelineError {
    #[error("semantic path for anchor `{anchor}` exceeds {limit} ancestors; parent links form a cycle")]
    SemanticPathCycle { anchor: String, limit: usize },
}
