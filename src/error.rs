use thiserror::Error;

/// Fatal pipeline conditions. Carried inside `anyhow::Error` and mapped to
/// process exit codes in `main`.
#[derive(Error, Debug)]
pub enum PipelineError {
    /// Missing or unusable inputs: required paths, directories, lookup files.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// A stage produced (or received) no usable rows.
    #[error("empty result: {0}")]
    EmptyResult(String),

    /// A value that must be numeric was not.
    #[error("parse error: {0}")]
    Parse(String),
}

impl PipelineError {
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Configuration(_) => 2,
            Self::EmptyResult(_) => 3,
            Self::Parse(_) => 1,
        }
    }
}

/// Resolves the process exit code for a failed command.
pub fn exit_code_for(err: &anyhow::Error) -> i32 {
    err.chain()
        .find_map(|cause| cause.downcast_ref::<PipelineError>())
        .map(PipelineError::exit_code)
        .unwrap_or(1)
}
