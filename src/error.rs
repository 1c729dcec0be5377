use thiserror::Error;

/// Failure modes of a call to the hosted model.
#[derive(Debug, Error)]
pub enum CallError {
    #[error("translation service timed out after {attempts} attempt(s)")]
    Timeout { attempts: usize },
    #[error("translation service unavailable after {attempts} attempt(s): {message}")]
    Unavailable { attempts: usize, message: String },
    #[error("translation request rejected ({status}): {message}")]
    Rejected { status: u16, message: String },
    #[error("failed to parse translation response: {0}")]
    Parse(String),
}

impl CallError {
    pub fn parse(message: impl Into<String>) -> Self {
        CallError::Parse(message.into())
    }
}
