use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CoreError {
    #[error("Entry content is empty")]
    EmptyContent,

    #[error("Entry content too long: {chars} characters (max {max})")]
    ContentTooLong { chars: usize, max: usize },

    #[error("Invalid timestamp: {0}")]
    InvalidTimestamp(u64),
}
