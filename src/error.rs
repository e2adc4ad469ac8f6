use thiserror::Error;

/// Failures of the matching core itself. Bad input data is never one of
/// these: malformed history is skipped and short participant lists produce an
/// empty outcome.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum MatchError {
    #[error("matched participant {0} is missing from the participant table")]
    UnknownParticipant(String),
}

#[derive(Error, Debug)]
pub enum DbError {
    #[error("Database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Stored attributes are not valid JSON: {0}")]
    Attributes(#[from] serde_json::Error),

    #[error("Database connection lock was poisoned")]
    Poisoned,
}
