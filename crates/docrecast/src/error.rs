#[derive(thiserror::Error, Debug, serde::Deserialize, serde::Serialize)]
pub enum Error {
    #[error("Source directory not found: {0}")]
    SourceDirNotFound(String),

    #[error("Invalid file pattern '{pattern}': {reason}")]
    InvalidPattern { pattern: String, reason: String },

    #[error("Invalid color '{0}', expected r,g,b")]
    InvalidColor(String),
}
