use thiserror::Error;

#[derive(Debug, Error)]
pub enum DirectoryError {
    #[error("directory auth error: {0}")]
    Auth(String),

    #[error("directory request failed: {0}")]
    Request(String),

    #[error("directory response decode failed: {0}")]
    Decode(String),

    #[error("create app role assignment failed: {0}")]
    CreateAssignment(String),
}
