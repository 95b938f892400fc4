use thiserror::Error;

#[derive(Debug, Error)]
pub enum DomainError {
    #[error("{0} must not be empty")]
    EmptyField(&'static str),
}
