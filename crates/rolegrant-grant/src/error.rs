use rolegrant_directory::DirectoryError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum GrantError {
    #[error("expected exactly one {what} matching '{query}', found {found}")]
    AmbiguousLookup {
        what:  &'static str,
        query: String,
        found: usize,
    },

    #[error("application '{application}' defines no app role named '{role}'")]
    RoleNotFound { role: String, application: String },

    #[error("app role {role_id} is not present on principal {msi} after assignment")]
    AssignmentNotConfirmed { role_id: String, msi: String },

    #[error(transparent)]
    Directory(#[from] DirectoryError),
}
