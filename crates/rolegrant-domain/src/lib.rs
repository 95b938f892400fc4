pub mod error;
pub mod types;


pub use error::DomainError;
pub use types::{
    AppRole, AppRoleAssignment, Application, GrantRequest, PrincipalType, ServicePrincipal,
};
