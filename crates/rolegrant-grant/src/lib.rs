pub mod error;
pub mod grant;

pub use error::GrantError;
pub use grant::{
    assign_and_confirm, grant_app_role, resolve_app_role, resolve_msi_principal,
    resolve_resource_principal, GrantReport,
};
