use async_trait::async_trait;
use rolegrant_domain::{AppRoleAssignment, Application, ServicePrincipal};

use crate::error::DirectoryError;

/// Black-box seam over the directory service.
///
/// The grant workflow only ever talks to this trait; the production
/// implementation is [`crate::GraphClient`].
#[async_trait]
pub trait DirectoryClient: Send + Sync {
    /// Search application registrations by display-name prefix.
    async fn find_applications_by_name(
        &self,
        query: &str,
    ) -> Result<Vec<Application>, DirectoryError>;

    /// Search service principals by display-name prefix. Returns all types;
    /// callers filter.
    async fn find_service_principals_by_name(
        &self,
        query: &str,
    ) -> Result<Vec<ServicePrincipal>, DirectoryError>;

    /// Create an app role assignment on `object_id`, granting `app_role_id`
    /// (defined by the resource principal `resource_id`) to `principal_id`.
    ///
    /// Known to report spurious failures — callers must not trust the
    /// returned error as evidence the assignment did not land.
    async fn create_app_role_assignment(
        &self,
        object_id: &str,
        principal_id: &str,
        resource_id: &str,
        app_role_id: &str,
    ) -> Result<(), DirectoryError>;

    /// List every app role assignment currently held by `object_id`.
    async fn list_app_role_assignments(
        &self,
        object_id: &str,
    ) -> Result<Vec<AppRoleAssignment>, DirectoryError>;
}
