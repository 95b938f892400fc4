use serde::{Deserialize, Serialize};

use crate::error::DomainError;

// ── Directory entities ────────────────────────────────────────────────────────

/// An application registration as read from the directory. Owns the app role
/// definitions; never created or mutated by this tool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Application {
    /// Directory object id of the registration.
    #[serde(rename = "id")]
    pub object_id: String,
    pub display_name: String,
    #[serde(default)]
    pub app_roles: Vec<AppRole>,
}

/// A named permission scope defined on an application registration.
///
/// `value` is the machine-readable role name clients request; matching on it
/// is exact and case-sensitive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppRole {
    pub id: String,
    #[serde(default)]
    pub value: String,
    #[serde(default)]
    pub display_name: String,
}

/// A directory-registered identity, distinct from the application
/// registration itself.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServicePrincipal {
    #[serde(rename = "id")]
    pub object_id: String,
    pub display_name: String,
    #[serde(rename = "servicePrincipalType", default)]
    pub principal_type: PrincipalType,
}

/// Directory type tag on a service principal. Tags this tool does not care
/// about (e.g. "Legacy", "SocialIdp") land in `Other`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum PrincipalType {
    Application,
    ManagedIdentity,
    Other(String),
}

impl Default for PrincipalType {
    fn default() -> Self {
        PrincipalType::Other(String::new())
    }
}

impl From<String> for PrincipalType {
    fn from(s: String) -> Self {
        match s.as_str() {
            "Application" => PrincipalType::Application,
            "ManagedIdentity" => PrincipalType::ManagedIdentity,
            _ => PrincipalType::Other(s),
        }
    }
}

impl From<PrincipalType> for String {
    fn from(t: PrincipalType) -> Self {
        t.to_string()
    }
}

impl std::fmt::Display for PrincipalType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PrincipalType::Application => write!(f, "Application"),
            PrincipalType::ManagedIdentity => write!(f, "ManagedIdentity"),
            PrincipalType::Other(s) => write!(f, "{}", s),
        }
    }
}

/// A record linking a principal, a resource, and a role identifier.
///
/// Membership of a role id in a principal's assignment list is the only
/// trusted evidence that a grant landed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppRoleAssignment {
    #[serde(default)]
    pub id: String,
    pub app_role_id: String,
    #[serde(default)]
    pub principal_id: String,
    #[serde(default)]
    pub resource_id: String,
}

// ── Grant request ─────────────────────────────────────────────────────────────

/// The three inputs of a grant run. All fields are search strings or exact
/// names and must be non-empty.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GrantRequest {
    pub resource_application: String,
    pub role_name: String,
    pub msi_name: String,
}

impl GrantRequest {
    pub fn new(
        resource_application: impl Into<String>,
        role_name: impl Into<String>,
        msi_name: impl Into<String>,
    ) -> Result<Self, DomainError> {
        let req = GrantRequest {
            resource_application: resource_application.into(),
            role_name: role_name.into(),
            msi_name: msi_name.into(),
        };
        if req.resource_application.trim().is_empty() {
            return Err(DomainError::EmptyField("resource application name"));
        }
        if req.role_name.trim().is_empty() {
            return Err(DomainError::EmptyField("role name"));
        }
        if req.msi_name.trim().is_empty() {
            return Err(DomainError::EmptyField("MSI service principal name"));
        }
        Ok(req)
    }
}
