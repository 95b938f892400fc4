use rolegrant_directory::DirectoryClient;
use rolegrant_domain::{AppRole, GrantRequest, PrincipalType, ServicePrincipal};
use tracing::{info, warn};

use crate::error::GrantError;

/// Outcome of a confirmed grant run.
#[derive(Debug, Clone)]
pub struct GrantReport {
    pub role_id: String,
    pub resource_principal_id: String,
    pub msi_principal_id: String,
    /// Error message reported by the creation call, if any. Discarded by
    /// policy — the verification read already confirmed the assignment.
    pub create_error: Option<String>,
}

// ── Lookup disambiguation ─────────────────────────────────────────────────────

/// Demand exactly one candidate from a name search. Zero or many is fatal
/// before any mutation is attempted.
fn expect_single<T>(mut items: Vec<T>, what: &'static str, query: &str) -> Result<T, GrantError> {
    if items.len() == 1 {
        Ok(items.remove(0))
    } else {
        Err(GrantError::AmbiguousLookup {
            what,
            query: query.to_string(),
            found: items.len(),
        })
    }
}

// ── Resolvers ─────────────────────────────────────────────────────────────────

/// Resolve the requested role on the target application registration.
/// Role-name matching is exact and case-sensitive.
pub async fn resolve_app_role(
    dir: &dyn DirectoryClient,
    app_query: &str,
    role_name: &str,
) -> Result<AppRole, GrantError> {
    let apps = dir.find_applications_by_name(app_query).await?;
    let app  = expect_single(apps, "application registration", app_query)?;

    app.app_roles
        .iter()
        .find(|role| role.value == role_name)
        .cloned()
        .ok_or_else(|| GrantError::RoleNotFound {
            role:        role_name.to_string(),
            application: app.display_name.clone(),
        })
}

/// Resolve the service principal backing the resource application.
pub async fn resolve_resource_principal(
    dir: &dyn DirectoryClient,
    app_query: &str,
) -> Result<ServicePrincipal, GrantError> {
    let principals: Vec<ServicePrincipal> = dir
        .find_service_principals_by_name(app_query)
        .await?
        .into_iter()
        .filter(|sp| sp.principal_type == PrincipalType::Application)
        .collect();
    expect_single(principals, "resource service principal", app_query)
}

/// Resolve the managed identity service principal that will receive the role.
pub async fn resolve_msi_principal(
    dir: &dyn DirectoryClient,
    msi_query: &str,
) -> Result<ServicePrincipal, GrantError> {
    let principals: Vec<ServicePrincipal> = dir
        .find_service_principals_by_name(msi_query)
        .await?
        .into_iter()
        .filter(|sp| sp.principal_type == PrincipalType::ManagedIdentity)
        .collect();
    expect_single(principals, "managed identity service principal", msi_query)
}

// ── Assignment executor ───────────────────────────────────────────────────────

/// Fire-and-confirm: attempt the assignment, discard whatever the creation
/// call reports, then decide solely from an independent re-read of the MSI's
/// assignments. The assignment API frequently reports failure even when the
/// mutation lands.
///
/// Errors on the verification read itself do propagate; without a completed
/// read there is no verdict. Returns the discarded creation error, if any.
pub async fn assign_and_confirm(
    dir: &dyn DirectoryClient,
    msi_id: &str,
    resource_id: &str,
    role_id: &str,
) -> Result<Option<String>, GrantError> {
    // The MSI assigns the role to itself: object context and receiving
    // principal are the same id.
    let create_error = match dir
        .create_app_role_assignment(msi_id, msi_id, resource_id, role_id)
        .await
    {
        Ok(()) => None,
        Err(e) => {
            warn!(error = %e, "assignment creation reported failure, verifying anyway");
            Some(e.to_string())
        }
    };

    let assignments = dir.list_app_role_assignments(msi_id).await?;
    if assignments.iter().any(|a| a.app_role_id == role_id) {
        Ok(create_error)
    } else {
        Err(GrantError::AssignmentNotConfirmed {
            role_id: role_id.to_string(),
            msi:     msi_id.to_string(),
        })
    }
}

// ── Orchestration ─────────────────────────────────────────────────────────────

/// Run the full grant workflow: resolve the role, the resource principal and
/// the MSI principal, then execute the verified assignment. Strictly
/// sequential; each step's output feeds the next.
pub async fn grant_app_role(
    dir: &dyn DirectoryClient,
    req: &GrantRequest,
) -> Result<GrantReport, GrantError> {
    let role = resolve_app_role(dir, &req.resource_application, &req.role_name).await?;
    info!(role = %req.role_name, role_id = %role.id, "resolved app role");

    let resource = resolve_resource_principal(dir, &req.resource_application).await?;
    info!(
        resource = %resource.display_name,
        resource_id = %resource.object_id,
        "resolved resource service principal"
    );

    let msi = resolve_msi_principal(dir, &req.msi_name).await?;
    info!(
        msi = %msi.display_name,
        msi_id = %msi.object_id,
        "resolved managed identity service principal"
    );

    let create_error =
        assign_and_confirm(dir, &msi.object_id, &resource.object_id, &role.id).await?;
    info!(role_id = %role.id, msi_id = %msi.object_id, "app role assignment confirmed");

    Ok(GrantReport {
        role_id: role.id,
        resource_principal_id: resource.object_id,
        msi_principal_id: msi.object_id,
        create_error,
    })
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use async_trait::async_trait;
    use rolegrant_directory::{DirectoryClient, DirectoryError};
    use rolegrant_domain::{AppRoleAssignment, Application, ServicePrincipal};

    use super::*;

    /// In-memory directory stub. Search filters on display-name prefix;
    /// create/list behavior is driven by the `fail_*` and `create_lands`
    /// knobs. Records every call so tests can assert the workflow stopped
    /// where it should.
    #[derive(Default)]
    struct FakeDirectory {
        applications: Vec<Application>,
        principals:   Vec<ServicePrincipal>,
        assignments:  Mutex<Vec<AppRoleAssignment>>,
        fail_create:  bool,
        create_lands: bool,
        fail_list:    bool,
        calls:        Mutex<Vec<&'static str>>,
        create_args:  Mutex<Option<(String, String, String, String)>>,
    }

    impl FakeDirectory {
        fn record(&self, call: &'static str) {
            self.calls.lock().unwrap().push(call);
        }

        fn calls(&self) -> Vec<&'static str> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl DirectoryClient for FakeDirectory {
        async fn find_applications_by_name(
            &self,
            query: &str,
        ) -> Result<Vec<Application>, DirectoryError> {
            self.record("find_applications");
            Ok(self
                .applications
                .iter()
                .filter(|a| a.display_name.starts_with(query))
                .cloned()
                .collect())
        }

        async fn find_service_principals_by_name(
            &self,
            query: &str,
        ) -> Result<Vec<ServicePrincipal>, DirectoryError> {
            self.record("find_service_principals");
            Ok(self
                .principals
                .iter()
                .filter(|sp| sp.display_name.starts_with(query))
                .cloned()
                .collect())
        }

        async fn create_app_role_assignment(
            &self,
            object_id: &str,
            principal_id: &str,
            resource_id: &str,
            app_role_id: &str,
        ) -> Result<(), DirectoryError> {
            self.record("create_assignment");
            *self.create_args.lock().unwrap() = Some((
                object_id.to_string(),
                principal_id.to_string(),
                resource_id.to_string(),
                app_role_id.to_string(),
            ));
            if self.create_lands {
                self.assignments.lock().unwrap().push(AppRoleAssignment {
                    id:           "assign-1".into(),
                    app_role_id:  app_role_id.to_string(),
                    principal_id: principal_id.to_string(),
                    resource_id:  resource_id.to_string(),
                });
            }
            if self.fail_create {
                return Err(DirectoryError::CreateAssignment(
                    "Request_BadRequest: spurious failure".into(),
                ));
            }
            Ok(())
        }

        async fn list_app_role_assignments(
            &self,
            _object_id: &str,
        ) -> Result<Vec<AppRoleAssignment>, DirectoryError> {
            self.record("list_assignments");
            if self.fail_list {
                return Err(DirectoryError::Request("GET: connection reset".into()));
            }
            Ok(self.assignments.lock().unwrap().clone())
        }
    }

    fn app(object_id: &str, name: &str, roles: &[(&str, &str)]) -> Application {
        Application {
            object_id:    object_id.into(),
            display_name: name.into(),
            app_roles:    roles
                .iter()
                .map(|(id, value)| AppRole {
                    id:           (*id).into(),
                    value:        (*value).into(),
                    display_name: (*value).into(),
                })
                .collect(),
        }
    }

    fn sp(object_id: &str, name: &str, principal_type: PrincipalType) -> ServicePrincipal {
        ServicePrincipal {
            object_id:    object_id.into(),
            display_name: name.into(),
            principal_type,
        }
    }

    /// The happy-path directory of end-to-end scenarios A and B: one
    /// application "Api1" with role Admin/role-123, one Application principal
    /// "res-1", one ManagedIdentity principal "msi-1".
    fn happy_directory() -> FakeDirectory {
        FakeDirectory {
            applications: vec![app("app-1", "Api1", &[("role-123", "Admin")])],
            principals: vec![
                sp("res-1", "Api1", PrincipalType::Application),
                sp("msi-1", "Msi1", PrincipalType::ManagedIdentity),
            ],
            ..Default::default()
        }
    }

    fn request() -> GrantRequest {
        GrantRequest::new("Api1", "Admin", "Msi1").unwrap()
    }

    // ── expect_single (pure) ──────────────────────────────────────────────────

    #[test]
    fn expect_single_one_item() {
        let item = expect_single(vec![7], "thing", "q").unwrap();
        assert_eq!(item, 7);
    }

    #[test]
    fn expect_single_zero_items() {
        let err = expect_single(Vec::<i32>::new(), "thing", "q").unwrap_err();
        assert!(matches!(
            err,
            GrantError::AmbiguousLookup { what: "thing", found: 0, .. }
        ));
    }

    #[test]
    fn expect_single_many_items() {
        let err = expect_single(vec![1, 2], "thing", "q").unwrap_err();
        assert!(matches!(err, GrantError::AmbiguousLookup { found: 2, .. }));
    }

    // ── resolvers ─────────────────────────────────────────────────────────────

    #[tokio::test]
    async fn role_resolver_finds_exact_match() {
        let dir = happy_directory();
        let role = resolve_app_role(&dir, "Api1", "Admin").await.unwrap();
        assert_eq!(role.id, "role-123");
    }

    #[tokio::test]
    async fn role_resolver_ambiguous_when_no_application_matches() {
        let dir = happy_directory();
        let err = resolve_app_role(&dir, "Unknown", "Admin").await.unwrap_err();
        assert!(matches!(
            err,
            GrantError::AmbiguousLookup {
                what: "application registration",
                found: 0,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn role_resolver_rejects_unknown_role() {
        let dir = happy_directory();
        let err = resolve_app_role(&dir, "Api1", "Owner").await.unwrap_err();
        assert!(matches!(err, GrantError::RoleNotFound { .. }));
    }

    #[tokio::test]
    async fn role_name_match_is_case_sensitive() {
        let dir = happy_directory();
        let err = resolve_app_role(&dir, "Api1", "admin").await.unwrap_err();
        assert!(matches!(err, GrantError::RoleNotFound { .. }));
    }

    #[tokio::test]
    async fn resource_resolver_filters_to_application_type() {
        // A ManagedIdentity principal with the same name must not count.
        let dir = FakeDirectory {
            applications: vec![app("app-1", "Api1", &[("role-123", "Admin")])],
            principals: vec![
                sp("res-1", "Api1", PrincipalType::Application),
                sp("mi-9", "Api1-agent", PrincipalType::ManagedIdentity),
            ],
            ..Default::default()
        };
        let sp = resolve_resource_principal(&dir, "Api1").await.unwrap();
        assert_eq!(sp.object_id, "res-1");
    }

    #[tokio::test]
    async fn resource_resolver_ambiguous_when_two_match() {
        let dir = FakeDirectory {
            principals: vec![
                sp("res-1", "Api1", PrincipalType::Application),
                sp("res-2", "Api1-staging", PrincipalType::Application),
            ],
            ..Default::default()
        };
        let err = resolve_resource_principal(&dir, "Api1").await.unwrap_err();
        assert!(matches!(err, GrantError::AmbiguousLookup { found: 2, .. }));
    }

    #[tokio::test]
    async fn msi_resolver_ambiguous_when_none_match() {
        // Only an Application-type principal matches the MSI query.
        let dir = FakeDirectory {
            principals: vec![sp("res-1", "Msi1", PrincipalType::Application)],
            ..Default::default()
        };
        let err = resolve_msi_principal(&dir, "Msi1").await.unwrap_err();
        assert!(matches!(
            err,
            GrantError::AmbiguousLookup {
                what: "managed identity service principal",
                found: 0,
                ..
            }
        ));
    }

    // ── executor ──────────────────────────────────────────────────────────────

    #[tokio::test]
    async fn creation_error_does_not_abort_before_verification() {
        let dir = FakeDirectory {
            fail_create: true,
            create_lands: true,
            ..happy_directory()
        };
        let create_error = assign_and_confirm(&dir, "msi-1", "res-1", "role-123")
            .await
            .unwrap();
        assert!(create_error.unwrap().contains("spurious failure"));
        assert_eq!(dir.calls(), vec!["create_assignment", "list_assignments"]);
    }

    #[tokio::test]
    async fn verification_read_failure_is_fatal() {
        let dir = FakeDirectory {
            create_lands: true,
            fail_list: true,
            ..happy_directory()
        };
        let err = assign_and_confirm(&dir, "msi-1", "res-1", "role-123")
            .await
            .unwrap_err();
        assert!(matches!(err, GrantError::Directory(_)));
    }

    #[tokio::test]
    async fn msi_assigns_role_to_itself() {
        let dir = FakeDirectory {
            create_lands: true,
            ..happy_directory()
        };
        assign_and_confirm(&dir, "msi-1", "res-1", "role-123")
            .await
            .unwrap();
        let (object_id, principal_id, resource_id, role_id) =
            dir.create_args.lock().unwrap().clone().unwrap();
        assert_eq!(object_id, "msi-1");
        assert_eq!(principal_id, "msi-1");
        assert_eq!(resource_id, "res-1");
        assert_eq!(role_id, "role-123");
    }

    // ── end to end ────────────────────────────────────────────────────────────

    #[tokio::test]
    async fn scenario_a_creation_throws_but_assignment_lands() {
        let dir = FakeDirectory {
            fail_create: true,
            create_lands: true,
            ..happy_directory()
        };
        let report = grant_app_role(&dir, &request()).await.unwrap();
        assert_eq!(report.role_id, "role-123");
        assert_eq!(report.resource_principal_id, "res-1");
        assert_eq!(report.msi_principal_id, "msi-1");
        assert!(report.create_error.is_some());
    }

    #[tokio::test]
    async fn scenario_b_assignment_never_lands() {
        let dir = FakeDirectory {
            fail_create: true,
            create_lands: false,
            ..happy_directory()
        };
        let err = grant_app_role(&dir, &request()).await.unwrap_err();
        assert!(matches!(err, GrantError::AssignmentNotConfirmed { .. }));
        // The verification read did run.
        assert_eq!(*dir.calls().last().unwrap(), "list_assignments");
    }

    #[tokio::test]
    async fn scenario_c_ambiguous_application_stops_the_run() {
        let dir = FakeDirectory {
            applications: vec![
                app("app-1", "Api1", &[("role-123", "Admin")]),
                app("app-2", "Api1-v2", &[("role-999", "Admin")]),
            ],
            principals: vec![
                sp("res-1", "Api1", PrincipalType::Application),
                sp("msi-1", "Msi1", PrincipalType::ManagedIdentity),
            ],
            ..Default::default()
        };
        let err = grant_app_role(&dir, &request()).await.unwrap_err();
        assert!(matches!(err, GrantError::AmbiguousLookup { found: 2, .. }));
        // No further directory calls after the ambiguous lookup.
        assert_eq!(dir.calls(), vec!["find_applications"]);
    }

    #[tokio::test]
    async fn clean_run_reports_no_creation_error() {
        let dir = FakeDirectory {
            create_lands: true,
            ..happy_directory()
        };
        let report = grant_app_role(&dir, &request()).await.unwrap();
        assert!(report.create_error.is_none());
        assert_eq!(
            dir.calls(),
            vec![
                "find_applications",
                "find_service_principals",
                "find_service_principals",
                "create_assignment",
                "list_assignments",
            ]
        );
    }

    #[tokio::test]
    async fn pre_existing_assignment_confirms_without_creation_landing() {
        // The role already exists; creation reports a failure and adds
        // nothing, but verification still finds the role.
        let dir = FakeDirectory {
            assignments: Mutex::new(vec![AppRoleAssignment {
                id:           "assign-0".into(),
                app_role_id:  "role-123".into(),
                principal_id: "msi-1".into(),
                resource_id:  "res-1".into(),
            }]),
            fail_create: true,
            create_lands: false,
            ..happy_directory()
        };
        let report = grant_app_role(&dir, &request()).await.unwrap();
        assert!(report.create_error.is_some());
    }
}
