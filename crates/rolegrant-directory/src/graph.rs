use std::process::Command as StdCommand;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use rolegrant_domain::{AppRoleAssignment, Application, ServicePrincipal};
use serde_json::{json, Value};
use tokio::sync::Mutex;
use tracing::debug;

use crate::client::DirectoryClient;
use crate::error::DirectoryError;

// ── Configuration ─────────────────────────────────────────────────────────────

/// Static configuration for the Graph client, injected at startup.
/// These are operator-level settings, not part of the grant request.
#[derive(Debug, Clone, Default)]
pub struct GraphClientConfig {
    /// Azure tenant ID (GUID). Required for client-credential auth;
    /// optional for the Azure CLI fallback.
    pub tenant_id: Option<String>,
    /// Service principal client ID (optional; falls back to env vars, then CLI).
    pub client_id: Option<String>,
    /// Service principal client secret (optional; falls back to env vars, then CLI).
    pub client_secret: Option<String>,
}

// ── Base URLs (overridden in tests) ───────────────────────────────────────────

#[derive(Clone)]
pub(crate) struct BaseUrls {
    graph: String,
    login: String,
}

impl Default for BaseUrls {
    fn default() -> Self {
        Self {
            graph: "https://graph.microsoft.com".into(),
            login: "https://login.microsoftonline.com".into(),
        }
    }
}

// ── Token provider ────────────────────────────────────────────────────────────

/// Abstraction over Graph token acquisition — enables test injection.
#[async_trait]
trait TokenProvider: Send + Sync {
    async fn token(&self) -> Result<String, DirectoryError>;
}

// ── Service Principal (client credentials) ────────────────────────────────────

struct ServicePrincipalTokenProvider {
    tenant_id:     String,
    client_id:     String,
    client_secret: String,
    login_base:    String,
    client:        reqwest::Client,
    cache:         Mutex<Option<(String, Instant)>>,
}

#[async_trait]
impl TokenProvider for ServicePrincipalTokenProvider {
    async fn token(&self) -> Result<String, DirectoryError> {
        {
            let guard = self.cache.lock().await;
            if let Some((tok, expiry)) = guard.as_ref() {
                if Instant::now() < *expiry {
                    return Ok(tok.clone());
                }
            }
        }

        let url = format!("{}/{}/oauth2/v2.0/token", self.login_base, self.tenant_id);
        let params = [
            ("grant_type", "client_credentials"),
            ("client_id", &self.client_id),
            ("client_secret", &self.client_secret),
            ("scope", "https://graph.microsoft.com/.default"),
        ];
        let resp: Value = self
            .client
            .post(&url)
            .form(&params)
            .send()
            .await
            .map_err(|e| DirectoryError::Auth(format!("SP token request: {}", e)))?
            .json()
            .await
            .map_err(|e| DirectoryError::Auth(format!("SP token decode: {}", e)))?;

        let tok = resp["access_token"]
            .as_str()
            .ok_or_else(|| {
                DirectoryError::Auth(format!("SP token: no access_token in response: {}", resp))
            })?
            .to_string();
        let expires_in = resp["expires_in"].as_u64().unwrap_or(3600);
        let expiry = Instant::now() + Duration::from_secs(expires_in.saturating_sub(60));

        *self.cache.lock().await = Some((tok.clone(), expiry));
        Ok(tok)
    }
}

// ── Azure CLI ─────────────────────────────────────────────────────────────────

/// Reuses the session of a prior interactive `az login` — the precondition
/// path when no service principal credentials are configured.
struct AzureCliTokenProvider {
    tenant_id: Option<String>,
}

#[async_trait]
impl TokenProvider for AzureCliTokenProvider {
    async fn token(&self) -> Result<String, DirectoryError> {
        let mut args = vec![
            "account",
            "get-access-token",
            "--resource",
            "https://graph.microsoft.com",
            "--output",
            "json",
        ];
        if let Some(tenant) = self.tenant_id.as_deref() {
            args.push("--tenant");
            args.push(tenant);
        }

        let output = StdCommand::new("az").args(&args).output().map_err(|e| {
            DirectoryError::Auth(format!(
                "az CLI not found: {}. Install Azure CLI or configure service principal credentials.",
                e
            ))
        })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(DirectoryError::Auth(format!(
                "az account get-access-token failed: {}. Run 'az login' first.",
                stderr.trim()
            )));
        }

        let resp: Value = serde_json::from_slice(&output.stdout)
            .map_err(|e| DirectoryError::Auth(format!("az CLI output parse: {}", e)))?;
        let tok = resp["accessToken"]
            .as_str()
            .ok_or_else(|| DirectoryError::Auth("az CLI: no accessToken in output".into()))?
            .to_string();
        Ok(tok)
    }
}

// ── Static (tests) ────────────────────────────────────────────────────────────

#[cfg(test)]
struct StaticToken(String);

#[cfg(test)]
#[async_trait]
impl TokenProvider for StaticToken {
    async fn token(&self) -> Result<String, DirectoryError> {
        Ok(self.0.clone())
    }
}

// ── GraphClient ───────────────────────────────────────────────────────────────

/// Microsoft Graph v1.0 implementation of [`DirectoryClient`].
pub struct GraphClient {
    client: reqwest::Client,
    token:  Box<dyn TokenProvider>,
    base:   BaseUrls,
}

impl GraphClient {
    /// Create a `GraphClient`, auto-selecting the token provider:
    /// 1. `client_id` + `client_secret` in config → Service Principal
    /// 2. `AZURE_CLIENT_ID` + `AZURE_CLIENT_SECRET` env vars → Service Principal
    /// 3. Otherwise → Azure CLI (`az account get-access-token`)
    pub fn new(config: GraphClientConfig) -> Result<Self, DirectoryError> {
        let client = reqwest::Client::new();
        let base   = BaseUrls::default();

        let creds = match (config.client_id.as_deref(), config.client_secret.as_deref()) {
            (Some(cid), Some(cs)) => Some((cid.to_string(), cs.to_string())),
            _ => match (
                std::env::var("AZURE_CLIENT_ID"),
                std::env::var("AZURE_CLIENT_SECRET"),
            ) {
                (Ok(cid), Ok(cs)) => Some((cid, cs)),
                _ => None,
            },
        };

        let token: Box<dyn TokenProvider> = if let Some((client_id, client_secret)) = creds {
            let tenant_id = config.tenant_id.clone().ok_or_else(|| {
                DirectoryError::Auth(
                    "service principal credentials require a tenant id \
                     (--tenant-id or AZURE_TENANT_ID)"
                        .into(),
                )
            })?;
            Box::new(ServicePrincipalTokenProvider {
                tenant_id,
                client_id,
                client_secret,
                login_base: base.login.clone(),
                client:     client.clone(),
                cache:      Mutex::new(None),
            })
        } else {
            Box::new(AzureCliTokenProvider {
                tenant_id: config.tenant_id.clone(),
            })
        };

        Ok(Self { client, token, base })
    }

    /// Create a `GraphClient` with a static bearer token and custom base URLs.
    /// Used exclusively in tests.
    #[cfg(test)]
    pub(crate) fn with_static_token(token: &str, base: BaseUrls) -> Self {
        Self {
            client: reqwest::Client::new(),
            token:  Box::new(StaticToken(token.to_string())),
            base,
        }
    }

    async fn bearer(&self) -> Result<String, DirectoryError> {
        self.token.token().await
    }

    // ── Graph error parsing ───────────────────────────────────────────────────

    fn parse_graph_error(body: &Value) -> String {
        let err     = body.get("error").unwrap_or(body);
        let code    = err["code"].as_str().unwrap_or("Unknown");
        let message = err["message"].as_str().unwrap_or("unknown error");
        format!("{}: {}", code, message)
    }

    // ── Graph HTTP verbs ──────────────────────────────────────────────────────

    async fn graph_get(&self, url: &str) -> Result<(u16, Value), DirectoryError> {
        let token = self.bearer().await?;
        debug!(url, "Graph GET");
        let resp = self
            .client
            .get(url)
            .bearer_auth(&token)
            .send()
            .await
            .map_err(|e| DirectoryError::Request(format!("GET {}: {}", url, e)))?;

        let status = resp.status().as_u16();
        let body: Value = resp.json().await.unwrap_or(Value::Null);
        Ok((status, body))
    }

    async fn graph_post(&self, url: &str, body: &Value) -> Result<(u16, Value), DirectoryError> {
        let token = self.bearer().await?;
        debug!(url, "Graph POST");
        let resp = self
            .client
            .post(url)
            .bearer_auth(&token)
            .json(body)
            .send()
            .await
            .map_err(|e| DirectoryError::Request(format!("POST {}: {}", url, e)))?;

        let status = resp.status().as_u16();
        let body_val: Value = resp.json().await.unwrap_or(Value::Null);
        Ok((status, body_val))
    }

    /// GET a Graph collection, following `@odata.nextLink` pages so callers
    /// always see the full result set.
    async fn graph_get_collection(&self, first_url: String) -> Result<Vec<Value>, DirectoryError> {
        let mut items = Vec::new();
        let mut next  = Some(first_url);

        while let Some(url) = next.take() {
            let (status, body) = self.graph_get(&url).await?;
            if status != 200 {
                return Err(DirectoryError::Request(format!(
                    "GET {}: status {} — {}",
                    url,
                    status,
                    Self::parse_graph_error(&body)
                )));
            }
            if let Some(page) = body["value"].as_array() {
                items.extend(page.iter().cloned());
            }
            next = body["@odata.nextLink"].as_str().map(|s| s.to_string());
        }
        Ok(items)
    }

    fn search_url(&self, collection: &str, query: &str) -> Result<String, DirectoryError> {
        let filter = format!(
            "startswith(displayName,'{}')",
            escape_odata_literal(query)
        );
        let url = reqwest::Url::parse_with_params(
            &format!("{}/v1.0/{}", self.base.graph, collection),
            &[("$filter", filter.as_str())],
        )
        .map_err(|e| DirectoryError::Request(format!("build {} search url: {}", collection, e)))?;
        Ok(url.to_string())
    }

    fn decode_items<T: serde::de::DeserializeOwned>(
        items: Vec<Value>,
        what: &str,
    ) -> Result<Vec<T>, DirectoryError> {
        items
            .into_iter()
            .map(|v| {
                serde_json::from_value(v)
                    .map_err(|e| DirectoryError::Decode(format!("{}: {}", what, e)))
            })
            .collect()
    }
}

// ── OData literal escaping ────────────────────────────────────────────────────

/// Escape a string for embedding in an OData `$filter` string literal:
/// single quotes are doubled.
fn escape_odata_literal(raw: &str) -> String {
    raw.replace('\'', "''")
}

// ── DirectoryClient impl ──────────────────────────────────────────────────────

#[async_trait]
impl DirectoryClient for GraphClient {
    async fn find_applications_by_name(
        &self,
        query: &str,
    ) -> Result<Vec<Application>, DirectoryError> {
        let url   = self.search_url("applications", query)?;
        let items = self.graph_get_collection(url).await?;
        Self::decode_items(items, "application")
    }

    async fn find_service_principals_by_name(
        &self,
        query: &str,
    ) -> Result<Vec<ServicePrincipal>, DirectoryError> {
        let url   = self.search_url("servicePrincipals", query)?;
        let items = self.graph_get_collection(url).await?;
        Self::decode_items(items, "service principal")
    }

    async fn create_app_role_assignment(
        &self,
        object_id: &str,
        principal_id: &str,
        resource_id: &str,
        app_role_id: &str,
    ) -> Result<(), DirectoryError> {
        let url = format!(
            "{}/v1.0/servicePrincipals/{}/appRoleAssignments",
            self.base.graph, object_id,
        );
        let body = json!({
            "principalId": principal_id,
            "resourceId":  resource_id,
            "appRoleId":   app_role_id,
        });
        let (status, body_val) = self.graph_post(&url, &body).await?;
        if (200..300).contains(&status) {
            return Ok(());
        }
        Err(DirectoryError::CreateAssignment(format!(
            "POST {}: status {} — {}",
            url,
            status,
            Self::parse_graph_error(&body_val)
        )))
    }

    async fn list_app_role_assignments(
        &self,
        object_id: &str,
    ) -> Result<Vec<AppRoleAssignment>, DirectoryError> {
        let url = format!(
            "{}/v1.0/servicePrincipals/{}/appRoleAssignments",
            self.base.graph, object_id,
        );
        let items = self.graph_get_collection(url).await?;
        Self::decode_items(items, "app role assignment")
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
