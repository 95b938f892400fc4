use anyhow::{Context, Result};
use rolegrant_directory::{GraphClient, GraphClientConfig};
use rolegrant_domain::GrantRequest;
use rolegrant_grant::grant_app_role;

// ── Grant ─────────────────────────────────────────────────────────────────────

pub async fn grant(
    resource_application: String,
    role_name: String,
    msi_name: String,
    tenant_id: Option<String>,
    client_id: Option<String>,
    client_secret: Option<String>,
) -> Result<()> {
    let request = GrantRequest::new(resource_application, role_name, msi_name)?;

    let config = GraphClientConfig {
        tenant_id,
        client_id,
        client_secret,
    };
    let dir = GraphClient::new(config).context("Failed to initialise Graph client")?;

    println!(
        "Granting role '{}' on '{}' to managed identity '{}'…",
        request.role_name, request.resource_application, request.msi_name
    );

    let report = grant_app_role(&dir, &request).await?;

    if let Some(create_error) = &report.create_error {
        println!("Creation call reported an error (assignment verified regardless): {create_error}");
    }
    println!(
        "Confirmed: role {} granted to principal {} on resource {}",
        report.role_id, report.msi_principal_id, report.resource_principal_id
    );
    Ok(())
}
