use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use clinic_core::VitalsService;
use clinic_core::config::config_from_lookup;

/// Main entry point for the clinic backend
///
/// Resolves the configuration once, then serves the vitals REST API until Ctrl-C.
///
/// # Environment Variables
/// - `CLINIC_REST_ADDR`: REST server address (default: "0.0.0.0:3000")
/// - `OPENEHR_BASE_URL`: openEHR REST base (default: the bootcamp EHRbase server)
/// - `VITALS_TEMPLATE_ID`: default vitals template (default: "jitendra.choudhary.vitals.v1")
/// - `OPENEHR_TIMEOUT_SECS`: request deadline in seconds, unset or 0 for none
/// - `OPENEHR_USERNAME` / `OPENEHR_PASSWORD`: optional basic auth
/// - `VITALS_CACHE_READS`: cache vitals histories per EHR and template
/// - `VITALS_QUERY_SHAPE`: history row layout, `composition` (default) or `projection`
/// - `CLINIC_TEMPLATE_DIR`: directory of local web templates
///
/// # Returns
/// * `Ok(())` - If the server shuts down cleanly
/// * `Err(anyhow::Error)` - If configuration, binding or serving fails
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("clinic_run=info".parse()?)
                .add_directive("clinic_core=info".parse()?)
                .add_directive("api_rest=info".parse()?),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let rest_addr = std::env::var("CLINIC_REST_ADDR").unwrap_or_else(|_| "0.0.0.0:3000".into());

    let cfg = Arc::new(config_from_lookup(|name| std::env::var(name).ok())?);
    let service = VitalsService::new(cfg.clone())?;
    tracing::info!(
        base_url = %cfg.base_url(),
        template_id = %cfg.template_id(),
        local_templates = service.templates().local_templates().len(),
        "++ Starting clinic REST on {}",
        rest_addr
    );

    let listener = tokio::net::TcpListener::bind(&rest_addr).await?;
    axum::serve(listener, api_rest::router(service))
        .with_graceful_shutdown(async {
            tokio::signal::ctrl_c().await.ok();
            tracing::info!("-- Shutting down");
        })
        .await?;

    Ok(())
}
