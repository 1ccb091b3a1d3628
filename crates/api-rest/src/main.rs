//! Standalone REST API server binary.
//!
//! ## Purpose
//! Runs the clinic vitals REST API on its own, with OpenAPI/Swagger UI.
//!
//! ## Intended use
//! Useful for development against a local or bootcamp openEHR server. The workspace's main
//! `clinic-run` binary serves the same router.

use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use clinic_core::config::config_from_lookup;
use clinic_core::VitalsService;

/// Main entry point for the clinic REST API server
///
/// # Environment Variables
/// - `CLINIC_REST_ADDR`: Server address (default: "0.0.0.0:3000")
/// - `OPENEHR_BASE_URL`, `VITALS_TEMPLATE_ID`, `OPENEHR_TIMEOUT_SECS`, `OPENEHR_USERNAME`,
///   `OPENEHR_PASSWORD`, `VITALS_CACHE_READS`, `VITALS_QUERY_SHAPE`, `CLINIC_TEMPLATE_DIR` and
///   the `CLINIC_*` composition defaults, all read once here
///
/// # Errors
/// Returns an error if:
/// - the logging/tracing configuration cannot be initialised,
/// - the configuration is invalid or the local template directory cannot be read,
/// - the server address cannot be bound, or
/// - the HTTP server fails while running.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("api_rest=info".parse()?)
                .add_directive("clinic_core=info".parse()?),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let addr = std::env::var("CLINIC_REST_ADDR").unwrap_or_else(|_| "0.0.0.0:3000".into());

    let cfg = Arc::new(config_from_lookup(|name| std::env::var(name).ok())?);
    tracing::info!(
        base_url = %cfg.base_url(),
        template_id = %cfg.template_id(),
        "-- Starting clinic REST API on {}",
        addr
    );

    let app = api_rest::router(VitalsService::new(cfg)?);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
