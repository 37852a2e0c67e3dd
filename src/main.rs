use std::sync::Arc;

use lead_funnel::config::{FunnelTiming, RelayConfig, server_port};
use lead_funnel::funnel::routes::funnel_routes;
use lead_funnel::notify::{PushPlusClient, mask_token, notify_routes};
use lead_funnel::store::{LeadStore, SupabaseStore};
use tower_http::cors::CorsLayer;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let port = server_port()?;

    let relay_config = RelayConfig::from_env();
    let store = SupabaseStore::from_env();

    eprintln!("📈 Lead Funnel v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   Session API: http://0.0.0.0:{port}/api/session");
    eprintln!("   Relay API:   http://0.0.0.0:{port}/api/notify");
    eprintln!(
        "   Lead store:  {}",
        if store.is_configured() {
            "supabase"
        } else {
            "disabled (missing SUPABASE_URL / SUPABASE_ANON_KEY)"
        }
    );
    match &relay_config.push_token {
        Some(token) => eprintln!("   Push token:  {}", mask_token(token)),
        None => eprintln!("   Push token:  not set (relay will answer 500)"),
    }

    let store: Arc<dyn LeadStore> = Arc::new(store);
    let push = Arc::new(PushPlusClient::new());

    let app = funnel_routes(store, FunnelTiming::default())
        .merge(notify_routes(relay_config.push_token, push))
        .layer(CorsLayer::permissive());

    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{port}")).await?;
    tracing::info!(port, "lead funnel server started");
    axum::serve(listener, app).await?;

    Ok(())
}
