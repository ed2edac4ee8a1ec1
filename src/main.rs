use anyhow::Context;
use infographic_analyst::config::Settings;
use infographic_analyst::gemini::GeminiClient;
use infographic_analyst::server::{router, AppState};
use infographic_analyst::store::JsonFileStore;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "infographic_analyst=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let settings = Settings::from_env();
    if settings.api_key.is_none() {
        warn!("GEMINI_API_KEY is not set; chat requests will ask for an API key");
    }

    let profiles = settings.load_profiles()?;
    info!("Loaded {} profiles: {:?}", profiles.list().len(), profiles.list());

    let store = JsonFileStore::open(&settings.data_dir)?;
    info!("Persisting conversations and reports under {:?}", settings.data_dir);

    let generator = GeminiClient::new(settings.model.clone());
    info!("Gemini client initialized (model={})", settings.model);

    let bind_addr = settings.bind_addr.clone();
    let state = AppState::new(settings, profiles, Arc::new(store), Arc::new(generator));
    let app = router(state);

    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("Failed to bind {}", bind_addr))?;
    info!("Server listening on http://{}", bind_addr);
    axum::serve(listener, app).await?;

    Ok(())
}
