use assistant_core::{
    api::{start_server, ApiState},
    classifier::{IntentClassifier, KeywordUnderstanding, UnderstandingService},
    dispatcher::TaskDispatcher,
    gemini::{GeminiResponder, GeminiUnderstanding},
    handlers::{create_default_registry, OfflineResponder, Responder},
    jobs::JobSupervisor,
    profile::{profile_store_from_env, ProfileService},
    session::SessionManager,
};
use std::sync::Arc;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .init();

    // Load environment variables
    dotenv::dotenv().ok();

    let api_port: u16 = std::env::var("PORT")
        .or_else(|_| std::env::var("API_PORT"))
        .unwrap_or_else(|_| "8080".to_string())
        .parse()?;

    info!("🚀 Intent Dispatch Core - API Server");
    info!("📍 Port: {}", api_port);

    // Understanding/responder services: Gemini when a key is present,
    // offline mocks otherwise.
    let (understanding, responder): (Arc<dyn UnderstandingService>, Arc<dyn Responder>) =
        match std::env::var("GEMINI_API_KEY") {
            Ok(key) if !key.trim().is_empty() => {
                info!("using Gemini understanding/responder services");
                (
                    Arc::new(GeminiUnderstanding::new(key.clone())?),
                    Arc::new(GeminiResponder::new(key)?),
                )
            }
            _ => {
                warn!("GEMINI_API_KEY not set; falling back to offline services");
                (Arc::new(KeywordUnderstanding), Arc::new(OfflineResponder))
            }
        };

    // Create components
    let profiles = ProfileService::new(profile_store_from_env());
    let (jobs, mut notifications) = JobSupervisor::new();
    let sessions = Arc::new(SessionManager::new(profiles.clone(), jobs.clone()));
    let classifier = Arc::new(IntentClassifier::new(understanding));
    let registry = Arc::new(create_default_registry(responder));
    let dispatcher = Arc::new(TaskDispatcher::new(
        registry,
        sessions.clone(),
        jobs.clone(),
    ));
    dispatcher.validate_registry()?;

    // Job completions are logged; clients poll /api/jobs/:id for results.
    tokio::spawn(async move {
        while let Some(note) = notifications.recv().await {
            info!(
                job_id = %note.job_id,
                kind = %note.kind,
                status = ?note.status,
                "job finished"
            );
        }
    });

    // Settled jobs are kept for an hour so clients can poll results,
    // then pruned so the supervisor map does not grow without bound.
    let pruner = jobs.clone();
    tokio::spawn(async move {
        let mut tick = tokio::time::interval(std::time::Duration::from_secs(600));
        loop {
            tick.tick().await;
            pruner.prune_terminal(chrono::Duration::hours(1)).await;
        }
    });

    info!("✅ Dispatch core initialized");
    info!("📡 Starting API server...");

    // Start API server
    start_server(
        ApiState {
            classifier,
            dispatcher,
            sessions,
            profiles,
            jobs,
        },
        api_port,
    )
    .await?;

    Ok(())
}
