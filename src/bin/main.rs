use assistant_core::{
    classifier::{IntentClassifier, KeywordUnderstanding},
    dispatcher::TaskDispatcher,
    handlers::{create_default_registry, OfflineResponder},
    jobs::JobSupervisor,
    models::JobStatus,
    profile::{InMemoryProfileStore, ProfileService},
    session::SessionManager,
    transcription::{MockTranscription, TranscriptionService},
};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .init();

    info!("Intent Dispatch Core starting (offline demo)");

    // Create components
    let profiles = ProfileService::new(Arc::new(InMemoryProfileStore::with_demo_user()));
    let (jobs, mut notifications) = JobSupervisor::new();
    let sessions = Arc::new(SessionManager::new(profiles, jobs.clone()));
    let classifier = IntentClassifier::new(Arc::new(KeywordUnderstanding));
    let registry = Arc::new(create_default_registry(Arc::new(OfflineResponder)));
    let dispatcher = TaskDispatcher::new(registry, sessions.clone(), jobs.clone());
    dispatcher.validate_registry()?;

    // Surface job completions as they arrive
    let notifier = tokio::spawn(async move {
        while let Some(note) = notifications.recv().await {
            println!(
                "\n[job {}] {} -> {:?}",
                note.job_id, note.kind, note.status
            );
        }
    });

    // Authenticate the seeded demo account
    let session = sessions
        .authenticate("demo@assistant.local", "Demo@12345")
        .await?;
    println!("=== Session started for {} ===", session.display_name);

    // Scripted utterances arriving as "audio" through the gateway
    let microphone = MockTranscription::new("hello there, how are you");
    let utterances = vec![
        microphone.transcribe(&[1u8; 16]).await?,
        "um, what time is it".to_string(),
        "please analyze the file Cargo.toml".to_string(),
        "wibble wobble frobnicate".to_string(),
    ];

    for text in utterances {
        println!("\n> {}", text);
        let intent = classifier.classify(&text).await;
        let result = dispatcher.dispatch(intent).await?;
        println!("[{:?}] {}", result.kind, result.detail);

        if let Some(job_id) = result.job_id {
            // Give the background analysis a moment to finish
            for _ in 0..50 {
                match jobs.poll(job_id).await {
                    Some(status) if status.is_terminal() => break,
                    _ => tokio::time::sleep(Duration::from_millis(20)).await,
                }
            }
            if let Some(handle) = jobs.handle(job_id).await {
                println!(
                    "[job {}] finished {:?}: {}",
                    handle.job_id,
                    handle.status,
                    handle
                        .result_or_error
                        .map(|v| v.to_string())
                        .unwrap_or_default()
                );
                assert_ne!(handle.status, JobStatus::Pending);
            }
        }
    }

    let session = sessions.active_session().await.ok_or("session lost")?;
    println!(
        "\n=== {} context entries recorded, title: {:?} ===",
        session.context_len(),
        session.title
    );

    sessions.logout().await;
    notifier.abort();
    info!("demo complete");
    Ok(())
}
