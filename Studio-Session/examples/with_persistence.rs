use std::path::PathBuf;
use std::sync::Arc;
use studio_session::studio_client::{MockBackend, MockBackendConfig};
use studio_session::*;

/// Keep history and preferences in SQLite across runs.
#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let config = StudioConfig::builder()
        .with_db_path(PathBuf::from("/tmp/studio-session-example.db"))
        .with_history_capacity(5)
        .build();

    let backend = Arc::new(MockBackend::new(MockBackendConfig::instant()));
    let controller = GenerationController::from_config(&config, backend, Arc::new(TracingSink))?;

    // Check history from previous runs
    let existing = controller.history();
    if !existing.is_empty() {
        println!("Found {} result(s) from previous runs:", existing.len());
        for record in &existing {
            println!("  {} -> {}", record.id, record.prompt);
        }
        println!();
    }

    if controller.prompt().is_empty() {
        controller.set_prompt("turn it into a watercolor painting");
    }
    controller.set_image(Some("data:image/png;base64,iVBORw0KGgo=".to_string()));
    controller.start().await;

    println!(
        "{} result(s) in persistent history. Run this example again to see them.",
        controller.history().len()
    );
    Ok(())
}
