use std::sync::Arc;
use std::time::Duration;
use studio_session::studio_client::{ApiMode, MockBackend, MockBackendConfig};
use studio_session::*;

/// Drive a few generations against the mock backend and print the history.
///
/// `RUST_LOG=studio_session=debug cargo run --example mock_session`
#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let backend = Arc::new(MockBackend::new(
        MockBackendConfig::default()
            .with_latency(Duration::from_millis(100), Duration::from_millis(300))
            .with_failure_rate(0.4),
    ));
    let controller =
        GenerationController::from_config(&StudioConfig::default(), backend, Arc::new(TracingSink))?;

    controller.set_image(Some("data:image/png;base64,iVBORw0KGgo=".to_string()));
    controller.set_task(Some("lighting-effects".to_string()));
    controller.set_mode(ApiMode::Resilient);

    for prompt in ["make it sunset", "add fog", "golden hour"] {
        controller.set_prompt(prompt);
        let state = controller.start().await;
        println!("{:<16} -> {}", prompt, state);
        if state == GenerationState::Error {
            controller.clear_error();
        }
    }

    let snapshot = controller.snapshot();
    println!("\n{} item(s) in history:", snapshot.history.len());
    for record in &snapshot.history {
        println!("  {}  {:<16} {}", record.created_at, record.prompt, record.id);
    }
    Ok(())
}
