use std::sync::Arc;
use std::time::Duration;
use studio_session::studio_client::{MockBackend, MockBackendConfig};
use studio_session::*;

/// Abort a slow generation from another task.
#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let backend = Arc::new(MockBackend::new(
        MockBackendConfig::instant().with_latency(Duration::from_secs(30), Duration::from_secs(30)),
    ));
    let (sink, mut events) = ChannelSink::new();
    let controller = Arc::new(GenerationController::from_config(
        &StudioConfig::default(),
        backend,
        Arc::new(sink),
    )?);

    controller.set_image(Some("data:image/png;base64,iVBORw0KGgo=".to_string()));
    controller.set_prompt("replace the sky with a thunderstorm");

    let running = {
        let controller = controller.clone();
        tokio::spawn(async move { controller.start().await })
    };

    tokio::time::sleep(Duration::from_millis(500)).await;
    println!("Aborting after 500ms (state: {})", controller.generation_state());
    controller.abort();

    let state = running.await.expect("generation task panicked");
    println!("Final state: {}", state);

    drop(controller);
    while let Some(event) = events.recv().await {
        println!("  [{}] {}", event.channel(), event);
    }
    Ok(())
}
