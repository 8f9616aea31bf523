use std::sync::Arc;
use std::time::Duration;
use studio_client::*;
use tokio_util::sync::CancellationToken;

/// Run one resilient generation against the in-process mock backend.
///
/// `RUST_LOG=studio_client=debug cargo run --example mock_generation`
#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    // Fail often so the retry path is visible.
    let backend = Arc::new(MockBackend::new(
        MockBackendConfig::default()
            .with_latency(Duration::from_millis(200), Duration::from_millis(400))
            .with_failure_rate(0.5),
    ));
    let client = GenerationClient::new(backend.clone());

    let request = GenerationRequest::new(
        "data:image/png;base64,iVBORw0KGgo=",
        "make it sunset",
        "lighting-effects",
    );

    let result = client
        .submit(&request, ApiMode::Resilient, &CancellationToken::new(), |retry| {
            println!(
                "{}. Retrying generation... (Attempt {}, waiting {:?})",
                retry.message, retry.attempt, retry.delay
            );
        })
        .await;

    match result {
        Ok(record) => println!("Generated {} after {} call(s)", record.id, backend.call_count()),
        Err(e) => println!("Generation failed after {} call(s): {}", backend.call_count(), e),
    }
    Ok(())
}
