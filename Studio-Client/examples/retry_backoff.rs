use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;
use studio_client::*;
use tokio_util::sync::CancellationToken;

/// Drive a flaky operation through the backoff executor, then cancel a
/// second one halfway through its backoff.
#[tokio::main]
async fn main() {
    let executor = BackoffExecutor::new(
        RetryConfig::default()
            .with_max_attempts(5)
            .with_base_delay(Duration::from_millis(100)),
    );

    let attempts = AtomicU32::new(0);
    let result: std::result::Result<u32, ClientError> = executor
        .execute(
            || async {
                let n = attempts.fetch_add(1, Ordering::SeqCst) + 1;
                if n < 3 {
                    Err(ClientError::Http {
                        status: 503,
                        message: "Model overloaded".into(),
                    })
                } else {
                    Ok(n)
                }
            },
            &CancellationToken::new(),
            |e| println!("attempt {} failed ({}), next in {:?}", e.attempt, e.message, e.delay),
        )
        .await;
    println!("flaky operation: {:?}", result);

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(150)).await;
        trigger.cancel();
    });

    let result: std::result::Result<(), ClientError> = executor
        .execute(
            || async {
                Err(ClientError::Http {
                    status: 500,
                    message: "Server error".into(),
                })
            },
            &cancel,
            |e| println!("attempt {} failed, backing off {:?}", e.attempt, e.delay),
        )
        .await;
    println!("cancelled operation: {:?}", result.map_err(|e| e.is_cancelled()));
}
