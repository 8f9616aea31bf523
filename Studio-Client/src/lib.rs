//! # studio-client
//!
//! Async client for an image-edit generation backend.
//!
//! Sends an image, a prompt and an edit task to the backend and returns the
//! validated [`GenerationRecord`]. Two paths are available:
//!
//! - **Direct** ([`ApiMode::Direct`]): one call, no retry.
//! - **Resilient** ([`ApiMode::Resilient`]): the call is driven by a
//!   [`BackoffExecutor`] with exponential delay, jitter and a capped number
//!   of attempts.
//!
//! Every suspendable call takes a `tokio_util` [`CancellationToken`];
//! cancellation always surfaces as [`ClientError::Cancelled`], never as a
//! transport error, so callers can tell the two apart without string
//! matching.
//!
//! ## Quick Start
//!
//! ```no_run
//! use studio_client::{ApiMode, ClientConfig, GenerationClient, GenerationRequest};
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn example() -> studio_client::Result<()> {
//! let client = GenerationClient::http(ClientConfig::default());
//! let cancel = CancellationToken::new();
//!
//! let request = GenerationRequest::new(
//!     "data:image/png;base64,iVBORw0KGgo=",
//!     "make it sunset",
//!     "lighting-effects",
//! );
//! let record = client
//!     .submit(&request, ApiMode::Resilient, &cancel, |retry| {
//!         eprintln!("{} (attempt {})", retry.message, retry.attempt);
//!     })
//!     .await?;
//! println!("result: {}", record.result_image);
//! # Ok(())
//! # }
//! ```
//!
//! [`CancellationToken`]: tokio_util::sync::CancellationToken

pub mod backoff;
pub mod client;
pub mod error;
pub mod mock;
pub mod transport;
pub mod types;

pub use backoff::{BackoffExecutor, RetryConfig, RetryEvent, RetryableError};
pub use client::{normalize_response, GenerationClient};
pub use error::{ClientError, Result};
pub use mock::{MockBackend, MockBackendConfig};
pub use transport::{ClientConfig, GenerationTransport, HttpTransport, TransportResponse};
pub use types::{
    find_task, ApiMode, GenerationRecord, GenerationRequest, TaskOption, CUSTOM_TASK,
    TASK_OPTIONS,
};
