pub mod history;
pub mod retry;

pub use history::BoundedHistory;
pub use retry::{is_http_retryable, retry_with_backoff, RetryConfig};
