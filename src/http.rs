use reqwest::Client;
use std::time::Duration;

/// Outbound client shared by the AI façade. Image generation is slow, so the
/// request timeout defaults well above a typical API call.
pub fn build_client(timeout_secs: u64, connect_timeout_secs: u64) -> Client {
    Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .connect_timeout(Duration::from_secs(connect_timeout_secs))
        .build()
        .unwrap_or_else(|_| Client::new())
}
