use std::time::Duration;

use crate::client::VideoClient;
use crate::stresstest::perform_stresstest;
use crate::workload::Workload;

mod client;
mod stresstest;
mod workload;

const DEFAULT_SERVER: &str = "http://127.0.0.1:8080";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // start the server first, then: cargo run -p stresstest -- http://127.0.0.1:8080
    let base_url = std::env::args()
        .nth(1)
        .unwrap_or_else(|| DEFAULT_SERVER.into());
    let remote = VideoClient {
        base_url: base_url.trim_end_matches('/').into(),
        client: reqwest::Client::new(),
    };

    let uploads = Workload::builder("uploads")
        .concurrency(32)
        .size_distribution(16 * 1024, 1024 * 1024) // p50 = 16K, p99 = 1M
        .action_weights(40, 50, 10)
        .build()?;
    let readers = Workload::builder("readers")
        .concurrency(8)
        .size_distribution(256 * 1024, 8 * 1024 * 1024)
        .action_weights(10, 10, 80)
        .build()?;

    perform_stresstest(remote, vec![uploads, readers], Duration::from_secs(5)).await
}
