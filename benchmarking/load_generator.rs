//! Standalone throughput/latency probe, not wired into `cargo build`/`test`
//! (same as the teacher crate's own `benchmarking/load_generator.rs`): spins
//! up a number of concurrent clients against a local echo server, each
//! round-tripping a fixed number of fixed-size Binary messages, and reports
//! the average per-message latency.
//!
//! ```text
//! rustc --edition 2021 -L target/debug/deps --extern rfc6455_ws=target/debug/librfc6455_ws.rlib \
//!     --extern tokio=... benchmarking/load_generator.rs -o /tmp/load_generator
//! ```

use std::time::{Duration, Instant};

use tokio::sync::mpsc;

use rfc6455_ws::config::DialOptions;
use rfc6455_ws::dial::dial;

#[tokio::main]
async fn main() {
    let url = "ws://127.0.0.1:9002";
    let connection_count = 100; // Number of WebSocket clients
    let message_count = 1000; // Messages per client
    let message_size = 16384; // Size of each message in bytes

    let (tx, mut rx) = mpsc::unbounded_channel();

    for _ in 0..connection_count {
        let tx = tx.clone();
        tokio::spawn(async move {
            let mut connection = dial(url, &DialOptions::default()).await.unwrap();

            let payload = vec![b'a'; message_size];
            let start = Instant::now();

            for _ in 0..message_count {
                let reply = connection.send_binary(payload.clone()).await.unwrap();
                reply.await.unwrap().unwrap();
                let _ = connection.recv().await.unwrap();
            }

            let duration = start.elapsed();
            tx.send(duration).unwrap();
        });
    }

    drop(tx); // Close the channel

    let mut total_duration = Duration::new(0, 0);
    while let Some(duration) = rx.recv().await {
        total_duration += duration;
    }

    let avg_latency = total_duration / (connection_count as u32 * message_count as u32);
    println!("Average Latency: {:?}", avg_latency);
}
