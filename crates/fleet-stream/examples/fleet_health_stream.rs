//! Fleet Health Stream Example
//!
//! Follows the fleet-health stream of a running producer and prints every
//! state change until interrupted.
//!
//! Run with: `cargo run -p fleet-stream --example fleet_health_stream -- http://localhost:3000`

use std::time::Duration;

use fleet_stream::{StreamConfig, StreamController};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let base_url = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "http://localhost:3000".to_string());
    let config = StreamConfig::for_host(&base_url).idle_timeout(Some(Duration::from_secs(30)));

    let handle = StreamController::spawn(config)?;
    let mut updates = handle.subscribe();

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            changed = updates.changed() => {
                if changed.is_err() {
                    break;
                }
                let state = updates.borrow_and_update().clone();
                match &state.snapshot {
                    Some(snapshot) => println!(
                        "[{}] health {:.1} | {}/{} aircraft available | {} urgent work orders",
                        state.status,
                        snapshot.fleet_health_score,
                        snapshot.available_aircraft,
                        snapshot.total_aircraft,
                        snapshot.urgent_work_orders,
                    ),
                    None => println!("[{}] waiting for first snapshot", state.status),
                }
                if let Some(fault) = &state.last_error {
                    println!("  last error ({}): {fault}", fault.kind);
                }
                if state.status.is_failed() {
                    println!("Retries exhausted, reconnecting manually");
                    handle.reconnect().await?;
                }
            }
        }
    }

    handle.close().await?;
    Ok(())
}
