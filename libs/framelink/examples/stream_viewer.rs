//! Live camera → processing service viewer
//!
//! Streams the local camera (or a synthetic test pattern with
//! `--test-pattern`) to a processing service and reports the results coming
//! back once a second. Pass the service URL as a positional argument:
//!
//! ```sh
//! cargo run --example stream_viewer -- ws://localhost:8000/ws/video
//! ```
//!
//! Press Ctrl+C to stop.

use framelink::{FrameSourceKind, PipelineConfig, Result, StreamPipeline};
use std::time::Duration;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "framelink=info".parse().unwrap()),
        )
        .init();

    let mut config = PipelineConfig::default();
    for arg in std::env::args().skip(1) {
        match arg.as_str() {
            "--test-pattern" => config.source = FrameSourceKind::TestPattern,
            url => config.service_url = url.to_string(),
        }
    }

    println!("=== framelink stream viewer ===\n");
    println!("📡 Service: {}", config.service_url);
    println!("🎥 Source:  {:?}", config.source);
    println!();

    let mut pipeline = StreamPipeline::new(config);
    pipeline.start().await?;
    // Render the cropped stream whenever the service provides one.
    pipeline.set_show_cropped(true);
    println!("✅ Pipeline started — streaming (Ctrl+C to stop)\n");

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            _ = tokio::time::sleep(Duration::from_secs(1)) => {
                let display = pipeline.display();
                let processed = display
                    .processed_image
                    .as_deref()
                    .map(str::len)
                    .unwrap_or(0);
                println!(
                    "   state={:?} processed={}B cropped={} dropped={}",
                    pipeline.state(),
                    processed,
                    if display.cropped_image.is_some() { "yes" } else { "no" },
                    pipeline.dropped_frames(),
                );
            }
        }
    }

    println!("\n🛑 Stopping...");
    pipeline.teardown();
    println!("👋 Done");
    Ok(())
}
