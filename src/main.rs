mod app;
mod commands;
mod config;
mod engine;
mod error;
mod logging;
mod memo;
mod playback;
mod recording;
mod sync;
mod transcode;
mod ui;
mod waveform;

#[tokio::main]
async fn main() {
    if let Err(e) = app::run().await {
        tracing::error!("{e:#}");
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}
