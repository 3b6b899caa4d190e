//! Demo CLI: start a voice call against a realtime agent endpoint
//!
//! Starts a session with the default microphone and speaker, prints agent
//! messages and transcript updates, optionally sends an opening text
//! instruction, and hangs up on Ctrl-C.

use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;
use voice_session::{RecordingConfig, SessionConfig, SessionManager};

#[derive(Parser, Debug)]
#[command(name = "voice_call", about = "Realtime voice call client")]
struct Args {
    /// Backend route that mints the ephemeral session credential
    #[arg(long, env = "VOICE_CREDENTIAL_URL", default_value = "http://localhost:3000/api/session")]
    credential_url: String,

    /// Realtime session endpoint
    #[arg(long, env = "VOICE_REALTIME_URL", default_value = "https://api.openai.com/v1/realtime")]
    realtime_url: String,

    /// Model identifier
    #[arg(long, env = "VOICE_MODEL", default_value = "gpt-4o-realtime-preview-2024-12-17")]
    model: String,

    /// Text instruction to send once connected
    #[arg(long)]
    say: Option<String>,

    /// Record local audio chunks as WAV files into this directory
    #[arg(long)]
    record_dir: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let args = Args::parse();

    let record = args.record_dir.is_some();
    let config = SessionConfig {
        credential_url: args.credential_url,
        realtime_url: args.realtime_url,
        model: args.model,
        recording: RecordingConfig {
            output_dir: args.record_dir,
            ..Default::default()
        },
        ..Default::default()
    };

    let session = SessionManager::new(config, Arc::new(|msg| println!("agent: {msg}")))?;

    let mut transcript_rx = session.transcript_changes();
    tokio::spawn(async move {
        while transcript_rx.changed().await.is_ok() {
            let transcript = transcript_rx.borrow().clone();
            if !transcript.is_empty() {
                println!("transcript: {transcript}");
            }
        }
    });

    info!("Starting session");
    session.start().await?;
    println!("connected, press Ctrl-C to hang up");

    if let Some(text) = args.say {
        session.send_text(&text).await?;
    }

    if record {
        session.start_recording().await?;
    }

    tokio::signal::ctrl_c().await?;

    info!("Ending session");
    session.end().await;

    Ok(())
}
