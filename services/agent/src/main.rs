//! Voicelink Agent
//!
//! This binary is responsible for:
//! 1. Loading configuration from the environment.
//! 2. Wiring the session library to real collaborators: the credential
//!    broker, the realtime signaling endpoint, and device audio I/O.
//! 3. Registering the local tools declared to the remote agent.
//! 4. Running a small console loop for text input and transcript output.

use anyhow::Context;
use clap::Parser;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::broadcast;
use tracing::{error, info, warn};
use voicelink_session::{
    AudioSink, AudioSource, BrokerClient, HttpSignalingClient, NullAudioSink, Role, SessionNotice,
    SessionOptions, SilentAudioSource, ToolRegistry, VadOptions, VoiceSession, WebRtcConnector,
};

mod audio;
mod config;
mod tools;

use audio::{MicrophoneSource, SpeakerSink};
use config::Config;
use tools::NavigationTool;

/// Used unless `INSTRUCTIONS_PATH` points at a replacement.
const DEFAULT_INSTRUCTIONS: &str = "You are a friendly onboarding specialist for a \
small-business finance assistant. Interview the caller about their business: what it does, \
how it earns money, how they manage their finances today, and what they want to improve. \
Ask one question at a time, listen actively, and keep a warm conversational tone. When the \
caller asks for directions or wants to see the way somewhere, use the show_route tool. \
Never mention that you are an AI.";

#[derive(Parser, Debug)]
#[command(
    name = "voicelink-agent",
    about = "Hold a live voice conversation with a realtime agent",
    version
)]
struct Cli {
    /// Run without microphone or speakers; converse over text only.
    #[arg(long)]
    text_only: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = Config::from_env().context("Failed to load configuration")?;
    tracing_subscriber::fmt()
        .with_max_level(config.log_level)
        .init();

    let instructions = match &config.instructions_path {
        Some(path) => std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read instructions from {}", path.display()))?,
        None => DEFAULT_INSTRUCTIONS.to_owned(),
    };

    let options = SessionOptions {
        instructions,
        voice: config.voice.clone(),
        temperature: config.temperature,
        vad: VadOptions {
            threshold: config.vad_threshold,
            prefix_padding_ms: config.vad_prefix_padding_ms,
            silence_duration_ms: config.vad_silence_duration_ms,
        },
        dedup_window: Duration::from_millis(config.dedup_window_ms),
    };

    let credentials = Arc::new(BrokerClient::new(config.token_url.clone()));
    let signaling = Arc::new(HttpSignalingClient::new(
        config.realtime_url.clone(),
        config.model.clone(),
    ));
    let (source, sink): (Arc<dyn AudioSource>, Arc<dyn AudioSink>) = if cli.text_only {
        (Arc::new(SilentAudioSource), Arc::new(NullAudioSink::new()))
    } else {
        (Arc::new(MicrophoneSource), Arc::new(SpeakerSink::new()))
    };
    let connector = Arc::new(WebRtcConnector::new(signaling, source, sink));

    let navigation = Arc::new(NavigationTool::new());
    let mut registry = ToolRegistry::new();
    registry.register(navigation.clone());

    let session = VoiceSession::new(options, credentials, connector, registry);

    // Mirror transcript and speech activity onto the console.
    let mut notices = session.subscribe();
    tokio::spawn(async move {
        loop {
            match notices.recv().await {
                Ok(SessionNotice::Turn(turn)) => {
                    let speaker = match turn.role {
                        Role::User => "you",
                        Role::Assistant => "agent",
                    };
                    println!("[{speaker}] {}", turn.content);
                }
                Ok(SessionNotice::Listening(true)) => println!("(listening...)"),
                Ok(SessionNotice::Listening(false)) => {}
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, "console fell behind on session updates");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    });

    let mut status_updates = session.watch_status();
    tokio::spawn(async move {
        while status_updates.changed().await.is_ok() {
            let status = status_updates.borrow().clone();
            println!("-- {status}");
        }
    });

    info!(model = %config.model, text_only = cli.text_only, "starting voice session");
    if let Err(err) = session.start().await {
        error!(error = %err, "session failed to start");
        println!("-- type /start to retry");
    }

    println!("Type a message and press enter. Commands: /start /stop /route /quit");
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Received shutdown signal. Shutting down gracefully...");
                break;
            }
            line = lines.next_line() => {
                let Some(line) = line.context("Failed to read from stdin")? else {
                    break;
                };
                match line.trim() {
                    "" => {}
                    "/quit" => break,
                    "/stop" => session.stop().await,
                    "/start" => {
                        if let Err(err) = session.start().await {
                            println!("-- type /start to retry ({err})");
                        }
                    }
                    "/route" => match navigation.current_route() {
                        Some(route) => println!("{route}"),
                        None => println!("no route displayed yet"),
                    },
                    text => {
                        if let Err(err) = session.send_text(text).await {
                            println!("-- message not sent: {err}");
                        }
                    }
                }
            }
        }
    }

    session.stop().await;
    info!("Session closed.");
    Ok(())
}
