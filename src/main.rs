//! Application entry point — Gemini chat REPL.
//!
//! # Startup sequence
//!
//! 1. Initialise logging.
//! 2. Load [`AppConfig`] from disk (returns default on first run).
//! 3. Create [`tokio`] runtime (multi-thread, 2 workers).
//! 4. Build the chat and speech collaborators from config.
//! 5. Build the [`ChatApp`] context object.
//! 6. Spawn the playback and attachment status printers.
//! 7. Read commands from stdin until `/quit`, EOF or Ctrl-C.
//! 8. Tear down: cancel conversions, stop speech, close audio output.

use std::io::Write;
use std::sync::Arc;

use anyhow::Result;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::broadcast;

use gemini_chat::{
    app::{AppError, ChatApp, Command, HELP},
    audio::CpalOutput,
    chat::{GeminiChat, Role},
    config::{AppConfig, AppPaths, API_KEY_ENV},
    speech::{GeminiSynthesizer, PlaybackEvent, SpeakOutcome},
};

// ---------------------------------------------------------------------------
// Background printers
// ---------------------------------------------------------------------------

fn spawn_playback_printer(mut events: broadcast::Receiver<PlaybackEvent>) {
    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(PlaybackEvent::Requesting(id)) => println!("[speech] fetching audio for {id}"),
                Ok(PlaybackEvent::Playing(id)) => println!("[speech] playing {id}"),
                Ok(PlaybackEvent::Finished(id)) => println!("[speech] finished {id}"),
                Ok(PlaybackEvent::Stopped(id)) => println!("[speech] stopped {id}"),
                Ok(PlaybackEvent::Failed { error, .. }) => println!("[speech] {error}"),
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    log::debug!("playback printer skipped {n} event(s)");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    });
}

fn spawn_attachment_printer(app: &ChatApp) {
    let pipeline = app.attachments().clone();
    let mut processing = pipeline.subscribe_processing();
    tokio::spawn(async move {
        while processing.changed().await.is_ok() {
            if !*processing.borrow_and_update() {
                println!(
                    "[attachments] ready: {} image(s) will go with your next message",
                    pipeline.attachment_count()
                );
            }
        }
    });
}

// ---------------------------------------------------------------------------
// Command handling
// ---------------------------------------------------------------------------

/// Run one command.  Returns `false` when the REPL should exit.
async fn handle(app: &mut ChatApp, command: Command) -> bool {
    let result: Result<(), AppError> = match command {
        Command::Say(text) => send(app, &text).await,
        Command::Attach(paths) => app.attach_paths(paths).map(print_receipt),
        Command::Drop(paths) => app.attach_dropped(paths).map(print_receipt),
        Command::Paste => app.paste().await.map(print_receipt),
        Command::Remove(n) => app
            .remove_attachment(n)
            .map(|a| println!("removed {}", a.label())),
        Command::Clear => {
            app.clear_attachments();
            println!("attachments cleared");
            Ok(())
        }
        Command::Cancel => {
            println!("cancelled {} conversion(s)", app.cancel_conversions());
            Ok(())
        }
        Command::List => {
            list(app);
            Ok(())
        }
        Command::Speak(n) => app.spawn_speak(n).map(|handle| {
            tokio::spawn(async move {
                // Failures are already reported through the event printer.
                if let Ok(Ok(SpeakOutcome::Discarded)) = handle.await {
                    log::debug!("speech request superseded");
                }
            });
        }),
        Command::Stop => {
            if !app.stop_speech() {
                println!("nothing is playing");
            }
            Ok(())
        }
        Command::Rate(x) => app
            .set_playback_rate(x)
            .map(|rate| println!("playback rate {rate}")),
        Command::Voice(name) => app.set_voice(&name).map(|v| println!("voice {v}")),
        Command::Dictate => match app.dictate().await {
            Ok(text) => {
                println!("> {text}");
                send(app, &text).await
            }
            Err(e) => Err(e),
        },
        Command::New => {
            app.new_conversation();
            println!("new conversation");
            Ok(())
        }
        Command::Help => {
            println!("{HELP}");
            Ok(())
        }
        Command::Quit => return false,
    };

    if let Err(e) = result {
        println!("error: {e}");
    }
    true
}

async fn send(app: &mut ChatApp, text: &str) -> Result<(), AppError> {
    let id = app.send(text).await?;
    let number = app.conversation().len();
    if let Some(reply) = app.conversation().get(id) {
        println!("\n[{number}] gemini:\n{}\n", reply.text);
    }
    Ok(())
}

fn print_receipt(receipt: gemini_chat::attachments::BatchReceipt) {
    for rejected in &receipt.rejected {
        println!(
            "skipped {} ({})",
            rejected.name.as_deref().unwrap_or(&rejected.mime_type),
            rejected.mime_type
        );
    }
    if !receipt.accepted.is_empty() {
        println!("converting {} image(s)...", receipt.accepted.len());
    }
}

fn list(app: &ChatApp) {
    for (i, message) in app.conversation().messages().iter().enumerate() {
        let who = match message.role {
            Role::User => "you",
            Role::Model => "gemini",
        };
        let state = app.speech().state_for(message.id);
        let marker = if state.is_active() {
            format!(" ({})", state.label())
        } else {
            String::new()
        };
        let extra = if message.attachments.is_empty() {
            String::new()
        } else {
            format!(" [+{} image(s)]", message.attachments.len())
        };
        println!("[{}] {who}{marker}{extra}: {}", i + 1, message.text);
    }

    let attachments = app.attachments().attachments();
    if !attachments.is_empty() {
        println!("pending attachments:");
        for (i, a) in attachments.iter().enumerate() {
            println!("  {}. {} ({})", i + 1, a.label(), a.mime_type);
        }
    }
    let pending = app.attachments().pending_count();
    if pending > 0 {
        println!("  {pending} still converting");
    }
}

// ---------------------------------------------------------------------------
// main
// ---------------------------------------------------------------------------

async fn run(config: AppConfig) -> Result<()> {
    let chat = GeminiChat::from_config(&config.chat);
    if !chat.has_api_key() {
        log::warn!("No API key configured; set {API_KEY_ENV} or chat.api_key in settings.toml");
    }
    let synth = GeminiSynthesizer::from_config(&config.chat, &config.speech);

    let mut app = ChatApp::new(
        config,
        Arc::new(chat),
        Arc::new(synth),
        Arc::new(CpalOutput::new()),
        None, // no speech recognizer in the terminal build
    )
    .with_settings_path(AppPaths::new().settings_file);

    spawn_playback_printer(app.speech().subscribe());
    spawn_attachment_printer(&app);

    println!("Gemini chat. Type a message, or /help for commands.");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("> ");
        std::io::stdout().flush()?;

        let line = tokio::select! {
            line = lines.next_line() => line?,
            _ = tokio::signal::ctrl_c() => None,
        };
        let Some(line) = line else { break };

        match Command::parse(&line) {
            Ok(None) => {}
            Ok(Some(command)) => {
                if !handle(&mut app, command).await {
                    break;
                }
            }
            Err(e) => println!("error: {e}"),
        }
    }

    app.shutdown();
    Ok(())
}

fn main() -> Result<()> {
    // 1. Logging
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    log::info!("Gemini chat starting up");

    // 2. Configuration
    let config = AppConfig::load().unwrap_or_else(|e| {
        log::warn!("Failed to load config ({e}); using defaults");
        AppConfig::default()
    });

    // 3. Tokio runtime
    let rt = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(2)
        .enable_all()
        .build()?;

    rt.block_on(run(config))
}
