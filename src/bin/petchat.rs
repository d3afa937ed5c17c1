//! Interactive chat with the pet-health assistant.
//!
//! This binary provides a REPL that talks to the dashboard's chat endpoint and prints replies
//! as they stream in.
//!
//! # Usage
//!
//! ```bash
//! # Chat about one pet against a local dashboard
//! petchat --user u-42 --animal bori
//!
//! # Point at another deployment
//! PETCHAT_API_BASE_URL=https://vet.example.com petchat --user u-42
//!
//! # No network at all
//! petchat --user demo --mock
//! ```
//!
//! Set `RUST_LOG=petchat=debug` to see request and stream diagnostics on stderr.

use std::sync::{Arc, Mutex};

use arrrg::CommandLine;
use rustyline::DefaultEditor;
use rustyline::error::ReadlineError;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use petchat::chat::{
    ChatArgs, ChatCommand, ChatConfig, ChatSession, PlainTextRenderer, Renderer, SendOutcome,
    SessionContext, TranscriptFollower, help_text, parse_command,
};
use petchat::{ChatClient, ChatTransport, MockTransport};

/// Main entry point for the petchat application.
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let (args, _) = ChatArgs::from_command_line_relaxed("petchat [OPTIONS]");
    let config = ChatConfig::from_args(&args)?;

    let transport: Arc<dyn ChatTransport> = if args.mock {
        Arc::new(MockTransport::echo())
    } else {
        Arc::new(ChatClient::new(&config)?)
    };
    let context = SessionContext {
        user_id: args.user.clone(),
        animal_id: args.animal.clone(),
    };
    let mut session = ChatSession::with_transport(transport, config.clone()).with_context(context);
    let mut renderer = PlainTextRenderer::with_color(config.use_color);
    let mut follower = TranscriptFollower::new(config.error_prefix.clone());
    let mut rl = DefaultEditor::new()?;

    // The in-flight send, if any. Ctrl+C at the prompt is handled by rustyline.
    let in_flight: Arc<Mutex<Option<CancellationToken>>> = Arc::new(Mutex::new(None));
    let handler_slot = Arc::clone(&in_flight);
    ctrlc::set_handler(move || {
        if let Ok(slot) = handler_slot.lock()
            && let Some(cancel) = slot.as_ref()
        {
            cancel.cancel();
        }
    })?;

    if args.mock {
        println!("Pet chat (offline mock)");
    } else {
        println!("Pet chat ({})", config.endpoint()?);
    }
    if session.context().user_id.is_none() {
        renderer.print_info("No user selected; use /user <id> before chatting.");
    }
    println!("Type /help for commands, /quit to exit\n");

    loop {
        let readline = rl.readline("You: ");

        match readline {
            Ok(line) => {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }

                let _ = rl.add_history_entry(line);

                if let Some(cmd) = parse_command(line) {
                    match cmd {
                        ChatCommand::Quit => {
                            println!("Goodbye!");
                            break;
                        }
                        ChatCommand::Clear => {
                            session.clear();
                            follower.skip_to(&session.transcript());
                            renderer.print_info("Conversation cleared.");
                        }
                        ChatCommand::Help => {
                            for line in help_text().lines() {
                                println!("    {line}");
                            }
                        }
                        ChatCommand::User(user) => {
                            match &user {
                                Some(id) => renderer.print_info(&format!("Chatting as {id}")),
                                None => renderer.print_info("Signed out; messages are ignored."),
                            }
                            session.set_user(user);
                        }
                        ChatCommand::Animal(animal) => {
                            match &animal {
                                Some(id) => renderer.print_info(&format!("Active pet: {id}")),
                                None => renderer.print_info("Active pet cleared."),
                            }
                            session.set_animal(animal);
                        }
                        ChatCommand::Model(model) => {
                            renderer.print_info(&format!("Model changed to: {model}"));
                            session.set_model(model);
                        }
                        ChatCommand::Temperature(value) => {
                            session.set_temperature(value);
                            renderer.print_info(&format!("temperature set to {value:.2}"));
                        }
                        ChatCommand::History(on) => {
                            session.set_include_history(on);
                            if on {
                                renderer.print_info("Sending the whole conversation.");
                            } else {
                                renderer.print_info("Sending only the latest message.");
                            }
                        }
                        ChatCommand::Stats => print_stats(&session),
                        ChatCommand::ShowConfig => print_config(&session),
                        ChatCommand::Invalid(message) => renderer.print_error(&format!("{message}\n")),
                    }
                    continue;
                }

                let cancel = CancellationToken::new();
                set_in_flight(&in_flight, Some(cancel.clone()));
                let outcome =
                    send_and_render(&session, line, &cancel, &mut follower, &mut renderer).await;
                set_in_flight(&in_flight, None);

                match outcome {
                    Ok(SendOutcome::Ignored) => {
                        if session.context().user_id.is_none() {
                            renderer.print_info("No user selected; use /user <id> first.");
                        }
                    }
                    Ok(SendOutcome::Interrupted { .. }) => renderer.print_interrupted(),
                    Ok(_) => {}
                    Err(err) => renderer.print_error(&format!("{err}\n")),
                }
            }
            Err(ReadlineError::Interrupted) => {
                println!();
                continue;
            }
            Err(ReadlineError::Eof) => {
                println!("\nGoodbye!");
                break;
            }
            Err(err) => {
                renderer.print_error(&format!("Input error: {err}\n"));
                break;
            }
        }
    }

    Ok(())
}

/// Sends one message while printing the transcript as it changes.
async fn send_and_render(
    session: &ChatSession,
    text: &str,
    cancel: &CancellationToken,
    follower: &mut TranscriptFollower,
    renderer: &mut dyn Renderer,
) -> petchat::Result<SendOutcome> {
    let mut updates = session.subscribe();
    follower.skip_to(&updates.borrow_and_update());

    let send = session.send_with_cancel(text, cancel);
    tokio::pin!(send);
    let outcome = loop {
        tokio::select! {
            outcome = &mut send => break outcome,
            Ok(()) = updates.changed() => {
                let snapshot = updates.borrow_and_update().clone();
                follower.update(&snapshot, renderer);
            }
        }
    };
    follower.finish(&session.transcript(), renderer);
    outcome
}

fn set_in_flight(slot: &Mutex<Option<CancellationToken>>, cancel: Option<CancellationToken>) {
    match slot.lock() {
        Ok(mut slot) => *slot = cancel,
        Err(poisoned) => *poisoned.into_inner() = cancel,
    }
}

fn print_stats(session: &ChatSession) {
    let stats = session.stats();
    println!("    Session Statistics:");
    println!("      User: {}", describe(stats.user_id.as_deref()));
    println!("      Pet: {}", describe(stats.animal_id.as_deref()));
    println!("      Messages: {}", stats.message_count);
    println!("      Sends: {}", stats.total_sends);
    println!(
        "      Replies: {} streamed / {} JSON",
        stats.streamed_replies, stats.json_replies
    );
    println!("      Failures: {}", stats.failures);
    println!("      Interrupted: {}", stats.interruptions);
}

fn print_config(session: &ChatSession) {
    let config = session.config();
    println!("    Current Configuration:");
    match config.endpoint() {
        Ok(endpoint) => println!("      Endpoint: {endpoint}"),
        Err(err) => println!("      Endpoint: ({err})"),
    }
    println!("      Model: {}", config.model);
    println!("      Temperature: {:.2}", config.temperature);
    println!(
        "      History: {}",
        if config.include_history {
            "whole conversation"
        } else {
            "latest message only"
        }
    );
    println!("      Timeout: {}ms", config.timeout_ms);
    println!("      Retries: {}", config.max_retries);
}

fn describe(value: Option<&str>) -> &str {
    value.unwrap_or("(none)")
}
