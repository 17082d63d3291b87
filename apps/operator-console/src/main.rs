//! Rover Operator Console
//!
//! Line-driven operator station: each stdin line is a control surface
//! gesture, sent to the vehicle over the control link.

mod commands;
mod settings;
mod state;

use control_link::{LinkError, LinkEvent};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{error, info};

use crate::commands::{ConsoleCommand, Outcome};
use crate::settings::SettingsFile;
use crate::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("operator_console=info".parse()?)
                .add_directive("control_link=info".parse()?),
        )
        .with_target(true)
        .init();

    info!("Starting Rover Operator Console");

    let path = SettingsFile::default_path();
    let file = SettingsFile::load(&path)?;
    info!("Settings from {}", path.display());

    let state = AppState::new(file);

    state.link.on_state_change(|event| match event {
        LinkEvent::StateChanged { state, attempt } => {
            println!("[link] {state} (attempt {attempt})");
        }
        LinkEvent::ReconnectScheduled { attempt, delay } => {
            println!("[link] reconnect {attempt} in {:.1}s", delay.as_secs_f64());
        }
        LinkEvent::Error(e) if e.is_user_actionable() => {
            println!("[link] {e}");
            if matches!(e, LinkError::ExhaustedRetries { .. }) {
                println!("[link] check the endpoint, then 'open' to retry");
            }
        }
        LinkEvent::Error(e) => println!("[link] {e}, retrying"),
    });
    state.link.on_message(|decoded| {
        println!("[vehicle] {:?}", decoded.message);
    });

    let endpoint_raw = state.settings.lock().settings().endpoint_raw.clone();
    match control_link::resolve(&endpoint_raw, &state.resolver()) {
        Ok(descriptor) => println!(
            "Vehicle {} (camera {})",
            descriptor.control_url, descriptor.media_base_url
        ),
        Err(_) => println!("No usable endpoint, use 'endpoint <host>'"),
    }
    println!("Type 'help' for commands");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let command = match commands::parse(&line) {
            Ok(Some(command)) => command,
            Ok(None) => continue,
            Err(e) => {
                println!("{e}");
                continue;
            }
        };

        match commands::execute(&state, command) {
            Ok(Outcome::Reply(text)) => println!("{text}"),
            Ok(Outcome::Quiet) => {}
            Ok(Outcome::Quit) => break,
            Err(e) => {
                error!("Command failed: {}", e);
                println!("{e}");
            }
        }
    }

    info!("Shutting down");
    commands::execute(&state, ConsoleCommand::Stop)?;
    state.link.shutdown().await;

    Ok(())
}
