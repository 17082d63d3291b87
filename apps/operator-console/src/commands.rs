//! Console command handlers
//!
//! Each input line is one gesture from the control surface: an axis move, a
//! toggle, an overlay gesture, or a link operation.

use control_link::{EndpointError, resolve};
use control_protocol::{Command, Gear, clamp_axis, clamp_percent};
use overlay_geometry::Viewport;
use tracing::{debug, warn};

use crate::state::AppState;

/// Error type for commands
#[derive(Debug, PartialEq, thiserror::Error)]
pub enum CommandError {
    #[error("Unknown command: {0} (try 'help')")]
    Unknown(String),
    #[error("Missing argument for {0}")]
    MissingArgument(&'static str),
    #[error("Invalid argument {value:?} for {command}")]
    InvalidArgument { command: &'static str, value: String },
    #[error(transparent)]
    Endpoint(#[from] EndpointError),
}

type CommandResult<T> = Result<T, CommandError>;

#[derive(Debug, Clone, PartialEq)]
pub enum ConsoleCommand {
    Endpoint(String),
    Open,
    Close,
    Throttle(i32),
    Steer(i32),
    Brake(i32),
    Honk(bool),
    Gear(Gear),
    Lights(bool),
    Auto(bool),
    Stop,
    Drag(f64, f64),
    Resize(f64, f64),
    Fullscreen,
    Viewport(f64, f64),
    Status,
    Help,
    Quit,
}

pub const HELP: &str = "\
endpoint <host[:port]>   set the vehicle address
open | close             connect or disconnect
throttle <-100..100>     positive is forward
steer <-100..100>        positive is right
brake <0..100>
honk on|off
gear <1-3>
lights on|off
auto on|off
stop                     release every control
drag <dx> <dy>           move the video overlay
resize <dw> <dh>         resize the video overlay
fullscreen               toggle fullscreen video
viewport <w> <h>         screen size changed
status
quit";

/// Parse one input line; blank lines yield `None`
pub fn parse(line: &str) -> CommandResult<Option<ConsoleCommand>> {
    let mut words = line.split_whitespace();
    let Some(name) = words.next() else {
        return Ok(None);
    };
    let args: Vec<&str> = words.collect();

    let command = match name.to_ascii_lowercase().as_str() {
        "endpoint" => {
            if args.is_empty() {
                return Err(CommandError::MissingArgument("endpoint"));
            }
            ConsoleCommand::Endpoint(args.join(" "))
        }
        "open" | "connect" => ConsoleCommand::Open,
        "close" | "disconnect" => ConsoleCommand::Close,
        "throttle" => ConsoleCommand::Throttle(number(&args, 0, "throttle")?),
        "steer" => ConsoleCommand::Steer(number(&args, 0, "steer")?),
        "brake" => ConsoleCommand::Brake(number(&args, 0, "brake")?),
        "honk" => ConsoleCommand::Honk(switch(&args, "honk")?),
        "gear" => {
            let value: u8 = number(&args, 0, "gear")?;
            let gear = Gear::try_from(value).map_err(|_| CommandError::InvalidArgument {
                command: "gear",
                value: value.to_string(),
            })?;
            ConsoleCommand::Gear(gear)
        }
        "lights" => ConsoleCommand::Lights(switch(&args, "lights")?),
        "auto" => ConsoleCommand::Auto(switch(&args, "auto")?),
        "stop" => ConsoleCommand::Stop,
        "drag" => ConsoleCommand::Drag(number(&args, 0, "drag")?, number(&args, 1, "drag")?),
        "resize" => {
            ConsoleCommand::Resize(number(&args, 0, "resize")?, number(&args, 1, "resize")?)
        }
        "fullscreen" => ConsoleCommand::Fullscreen,
        "viewport" => {
            ConsoleCommand::Viewport(number(&args, 0, "viewport")?, number(&args, 1, "viewport")?)
        }
        "status" => ConsoleCommand::Status,
        "help" | "?" => ConsoleCommand::Help,
        "quit" | "exit" => ConsoleCommand::Quit,
        other => return Err(CommandError::Unknown(other.to_string())),
    };

    Ok(Some(command))
}

fn number<T: std::str::FromStr>(
    args: &[&str],
    index: usize,
    command: &'static str,
) -> CommandResult<T> {
    let raw = args
        .get(index)
        .ok_or(CommandError::MissingArgument(command))?;
    raw.parse().map_err(|_| CommandError::InvalidArgument {
        command,
        value: raw.to_string(),
    })
}

fn switch(args: &[&str], command: &'static str) -> CommandResult<bool> {
    match args.first().map(|s| s.to_ascii_lowercase()).as_deref() {
        Some("on" | "true" | "1") => Ok(true),
        Some("off" | "false" | "0") => Ok(false),
        Some(other) => Err(CommandError::InvalidArgument {
            command,
            value: other.to_string(),
        }),
        None => Err(CommandError::MissingArgument(command)),
    }
}

/// What the console loop should do next
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Reply(String),
    Quiet,
    Quit,
}

pub fn execute(state: &AppState, command: ConsoleCommand) -> CommandResult<Outcome> {
    debug!("Executing {:?}", command);

    let outcome = match command {
        ConsoleCommand::Endpoint(raw) => {
            let descriptor = resolve(&raw, &state.resolver())?;

            if let Err(e) = state
                .settings
                .lock()
                .update(|settings| settings.endpoint_raw = raw.clone())
            {
                warn!("Failed to save endpoint: {}", e);
            }
            state.link.configure(raw);

            Outcome::Reply(format!(
                "control {}\ncamera  {}",
                descriptor.control_url, descriptor.media_base_url
            ))
        }
        ConsoleCommand::Open => {
            state.link.open();
            Outcome::Quiet
        }
        ConsoleCommand::Close => {
            state.link.close();
            Outcome::Quiet
        }
        ConsoleCommand::Throttle(value) => {
            state.drive(|surface| {
                surface.throttle = clamp_axis(value);
                Command::Throttle(surface.throttle)
            });
            Outcome::Quiet
        }
        ConsoleCommand::Steer(value) => {
            state.drive(|surface| {
                surface.steering = clamp_axis(value);
                Command::Steering(surface.steering)
            });
            Outcome::Quiet
        }
        ConsoleCommand::Brake(value) => {
            state.drive(|surface| {
                surface.brake = i32::from(clamp_percent(value));
                Command::Brake(surface.brake)
            });
            Outcome::Quiet
        }
        ConsoleCommand::Honk(on) => {
            state.drive(|surface| {
                surface.honk = on;
                Command::Honk(on)
            });
            Outcome::Quiet
        }
        ConsoleCommand::Gear(gear) => {
            state.drive(|surface| {
                surface.gear = gear;
                Command::Settings
            });
            Outcome::Reply(format!("gear {gear}"))
        }
        ConsoleCommand::Lights(on) => {
            state.drive(|surface| {
                surface.lights_on = on;
                Command::Settings
            });
            Outcome::Quiet
        }
        ConsoleCommand::Auto(on) => {
            state.drive(|surface| {
                surface.auto_mode = on;
                Command::Settings
            });
            Outcome::Quiet
        }
        ConsoleCommand::Stop => {
            state.drive(|surface| {
                surface.throttle = 0;
                surface.steering = 0;
                surface.brake = 0;
                surface.honk = false;
                Command::Stop
            });
            Outcome::Quiet
        }
        ConsoleCommand::Drag(dx, dy) => {
            let mut overlay = state.overlay.lock();
            overlay.drag(dx, dy);
            let rect = overlay.rect();
            Outcome::Reply(format!("overlay at ({}, {})", rect.x, rect.y))
        }
        ConsoleCommand::Resize(dw, dh) => {
            let mut overlay = state.overlay.lock();
            overlay.begin_resize();
            overlay.resize(dw, dh);
            overlay.end_resize();
            let rect = overlay.rect();
            Outcome::Reply(format!("overlay {}x{}", rect.width, rect.height))
        }
        ConsoleCommand::Fullscreen => {
            let fullscreen = state.overlay.lock().toggle_fullscreen();
            Outcome::Reply(format!("fullscreen {}", if fullscreen { "on" } else { "off" }))
        }
        ConsoleCommand::Viewport(width, height) => {
            let viewport = Viewport::new(width, height);
            state.overlay.lock().set_viewport(viewport);
            if let Err(e) = state
                .settings
                .lock()
                .update(|settings| settings.viewport = viewport)
            {
                warn!("Failed to save viewport: {}", e);
            }
            Outcome::Quiet
        }
        ConsoleCommand::Status => Outcome::Reply(status_report(state)),
        ConsoleCommand::Help => Outcome::Reply(HELP.to_string()),
        ConsoleCommand::Quit => Outcome::Quit,
    };

    Ok(outcome)
}

fn status_report(state: &AppState) -> String {
    let status = state.link.status();
    let surface = *state.surface.lock();
    let frame = state.overlay.lock().effective_frame();

    let endpoint = match &status.endpoint {
        Some(descriptor) => format!(
            "{} (camera {})",
            descriptor.control_url, descriptor.media_base_url
        ),
        None => "not set".to_string(),
    };

    format!(
        "link     {} (attempt {})\n\
         endpoint {}\n\
         surface  throttle {} steer {} brake {} gear {} lights {} auto {} honk {}\n\
         overlay  {}x{} at ({}, {}){}",
        status.state,
        status.attempt,
        endpoint,
        surface.throttle,
        surface.steering,
        surface.brake,
        surface.gear,
        surface.lights_on,
        surface.auto_mode,
        surface.honk,
        frame.width,
        frame.height,
        frame.x,
        frame.y,
        if frame.fullscreen { " fullscreen" } else { "" },
    )
}
