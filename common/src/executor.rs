use log::{info, warn};

use crate::{
    command::Command,
    devices::{Audio, Devices, Display, LedStrip},
    endpoints::RICKROLL_ASSET,
    error::DeviceError,
    session::Session,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Execution {
    Applied,
    Ignored,
}

/// Applies one command: exactly one collaborator effect or session mutation.
pub fn execute<L, D, A>(
    command: &Command,
    session: &mut Session,
    devices: &mut Devices<L, D, A>,
) -> Result<Execution, DeviceError>
where
    L: LedStrip,
    D: Display,
    A: Audio,
{
    match command {
        Command::ChangeLedColor { r, g, b } => {
            info!("setting LEDs to ({r}, {g}, {b})");
            devices.leds.set_all(*r, *g, *b)?;
        }
        Command::ChangePassword { new_password } => {
            if session.set_password(new_password) {
                info!("password replaced");
            } else {
                info!("password unchanged");
            }
        }
        Command::DisplayPassword => {
            if !session.set_password_visible(true) {
                info!("password already visible");
            }
        }
        Command::HidePassword => {
            if !session.set_password_visible(false) {
                info!("password already hidden");
            }
        }
        Command::Rickroll => {
            devices.audio.stop()?;
            devices.audio.play(RICKROLL_ASSET)?;
        }
        Command::Unrecognized { name } => {
            warn!("ignoring unrecognized command `{name}`");
            return Ok(Execution::Ignored);
        }
    }

    Ok(Execution::Applied)
}
