use log::warn;
use serde::{Deserialize, Serialize};

/// A command returned by `poll_commands`, tagged on the `command` field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum Command {
    ChangeLedColor {
        r: u8,
        g: u8,
        b: u8,
    },
    ChangePassword {
        new_password: String,
    },
    DisplayPassword,
    HidePassword,
    Rickroll,
    /// Anything else the server sends. Never serialized.
    #[serde(skip)]
    Unrecognized {
        name: String,
    },
}

const KNOWN_COMMANDS: [&str; 5] = [
    "change_led_color",
    "change_password",
    "display_password",
    "hide_password",
    "rickroll",
];

impl Command {
    /// Decodes a poll body. Never fails: anything that is not a well-formed
    /// known command becomes [`Command::Unrecognized`].
    pub fn parse(body: &str) -> Self {
        let value: serde_json::Value = match serde_json::from_str(body) {
            Ok(value) => value,
            Err(err) => {
                warn!("poll body is not valid JSON: {err}");
                return Self::Unrecognized {
                    name: String::new(),
                };
            }
        };

        let name = value
            .get("command")
            .and_then(serde_json::Value::as_str)
            .unwrap_or_default()
            .to_string();

        if !KNOWN_COMMANDS.contains(&name.as_str()) {
            return Self::Unrecognized { name };
        }

        match serde_json::from_value(value) {
            Ok(command) => command,
            Err(err) => {
                warn!("malformed `{name}` command: {err}");
                Self::Unrecognized { name }
            }
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Self::ChangeLedColor { .. } => "change_led_color",
            Self::ChangePassword { .. } => "change_password",
            Self::DisplayPassword => "display_password",
            Self::HidePassword => "hide_password",
            Self::Rickroll => "rickroll",
            Self::Unrecognized { name } => name,
        }
    }

    pub fn is_recognized(&self) -> bool {
        !matches!(self, Self::Unrecognized { .. })
    }
}
