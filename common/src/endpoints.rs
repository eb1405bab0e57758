pub const ENDPOINT_GET_CREDENTIALS: &str = "get_credentials";
pub const ENDPOINT_POLL_COMMANDS: &str = "poll_commands";
pub const ENDPOINT_CONFIRM_COMMAND: &str = "confirm_command";

pub const ENDPOINT_KNOB: &str = "knob";
pub const ENDPOINT_BUTTON: &str = "button";
pub const ENDPOINT_SWITCH: &str = "switch";

pub const RICKROLL_ASSET: &str = "rickroll";
