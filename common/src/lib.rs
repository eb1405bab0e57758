pub mod bootstrap;
pub mod command;
pub mod config;
pub mod credentials;
pub mod devices;
pub mod endpoints;
pub mod error;
pub mod executor;
pub mod poller;
pub mod reporter;
pub mod session;
pub mod startup;
pub mod transport;

#[cfg(test)]
pub(crate) mod testing;

pub use bootstrap::Bootstrapper;
pub use command::Command;
pub use config::{BadgeConfig, BadgeMode, CredentialScheme};
pub use credentials::Credentials;
pub use devices::{Audio, Delay, Devices, Display, InputSource, LedStrip, NetworkLink, ThreadDelay};
pub use endpoints::*;
pub use error::{
    AttemptError, BootstrapError, ConfirmError, DeviceError, ProtocolError, StartupError,
    TransportError,
};
pub use executor::{execute, Execution};
pub use poller::{CommandPoller, Confirmation, TickOutcome};
pub use reporter::{EventReporter, InputEvent, InputSample, InputTracker, SwitchState};
pub use session::{DisplayState, Session};
pub use startup::start_session;
pub use transport::{join_url, Method, Response, Transport};
