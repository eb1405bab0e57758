use log::{debug, info, warn};

use crate::{
    command::Command,
    config::PollConfig,
    devices::{Audio, Delay, Devices, Display, LedStrip},
    endpoints::{ENDPOINT_CONFIRM_COMMAND, ENDPOINT_POLL_COMMANDS},
    error::{ConfirmError, DeviceError, TransportError},
    executor::{execute, Execution},
    session::Session,
    transport::{encode_query_value, Transport},
};

#[derive(Debug, Clone, PartialEq, Eq)]
enum PollResult {
    Command(Command),
    Empty,
    Rejected(u16),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Confirmation {
    Disabled,
    NotRequired,
    Sent,
    Failed(ConfirmError),
}

/// What one loop iteration did. Every variant is non-fatal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TickOutcome {
    Idle,
    PollRejected(u16),
    PollFailed(TransportError),
    Executed {
        command: Command,
        execution: Execution,
        confirmation: Confirmation,
    },
    ExecutionFailed {
        command: Command,
        error: DeviceError,
    },
}

pub struct CommandPoller<T> {
    transport: T,
    config: PollConfig,
}

impl<T: Transport> CommandPoller<T> {
    pub fn new(transport: T, config: PollConfig) -> Self {
        Self { transport, config }
    }

    pub fn interval_ms(&self) -> u64 {
        self.config.interval_ms
    }

    /// One `poll_commands` round-trip. A non-2xx status yields `Ok(None)`.
    pub fn poll_once(&mut self) -> Result<Option<Command>, TransportError> {
        match self.fetch()? {
            PollResult::Command(command) => Ok(Some(command)),
            PollResult::Empty | PollResult::Rejected(_) => Ok(None),
        }
    }

    /// Best-effort acknowledgement. Never retried.
    pub fn confirm(&mut self, command: &Command) -> Result<(), ConfirmError> {
        let path = format!(
            "{ENDPOINT_CONFIRM_COMMAND}?command={}",
            encode_query_value(command.name())
        );
        let response = self.transport.get(&path)?;
        if !response.is_success() {
            return Err(ConfirmError::Status {
                command: command.name().to_string(),
                status: response.status,
            });
        }
        Ok(())
    }

    /// Poll, execute, confirm, then service audio and redraw the display.
    pub fn tick<L, D, A>(
        &mut self,
        session: &mut Session,
        devices: &mut Devices<L, D, A>,
    ) -> TickOutcome
    where
        L: LedStrip,
        D: Display,
        A: Audio,
    {
        let outcome = match self.fetch() {
            Ok(PollResult::Empty) => TickOutcome::Idle,
            Ok(PollResult::Rejected(status)) => TickOutcome::PollRejected(status),
            Err(err) => {
                warn!("poll failed: {err}");
                TickOutcome::PollFailed(err)
            }
            Ok(PollResult::Command(command)) => self.dispatch(command, session, devices),
        };

        devices.audio.service();

        let state = session.display();
        if let Err(err) =
            devices
                .display
                .show_info(&state.identifier_or_ip, &state.password, state.visible)
        {
            warn!("display refresh failed: {err}");
        }

        outcome
    }

    /// Runs ticks on a fixed cadence until `keep_running` returns false.
    ///
    /// The delay after a tick is always `interval_ms`, whether or not the tick
    /// failed. `keep_running` receives the 1-based tick number.
    pub fn run<L, D, A, W>(
        &mut self,
        session: &mut Session,
        devices: &mut Devices<L, D, A>,
        mut delay: W,
        mut keep_running: impl FnMut(u64, &TickOutcome) -> bool,
    ) where
        L: LedStrip,
        D: Display,
        A: Audio,
        W: Delay,
    {
        let mut tick: u64 = 0;
        loop {
            tick = tick.saturating_add(1);
            let outcome = self.tick(session, devices);
            if !keep_running(tick, &outcome) {
                return;
            }
            delay.delay_ms(self.config.interval_ms);
        }
    }

    fn fetch(&mut self) -> Result<PollResult, TransportError> {
        let response = self.transport.get(ENDPOINT_POLL_COMMANDS)?;

        if !response.is_success() {
            warn!("poll_commands returned HTTP {}", response.status);
            return Ok(PollResult::Rejected(response.status));
        }

        if response.body.trim().is_empty() {
            debug!("no pending command");
            return Ok(PollResult::Empty);
        }

        let command = Command::parse(&response.body);
        info!("received command `{}`", command.name());
        Ok(PollResult::Command(command))
    }

    fn dispatch<L, D, A>(
        &mut self,
        command: Command,
        session: &mut Session,
        devices: &mut Devices<L, D, A>,
    ) -> TickOutcome
    where
        L: LedStrip,
        D: Display,
        A: Audio,
    {
        let execution = match execute(&command, session, devices) {
            Ok(execution) => execution,
            Err(error) => {
                warn!("command `{}` failed: {error}", command.name());
                return TickOutcome::ExecutionFailed { command, error };
            }
        };

        let confirmation = match execution {
            Execution::Ignored => Confirmation::NotRequired,
            Execution::Applied if !self.config.confirm => Confirmation::Disabled,
            Execution::Applied => match self.confirm(&command) {
                Ok(()) => Confirmation::Sent,
                Err(err) => {
                    warn!("could not confirm `{}`: {err}", command.name());
                    Confirmation::Failed(err)
                }
            },
        };

        TickOutcome::Executed {
            command,
            execution,
            confirmation,
        }
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::{
        config::CredentialScheme,
        credentials::Credentials,
        testing::{ok, recording_devices, refused, DeviceCall, RecordingDelay, ScriptedTransport},
    };

    fn session() -> Session {
        Session::new(
            Credentials {
                identifier: "badge-5".to_string(),
                ip_address: String::new(),
                password: "pw".to_string(),
            },
            CredentialScheme::Identifier,
        )
    }

    #[test]
    fn led_command_is_executed_then_confirmed_once() {
        let mut transport = ScriptedTransport::new().reply(Ok(ok(
            200,
            r#"{"command":"change_led_color","r":10,"g":20,"b":30}"#,
        )));
        let mut session = session();
        let mut devices = recording_devices();

        let outcome = CommandPoller::new(&mut transport, PollConfig::default())
            .tick(&mut session, &mut devices);

        assert_eq!(devices.leds.calls, vec![DeviceCall::SetAll(10, 20, 30)]);
        assert_eq!(
            transport.paths(),
            vec![
                ENDPOINT_POLL_COMMANDS,
                "confirm_command?command=change_led_color"
            ]
        );
        assert_eq!(
            outcome,
            TickOutcome::Executed {
                command: Command::ChangeLedColor { r: 10, g: 20, b: 30 },
                execution: Execution::Applied,
                confirmation: Confirmation::Sent,
            }
        );
    }

    #[test]
    fn unknown_command_has_no_effect_and_no_confirmation() {
        let mut transport =
            ScriptedTransport::new().reply(Ok(ok(200, r#"{"command":"unknown_xyz"}"#)));
        let mut session = session();
        let mut devices = recording_devices();

        CommandPoller::new(&mut transport, PollConfig::default()).tick(&mut session, &mut devices);

        assert_eq!(transport.paths(), vec![ENDPOINT_POLL_COMMANDS]);
        assert!(devices.leds.calls.is_empty());
        assert!(devices.audio.calls.is_empty());
        assert_eq!(
            devices.display.calls,
            vec![DeviceCall::ShowInfo(
                "badge-5".to_string(),
                "pw".to_string(),
                false
            )]
        );
    }

    #[test]
    fn confirmation_can_be_disabled() {
        let mut transport =
            ScriptedTransport::new().reply(Ok(ok(200, r#"{"command":"rickroll"}"#)));
        let mut session = session();
        let mut devices = recording_devices();
        let config = PollConfig {
            confirm: false,
            ..PollConfig::default()
        };

        let outcome = CommandPoller::new(&mut transport, config).tick(&mut session, &mut devices);

        assert_eq!(transport.requests.len(), 1);
        assert!(matches!(
            outcome,
            TickOutcome::Executed {
                confirmation: Confirmation::Disabled,
                ..
            }
        ));
    }

    #[test]
    fn failed_confirmation_is_not_retried() {
        let mut transport = ScriptedTransport::new()
            .reply(Ok(ok(200, r#"{"command":"display_password"}"#)))
            .reply(Err(refused()))
            .reply(Ok(ok(204, "")));
        let mut session = session();
        let mut devices = recording_devices();
        let mut poller = CommandPoller::new(&mut transport, PollConfig::default());

        let first = poller.tick(&mut session, &mut devices);
        let second = poller.tick(&mut session, &mut devices);

        assert!(matches!(
            first,
            TickOutcome::Executed {
                confirmation: Confirmation::Failed(ConfirmError::Transport(_)),
                ..
            }
        ));
        assert_eq!(second, TickOutcome::Idle);
        assert!(session.display().visible);
        assert_eq!(
            transport.paths(),
            vec![
                ENDPOINT_POLL_COMMANDS,
                "confirm_command?command=display_password",
                ENDPOINT_POLL_COMMANDS,
            ]
        );
    }

    #[test]
    fn non_success_poll_dispatches_nothing_and_keeps_cadence() {
        let mut transport = ScriptedTransport::new()
            .reply(Ok(ok(500, r#"{"command":"rickroll"}"#)))
            .reply(Err(refused()))
            .reply(Ok(ok(200, r#"{"command":"hide_password"}"#)));
        let mut session = session();
        let mut devices = recording_devices();
        let mut delay = RecordingDelay::default();
        let mut outcomes = Vec::new();

        CommandPoller::new(&mut transport, PollConfig::default()).run(
            &mut session,
            &mut devices,
            &mut delay,
            |tick, outcome| {
                outcomes.push(outcome.clone());
                tick < 3
            },
        );

        assert_eq!(outcomes[0], TickOutcome::PollRejected(500));
        assert_eq!(outcomes[1], TickOutcome::PollFailed(refused()));
        assert!(matches!(outcomes[2], TickOutcome::Executed { .. }));
        assert!(devices.audio.calls.is_empty());
        assert_eq!(delay.delays, vec![2_000, 2_000]);
        assert_eq!(devices.audio.serviced, 3);
    }

    #[test]
    fn poll_once_maps_statuses() {
        let mut transport = ScriptedTransport::new()
            .reply(Ok(ok(404, "")))
            .reply(Ok(ok(204, "")))
            .reply(Ok(ok(200, r#"{"command":"rickroll"}"#)))
            .reply(Err(refused()));
        let mut poller = CommandPoller::new(&mut transport, PollConfig::default());

        assert_eq!(poller.poll_once(), Ok(None));
        assert_eq!(poller.poll_once(), Ok(None));
        assert_eq!(poller.poll_once(), Ok(Some(Command::Rickroll)));
        assert_eq!(poller.poll_once(), Err(refused()));
    }

    #[test]
    fn execution_failure_skips_confirmation() {
        let mut transport = ScriptedTransport::new().reply(Ok(ok(
            200,
            r#"{"command":"change_led_color","r":1,"g":2,"b":3}"#,
        )));
        let mut session = session();
        let mut devices = recording_devices();
        devices.leds.fail = true;

        let outcome = CommandPoller::new(&mut transport, PollConfig::default())
            .tick(&mut session, &mut devices);

        assert!(matches!(outcome, TickOutcome::ExecutionFailed { .. }));
        assert_eq!(transport.paths(), vec![ENDPOINT_POLL_COMMANDS]);
    }
}
