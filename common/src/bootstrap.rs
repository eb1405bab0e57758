use log::{info, warn};

use crate::{
    config::{BootstrapConfig, CredentialScheme},
    credentials::Credentials,
    devices::Delay,
    endpoints::ENDPOINT_GET_CREDENTIALS,
    error::{AttemptError, BootstrapError},
    transport::Transport,
};

/// Fetches device credentials with a bounded, fixed back-off retry.
pub struct Bootstrapper<T, D> {
    transport: T,
    delay: D,
    config: BootstrapConfig,
    scheme: CredentialScheme,
}

impl<T, D> Bootstrapper<T, D>
where
    T: Transport,
    D: Delay,
{
    pub fn new(transport: T, delay: D, config: BootstrapConfig, scheme: CredentialScheme) -> Self {
        Self {
            transport,
            delay,
            config,
            scheme,
        }
    }

    pub fn acquire_credentials(&mut self) -> Result<Credentials, BootstrapError> {
        self.acquire_credentials_with(|_, _| {})
    }

    /// Like [`Self::acquire_credentials`], calling `on_attempt(n, max)` before each request.
    pub fn acquire_credentials_with(
        &mut self,
        mut on_attempt: impl FnMut(u32, u32),
    ) -> Result<Credentials, BootstrapError> {
        let max_attempts = self.config.max_attempts.max(1);
        let mut last_err = None;

        for attempt in 1..=max_attempts {
            on_attempt(attempt, max_attempts);
            info!("requesting credentials (attempt {attempt}/{max_attempts})");

            match self.attempt() {
                Ok(credentials) => {
                    info!(
                        "credentials acquired for `{}` on attempt {attempt}",
                        credentials.display_name(self.scheme)
                    );
                    return Ok(credentials);
                }
                Err(err) => {
                    match &err {
                        AttemptError::Protocol(_) => {
                            warn!("credential response unusable on attempt {attempt}: {err}")
                        }
                        AttemptError::Transport(_) | AttemptError::Status(_) => {
                            warn!("credential request failed on attempt {attempt}: {err}")
                        }
                    }
                    last_err = Some(err);
                }
            }

            if attempt < max_attempts {
                self.delay.delay_ms(self.config.retry_delay_ms);
            }
        }

        let last = last_err.unwrap_or(AttemptError::Status(0));
        warn!("giving up on credentials after {max_attempts} attempts");
        Err(BootstrapError::Exhausted {
            attempts: max_attempts,
            last,
        })
    }

    fn attempt(&mut self) -> Result<Credentials, AttemptError> {
        let response = self.transport.get(ENDPOINT_GET_CREDENTIALS)?;
        if !response.is_success() {
            return Err(AttemptError::Status(response.status));
        }
        Ok(Credentials::parse(&response.body, self.scheme)?)
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::{
        error::ProtocolError,
        testing::{ok, refused, RecordingDelay, ScriptedTransport},
    };

    fn bootstrapper<'a>(
        transport: &'a mut ScriptedTransport,
        delay: &'a mut RecordingDelay,
    ) -> Bootstrapper<&'a mut ScriptedTransport, &'a mut RecordingDelay> {
        Bootstrapper::new(
            transport,
            delay,
            BootstrapConfig::default(),
            CredentialScheme::Identifier,
        )
    }

    #[test]
    fn first_good_response_wins() {
        let mut transport = ScriptedTransport::new()
            .reply(Ok(ok(200, r#"{"identifier":"badge-1","password":"pw"}"#)));
        let mut delay = RecordingDelay::default();

        let credentials = bootstrapper(&mut transport, &mut delay)
            .acquire_credentials()
            .unwrap();

        assert_eq!(credentials.identifier, "badge-1");
        assert_eq!(transport.paths(), vec![ENDPOINT_GET_CREDENTIALS]);
        assert!(delay.delays.is_empty());
    }

    #[test]
    fn always_failing_server_sees_exactly_max_attempts() {
        let mut transport = ScriptedTransport::always(Err(refused()));
        let mut delay = RecordingDelay::default();

        let err = bootstrapper(&mut transport, &mut delay)
            .acquire_credentials()
            .unwrap_err();

        assert_eq!(transport.requests.len(), 5);
        assert_eq!(delay.delays, vec![5_000; 4]);
        assert_eq!(
            err,
            BootstrapError::Exhausted {
                attempts: 5,
                last: AttemptError::Transport(refused()),
            }
        );
    }

    #[test]
    fn malformed_bodies_are_retried_and_never_succeed() {
        let mut transport = ScriptedTransport::new()
            .reply(Ok(ok(200, "not json")))
            .reply(Ok(ok(200, r#"{"identifier":"badge-1"}"#)))
            .reply(Ok(ok(200, r#"{"password":"pw"}"#)))
            .reply(Ok(ok(200, r#"{"identifier":"","password":"pw"}"#)))
            .reply(Ok(ok(200, "{}")));
        let mut delay = RecordingDelay::default();

        let err = bootstrapper(&mut transport, &mut delay)
            .acquire_credentials()
            .unwrap_err();

        assert_eq!(transport.requests.len(), 5);
        assert_eq!(
            err,
            BootstrapError::Exhausted {
                attempts: 5,
                last: AttemptError::Protocol(ProtocolError::MissingField("password")),
            }
        );
    }

    #[test]
    fn recovers_after_provisioning_latency() {
        let mut transport = ScriptedTransport::new()
            .reply(Ok(ok(404, r#"{"error":"device not provisioned"}"#)))
            .reply(Err(refused()))
            .reply(Ok(ok(200, r#"{"identifier":"badge-9","password":"pw"}"#)));
        let mut delay = RecordingDelay::default();
        let mut attempts_seen = Vec::new();

        let credentials = bootstrapper(&mut transport, &mut delay)
            .acquire_credentials_with(|attempt, max| attempts_seen.push((attempt, max)))
            .unwrap();

        assert_eq!(credentials.identifier, "badge-9");
        assert_eq!(delay.delays, vec![5_000, 5_000]);
        assert_eq!(attempts_seen, vec![(1, 5), (2, 5), (3, 5)]);
    }

    #[test]
    fn non_success_status_is_distinguished_from_transport_failure() {
        let mut transport = ScriptedTransport::always(Ok(ok(503, "")));
        let mut delay = RecordingDelay::default();
        let mut bootstrapper = Bootstrapper::new(
            &mut transport,
            &mut delay,
            BootstrapConfig {
                max_attempts: 2,
                retry_delay_ms: 10,
            },
            CredentialScheme::Identifier,
        );

        let err = bootstrapper.acquire_credentials().unwrap_err();

        assert_eq!(
            err,
            BootstrapError::Exhausted {
                attempts: 2,
                last: AttemptError::Status(503),
            }
        );
        assert_eq!(delay.delays, vec![10]);
    }
}
