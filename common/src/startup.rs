use log::{info, warn};

use crate::{
    bootstrap::Bootstrapper,
    config::BadgeConfig,
    devices::{Delay, Display, NetworkLink},
    error::StartupError,
    session::Session,
    transport::Transport,
};

/// Associates with Wi-Fi and acquires credentials, narrating progress on the display.
///
/// On failure the display is left showing the diagnostic and the caller must
/// not enter the poll loop.
pub fn start_session<N, T, D, W>(
    config: &BadgeConfig,
    link: &mut N,
    transport: T,
    display: &mut D,
    delay: W,
) -> Result<Session, StartupError>
where
    N: NetworkLink,
    T: Transport,
    D: Display,
    W: Delay,
{
    show(display, "Connecting to WiFi...");
    if let Err(err) = link.connect(&config.network.wifi_ssid, config.network.password()) {
        show(display, &format!("WiFi failed\n{}", err.message));
        return Err(StartupError::Network(err));
    }
    info!("network ready");

    let mut bootstrapper = Bootstrapper::new(
        transport,
        delay,
        config.bootstrap.clone(),
        config.credentials,
    );
    let result = bootstrapper.acquire_credentials_with(|attempt, max| {
        show(
            display,
            &format!("Fetching credentials\nattempt {attempt}/{max}"),
        );
    });

    let credentials = match result {
        Ok(credentials) => credentials,
        Err(err) => {
            show(display, &format!("Not ready\n{err}"));
            return Err(err.into());
        }
    };

    let session = Session::new(credentials, config.credentials);
    let state = session.display();
    if let Err(err) = display.show_info(&state.identifier_or_ip, &state.password, state.visible) {
        warn!("display refresh failed: {err}");
    }
    Ok(session)
}

fn show(display: &mut impl Display, text: &str) {
    if let Err(err) = display.show_text(text) {
        warn!("display update failed: {err}");
    }
}
