use std::time::{Duration, Instant};

use anyhow::Context;
use reqwest::{
    blocking::Client,
    header::{CONNECTION, CONTENT_TYPE},
};
use tracing::{info, warn};

use badge_common::{
    config::ServerConfig, join_url, start_session, Audio, BadgeConfig, BadgeMode, CommandPoller,
    DeviceError, Devices, Display, EventReporter, InputSource, InputTracker, LedStrip, Method,
    NetworkLink, Response, ThreadDelay, TickOutcome, Transport, TransportError,
};

const RICKROLL_DURATION: Duration = Duration::from_secs(18);

pub fn run() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let config = load_config()?;
    info!(
        "badge starting in {} mode against {}",
        config.mode.as_str(),
        config.server.base_url
    );

    let mut transport = HttpTransport::new(&config.server)?;
    let mut link = HostLink;

    match config.mode {
        BadgeMode::Commands => {
            let mut devices = Devices::new(
                ConsoleLeds,
                ConsoleDisplay::default(),
                ConsoleAudio::default(),
            );

            let mut session = start_session(
                &config,
                &mut link,
                &mut transport,
                &mut devices.display,
                ThreadDelay,
            )
            .context("badge is not ready")?;

            if let Err(err) = devices.leds.set_all(255, 255, 255) {
                warn!("initial LED color failed: {err}");
            }

            let mut poller = CommandPoller::new(&mut transport, config.poll.clone());
            poller.run(&mut session, &mut devices, ThreadDelay, |tick, outcome| {
                if let TickOutcome::Executed { command, .. } = outcome {
                    info!("tick {tick}: executed `{}`", command.name());
                }
                true
            });
        }
        BadgeMode::Events => {
            link.connect(&config.network.wifi_ssid, config.network.password())
                .context("network association failed")?;

            let mut inputs = SimulatedInputs::default();
            let tracker = InputTracker::new(inputs.knob_percent());
            let mut reporter = EventReporter::new(&mut transport, tracker, config.reporter.clone());
            reporter.run(&mut inputs, ThreadDelay, |_, _| true);
        }
    }

    Ok(())
}

fn load_config() -> anyhow::Result<BadgeConfig> {
    let mut config = match std::env::var("BADGE_CONFIG") {
        Ok(path) => {
            let raw = std::fs::read_to_string(&path)
                .with_context(|| format!("failed to read badge config at {path}"))?;
            serde_json::from_str::<BadgeConfig>(&raw)
                .with_context(|| format!("invalid badge config at {path}"))?
        }
        Err(_) => BadgeConfig::default(),
    };

    if let Ok(url) = std::env::var("BADGE_SERVER_URL") {
        config.server.base_url = url;
    }
    if let Ok(mode) = std::env::var("BADGE_MODE") {
        match BadgeMode::parse(&mode) {
            Some(mode) => config.mode = mode,
            None => warn!("ignoring unknown BADGE_MODE `{mode}`"),
        }
    }

    config.sanitize();
    Ok(config)
}

struct HttpTransport {
    client: Client,
    base_url: String,
}

impl HttpTransport {
    fn new(server: &ServerConfig) -> anyhow::Result<Self> {
        // No idle connections are kept: every request opens a fresh one.
        let client = Client::builder()
            .timeout(Duration::from_millis(server.timeout_ms))
            .pool_max_idle_per_host(0)
            .build()
            .context("failed to build HTTP client")?;

        Ok(Self {
            client,
            base_url: server.base_url.clone(),
        })
    }
}

impl Transport for HttpTransport {
    fn request(
        &mut self,
        method: Method,
        path: &str,
        body: Option<&str>,
    ) -> Result<Response, TransportError> {
        let url = join_url(&self.base_url, path);
        let mut request = match method {
            Method::Get => self.client.get(&url),
            Method::Post => self.client.post(&url),
        }
        .header(CONNECTION, "close");
        if let Some(body) = body {
            request = request
                .header(CONTENT_TYPE, "application/json")
                .body(body.to_string());
        }

        let response = request.send().map_err(|err| {
            if err.is_timeout() {
                TransportError::Timeout { url: url.clone() }
            } else {
                TransportError::Connect {
                    url: url.clone(),
                    message: err.to_string(),
                }
            }
        })?;

        let status = response.status().as_u16();
        let body = response.text().map_err(|err| TransportError::Body {
            url: url.clone(),
            message: err.to_string(),
        })?;

        Ok(Response { status, body })
    }
}

struct HostLink;

impl NetworkLink for HostLink {
    fn connect(&mut self, ssid: &str, _password: Option<&str>) -> Result<(), DeviceError> {
        if ssid.is_empty() {
            info!("host networking assumed up");
        } else {
            info!("host networking assumed up (would join `{ssid}`)");
        }
        Ok(())
    }
}

struct ConsoleLeds;

impl LedStrip for ConsoleLeds {
    fn set_all(&mut self, r: u8, g: u8, b: u8) -> Result<(), DeviceError> {
        info!("leds: all #{r:02x}{g:02x}{b:02x}");
        Ok(())
    }
}

#[derive(Default)]
struct ConsoleDisplay {
    last_frame: String,
}

impl ConsoleDisplay {
    fn present(&mut self, frame: String) {
        if frame != self.last_frame {
            info!("display:\n{frame}");
            self.last_frame = frame;
        }
    }
}

impl Display for ConsoleDisplay {
    fn show_text(&mut self, text: &str) -> Result<(), DeviceError> {
        self.present(text.to_string());
        Ok(())
    }

    fn show_info(
        &mut self,
        primary: &str,
        secondary: &str,
        secondary_visible: bool,
    ) -> Result<(), DeviceError> {
        let mut frame = format!("Identifier\n{primary}");
        if secondary_visible {
            frame.push_str(&format!("\nPassword\n{secondary}"));
        }
        self.present(frame);
        Ok(())
    }
}

#[derive(Default)]
struct ConsoleAudio {
    playing: Option<(String, Instant)>,
}

impl Audio for ConsoleAudio {
    fn stop(&mut self) -> Result<(), DeviceError> {
        if let Some((asset, _)) = self.playing.take() {
            info!("audio: stopped `{asset}`");
        }
        Ok(())
    }

    fn play(&mut self, asset: &str) -> Result<(), DeviceError> {
        info!("audio: playing `{asset}`");
        self.playing = Some((asset.to_string(), Instant::now()));
        Ok(())
    }

    fn service(&mut self) {
        let finished = matches!(
            &self.playing,
            Some((_, started)) if started.elapsed() >= RICKROLL_DURATION
        );
        if finished {
            if let Some((asset, _)) = self.playing.take() {
                info!("audio: `{asset}` finished");
            }
        }
    }
}

/// Deterministic input pattern standing in for the badge's knob, buttons and switches.
#[derive(Default)]
struct SimulatedInputs {
    samples: u64,
}

impl InputSource for SimulatedInputs {
    fn knob_percent(&mut self) -> u8 {
        self.samples = self.samples.saturating_add(1);
        ((self.samples / 100) % 11 * 10) as u8
    }

    fn button_pressed(&mut self, index: u8) -> bool {
        let phase = self.samples % 300;
        let start = u64::from(index) * 60;
        (start..start + 20).contains(&phase)
    }

    fn switch_on(&mut self, index: u8) -> bool {
        let phase = (self.samples / 400) % 4;
        match index {
            1 => phase == 1 || phase == 3,
            _ => phase >= 2,
        }
    }
}
