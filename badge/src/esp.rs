use core::convert::TryInto;
use std::{
    thread,
    time::{Duration, Instant},
};

use anyhow::{anyhow, Context};
use embedded_graphics::{
    mono_font::{ascii::FONT_6X10, MonoTextStyle},
    pixelcolor::BinaryColor,
    prelude::*,
    text::{Baseline, Text},
};
use embedded_svc::{
    http::{client::Client as HttpClient, Method as HttpMethod, Status},
    io::{Read, Write},
    wifi::{AuthMethod, ClientConfiguration, Configuration},
};
use esp_idf_hal::{
    adc::{
        attenuation::DB_11,
        oneshot::{config::AdcChannelConfig, AdcChannelDriver, AdcDriver},
        ADC1,
    },
    gpio::{AnyIOPin, Gpio1, IOPin, Input, OutputPin, PinDriver, Pull},
    i2c::{I2cConfig, I2cDriver},
    units::FromValueType,
};
use esp_idf_svc::{
    eventloop::EspSystemEventLoop,
    hal::prelude::Peripherals,
    http::client::{Configuration as HttpClientConfiguration, EspHttpConnection},
    log::EspLogger,
    nvs::EspDefaultNvsPartition,
    wifi::{BlockingWifi, EspWifi},
};
use log::{info, warn};
use ssd1306::{mode::BufferedGraphicsMode, prelude::*, I2CDisplayInterface, Ssd1306};

use badge_common::{
    config::ServerConfig, join_url, start_session, BadgeConfig, BadgeMode, CommandPoller, Delay,
    DeviceError, Devices, Display, EventReporter, InputSource, InputTracker, LedStrip, Method,
    NetworkLink, Response, StartupError, TickOutcome, Transport, TransportError,
};

use crate::{audio::Speaker, leds::LedChain};

const LED_COUNT: usize = 5;
const KNOB_ADC_MAX: u16 = 4095;
const LINE_HEIGHT: i32 = 16;
const DISPLAY_LINES: usize = 4;

const MAX_HTTP_BODY: usize = 4096;
const HTTP_CHUNK_SIZE: usize = 512;
const WATCHDOG_TIMEOUT_SEC: u32 = 90;
const WATCHDOG_SLICE_MS: u64 = 1_000;
const WIFI_RESTART_GRACE_MS: u64 = 300_000;
const WIFI_CONNECT_ATTEMPTS: u32 = 5;
const WIFI_RETRY_DELAY_MS: u64 = 3_000;

type OledDriver = Ssd1306<
    I2CInterface<I2cDriver<'static>>,
    DisplaySize128x64,
    BufferedGraphicsMode<DisplaySize128x64>,
>;

pub fn run() -> anyhow::Result<()> {
    esp_idf_svc::sys::link_patches();
    EspLogger::initialize_default();

    let config = build_config();
    info!(
        "badge starting in {} mode against {}",
        config.mode.as_str(),
        config.server.base_url
    );

    let sys_loop = EspSystemEventLoop::take()?;
    let nvs_partition = EspDefaultNvsPartition::take()?;
    let Peripherals {
        modem,
        pins,
        i2c0,
        rmt,
        ledc,
        adc1,
        ..
    } = Peripherals::take()?;

    let i2c = I2cDriver::new(
        i2c0,
        pins.gpio17,
        pins.gpio18,
        &I2cConfig::new().baudrate(400.kHz().into()),
    )
    .context("failed to init display I2C bus")?;
    let mut screen = OledScreen::new(i2c)?;

    let wifi = BlockingWifi::wrap(
        EspWifi::new(modem, sys_loop.clone(), Some(nvs_partition))?,
        sys_loop,
    )?;
    let mut link = WifiLink { wifi };
    let mut transport = EspTransport::new(&config.server);

    match config.mode {
        BadgeMode::Commands => {
            let session = start_session(
                &config,
                &mut link,
                &mut transport,
                &mut screen,
                WatchdogDelay::startup(),
            );
            let mut session = match session {
                Ok(session) => session,
                Err(err) => halt(&err),
            };
            disable_wifi_power_save();

            let leds = LedChain::new(rmt.channel0, pins.gpio7, LED_COUNT)?;
            let speaker =
                Speaker::new(ledc.channel0, ledc.timer0, pins.gpio8.downgrade_output())?;
            let mut devices = Devices::new(leds, screen, speaker);
            if let Err(err) = devices.leds.set_all(255, 255, 255) {
                warn!("initial LED color failed: {err}");
            }

            init_watchdog(WATCHDOG_TIMEOUT_SEC)?;
            add_current_task_to_watchdog()?;

            let mut poller = CommandPoller::new(&mut transport, config.poll.clone());
            poller.run(
                &mut session,
                &mut devices,
                WatchdogDelay::default(),
                |tick, outcome| {
                    if let TickOutcome::Executed { command, .. } = outcome {
                        info!("tick {tick}: executed `{}`", command.name());
                    }
                    true
                },
            );
        }
        BadgeMode::Events => {
            show(&mut screen, "Connecting to WiFi...");
            if let Err(err) = link.connect(&config.network.wifi_ssid, config.network.password()) {
                show(&mut screen, &format!("WiFi failed\n{}", err.message));
                halt(&StartupError::Network(err));
            }
            disable_wifi_power_save();
            show(&mut screen, "Reporting inputs");

            let mut inputs = BadgeInputs::new(
                adc1,
                pins.gpio1,
                [
                    pins.gpio4.downgrade(),
                    pins.gpio5.downgrade(),
                    pins.gpio6.downgrade(),
                ],
                [pins.gpio9.downgrade(), pins.gpio10.downgrade()],
            )?;

            init_watchdog(WATCHDOG_TIMEOUT_SEC)?;
            add_current_task_to_watchdog()?;

            let tracker = InputTracker::new(inputs.knob_percent());
            let mut reporter = EventReporter::new(&mut transport, tracker, config.reporter.clone());
            reporter.run(&mut inputs, WatchdogDelay::default(), |_, _| true);
        }
    }

    let _wifi = link;
    loop {
        feed_watchdog();
        thread::sleep(Duration::from_secs(60));
    }
}

/// Build-time configuration; the badge has no storage for runtime settings.
fn build_config() -> BadgeConfig {
    let mut config = BadgeConfig::default();
    config.network.wifi_ssid = option_env!("BADGE_WIFI_SSID")
        .unwrap_or_default()
        .to_string();
    config.network.wifi_pass = option_env!("BADGE_WIFI_PASS")
        .unwrap_or_default()
        .to_string();
    if let Some(url) = option_env!("BADGE_SERVER_URL") {
        config.server.base_url = url.to_string();
    }
    if let Some(mode) = option_env!("BADGE_MODE").and_then(BadgeMode::parse) {
        config.mode = mode;
    }
    config.sanitize();
    config
}

/// Leaves the diagnostic on screen and idles; the badge is not ready.
fn halt(err: &StartupError) -> ! {
    warn!("badge not ready: {err}");
    loop {
        thread::sleep(Duration::from_secs(60));
    }
}

fn show(display: &mut impl Display, text: &str) {
    if let Err(err) = display.show_text(text) {
        warn!("display update failed: {err}");
    }
}

/// Sleeps in short slices so the task watchdog stays fed and a long Wi-Fi
/// outage still restarts the device.
#[derive(Default)]
struct WatchdogDelay {
    wifi_disconnected_since: Option<Instant>,
    startup: bool,
}

impl WatchdogDelay {
    fn startup() -> Self {
        Self {
            wifi_disconnected_since: None,
            startup: true,
        }
    }
}

impl Delay for WatchdogDelay {
    fn delay_ms(&mut self, ms: u64) {
        let mut remaining = ms;
        while remaining > 0 {
            let slice = remaining.min(WATCHDOG_SLICE_MS);
            thread::sleep(Duration::from_millis(slice));
            remaining -= slice;
            if !self.startup {
                feed_watchdog();
                maintain_wifi_health(&mut self.wifi_disconnected_since);
            }
        }
    }
}

struct WifiLink {
    wifi: BlockingWifi<EspWifi<'static>>,
}

impl NetworkLink for WifiLink {
    fn connect(&mut self, ssid: &str, password: Option<&str>) -> Result<(), DeviceError> {
        connect_wifi(&mut self.wifi, ssid, password)
            .map_err(|err| DeviceError::new("wifi", format!("{err:#}")))
    }
}

fn connect_wifi(
    wifi: &mut BlockingWifi<EspWifi<'static>>,
    ssid: &str,
    password: Option<&str>,
) -> anyhow::Result<()> {
    if ssid.is_empty() {
        return Err(anyhow!("wifi ssid not configured"));
    }

    let auth_method = if password.is_some() {
        AuthMethod::WPAWPA2Personal
    } else {
        AuthMethod::None
    };

    wifi.set_configuration(&Configuration::Client(ClientConfiguration {
        ssid: ssid.try_into().map_err(|_| anyhow!("wifi ssid too long"))?,
        password: password
            .unwrap_or_default()
            .try_into()
            .map_err(|_| anyhow!("wifi password too long"))?,
        auth_method,
        ..Default::default()
    }))?;

    wifi.start()?;
    info!("wifi started, connecting to `{ssid}`");

    let mut last_err = None;
    for attempt in 1..=WIFI_CONNECT_ATTEMPTS {
        info!("wifi connect attempt {attempt}/{WIFI_CONNECT_ATTEMPTS}");
        match wifi.connect() {
            Ok(()) => match wifi.wait_netif_up() {
                Ok(()) => {
                    info!("wifi connected and netif up on attempt {attempt}");
                    return Ok(());
                }
                Err(err) => {
                    warn!("wifi netif up failed on attempt {attempt}: {err:#}");
                    last_err = Some(err);
                }
            },
            Err(err) => {
                warn!("wifi connect failed on attempt {attempt}: {err:#}");
                last_err = Some(err);
            }
        }

        if attempt < WIFI_CONNECT_ATTEMPTS {
            let _ = wifi.disconnect();
            thread::sleep(Duration::from_millis(WIFI_RETRY_DELAY_MS));
        }
    }

    let _ = wifi.disconnect();
    let _ = wifi.stop();
    match last_err {
        Some(err) => Err(anyhow!(
            "all {WIFI_CONNECT_ATTEMPTS} wifi connect attempts failed; last error: {err:#}"
        )),
        None => Err(anyhow!("wifi never came up")),
    }
}

/// Opens a fresh `EspHttpConnection` for every request.
struct EspTransport {
    base_url: String,
    timeout: Duration,
}

impl EspTransport {
    fn new(server: &ServerConfig) -> Self {
        Self {
            base_url: server.base_url.clone(),
            timeout: Duration::from_millis(server.timeout_ms),
        }
    }
}

impl Transport for EspTransport {
    fn request(
        &mut self,
        method: Method,
        path: &str,
        body: Option<&str>,
    ) -> Result<Response, TransportError> {
        let url = join_url(&self.base_url, path);
        let connect_err = |message: String| TransportError::Connect {
            url: url.clone(),
            message,
        };

        let http_conf = HttpClientConfiguration {
            timeout: Some(self.timeout),
            ..Default::default()
        };
        let connection =
            EspHttpConnection::new(&http_conf).map_err(|err| connect_err(format!("{err:?}")))?;
        let mut client = HttpClient::wrap(connection);

        let content_length = body.map(|body| body.len().to_string());
        let mut headers = vec![("Connection", "close")];
        if let Some(length) = content_length.as_deref() {
            headers.push(("Content-Type", "application/json"));
            headers.push(("Content-Length", length));
        }

        let http_method = match method {
            Method::Get => HttpMethod::Get,
            Method::Post => HttpMethod::Post,
        };
        let mut request = client
            .request(http_method, &url, &headers)
            .map_err(|err| connect_err(format!("{err:?}")))?;
        if let Some(body) = body {
            request
                .write_all(body.as_bytes())
                .map_err(|err| connect_err(format!("{err:?}")))?;
            request
                .flush()
                .map_err(|err| connect_err(format!("{err:?}")))?;
        }

        let mut response = request
            .submit()
            .map_err(|err| connect_err(format!("{err:?}")))?;
        let status = response.status();

        let mut raw = Vec::new();
        let mut chunk = [0_u8; HTTP_CHUNK_SIZE];
        loop {
            let read = response.read(&mut chunk).map_err(|err| TransportError::Body {
                url: url.clone(),
                message: format!("{err:?}"),
            })?;
            if read == 0 {
                break;
            }
            if raw.len() + read > MAX_HTTP_BODY {
                return Err(TransportError::Body {
                    url: url.clone(),
                    message: format!("response exceeds {MAX_HTTP_BODY} bytes"),
                });
            }
            raw.extend_from_slice(&chunk[..read]);
        }

        Ok(Response {
            status,
            body: String::from_utf8_lossy(&raw).into_owned(),
        })
    }
}

struct OledScreen {
    display: OledDriver,
    last_frame: Vec<String>,
}

impl OledScreen {
    fn new(i2c: I2cDriver<'static>) -> anyhow::Result<Self> {
        let interface = I2CDisplayInterface::new(i2c);
        let mut display = Ssd1306::new(interface, DisplaySize128x64, DisplayRotation::Rotate0)
            .into_buffered_graphics_mode();
        display
            .init()
            .map_err(|err| anyhow!("failed to init SSD1306: {err:?}"))?;

        Ok(Self {
            display,
            last_frame: Vec::new(),
        })
    }

    fn draw(&mut self, lines: Vec<String>) -> Result<(), DeviceError> {
        if lines == self.last_frame {
            return Ok(());
        }

        let oled_err = |err| DeviceError::new("display", format!("{err:?}"));
        let style = MonoTextStyle::new(&FONT_6X10, BinaryColor::On);
        self.display.clear_buffer();
        for (row, line) in lines.iter().take(DISPLAY_LINES).enumerate() {
            Text::with_baseline(
                line,
                Point::new(0, row as i32 * LINE_HEIGHT),
                style,
                Baseline::Top,
            )
            .draw(&mut self.display)
            .map_err(oled_err)?;
        }
        self.display.flush().map_err(oled_err)?;

        self.last_frame = lines;
        Ok(())
    }
}

impl Display for OledScreen {
    fn show_text(&mut self, text: &str) -> Result<(), DeviceError> {
        self.draw(text.lines().map(str::to_string).collect())
    }

    fn show_info(
        &mut self,
        primary: &str,
        secondary: &str,
        secondary_visible: bool,
    ) -> Result<(), DeviceError> {
        let mut lines = vec!["Identifier".to_string(), primary.to_string()];
        if secondary_visible {
            lines.push("Password".to_string());
            lines.push(secondary.to_string());
        }
        self.draw(lines)
    }
}

/// Knob on ADC1, three buttons and two switches, all read active-high.
struct BadgeInputs {
    knob: AdcChannelDriver<'static, Gpio1, AdcDriver<'static, ADC1>>,
    buttons: [PinDriver<'static, AnyIOPin, Input>; 3],
    switches: [PinDriver<'static, AnyIOPin, Input>; 2],
    last_knob: u8,
}

impl BadgeInputs {
    fn new(
        adc: ADC1,
        knob_pin: Gpio1,
        buttons: [AnyIOPin; 3],
        switches: [AnyIOPin; 2],
    ) -> anyhow::Result<Self> {
        let adc = AdcDriver::new(adc).context("failed to init ADC1")?;
        let knob_config = AdcChannelConfig {
            attenuation: DB_11,
            ..Default::default()
        };
        let knob = AdcChannelDriver::new(adc, knob_pin, &knob_config)
            .context("failed to attach knob ADC channel")?;

        let [b1, b2, b3] = buttons;
        let [s1, s2] = switches;
        Ok(Self {
            knob,
            buttons: [input_pin(b1)?, input_pin(b2)?, input_pin(b3)?],
            switches: [input_pin(s1)?, input_pin(s2)?],
            last_knob: 0,
        })
    }
}

fn input_pin(pin: AnyIOPin) -> anyhow::Result<PinDriver<'static, AnyIOPin, Input>> {
    let mut driver = PinDriver::input(pin)?;
    driver.set_pull(Pull::Down)?;
    Ok(driver)
}

impl InputSource for BadgeInputs {
    fn knob_percent(&mut self) -> u8 {
        match self.knob.read_raw() {
            Ok(raw) => {
                let scaled = u32::from(raw.min(KNOB_ADC_MAX)) * 100 / u32::from(KNOB_ADC_MAX);
                self.last_knob = scaled as u8;
            }
            Err(err) => warn!("knob read failed: {err}"),
        }
        self.last_knob
    }

    fn button_pressed(&mut self, index: u8) -> bool {
        usize::from(index)
            .checked_sub(1)
            .and_then(|slot| self.buttons.get(slot))
            .is_some_and(|pin| pin.is_high())
    }

    fn switch_on(&mut self, index: u8) -> bool {
        usize::from(index)
            .checked_sub(1)
            .and_then(|slot| self.switches.get(slot))
            .is_some_and(|pin| pin.is_high())
    }
}

fn init_watchdog(timeout_sec: u32) -> anyhow::Result<()> {
    let config = esp_idf_svc::sys::esp_task_wdt_config_t {
        timeout_ms: timeout_sec.saturating_mul(1000),
        idle_core_mask: 0,
        trigger_panic: true,
    };
    let rc = unsafe { esp_idf_svc::sys::esp_task_wdt_init(&config) };
    if rc == esp_idf_svc::sys::ESP_OK || rc == esp_idf_svc::sys::ESP_ERR_INVALID_STATE {
        return Ok(());
    }
    Err(anyhow!("esp_task_wdt_init failed with code {}", rc))
}

fn add_current_task_to_watchdog() -> anyhow::Result<()> {
    let rc = unsafe { esp_idf_svc::sys::esp_task_wdt_add(core::ptr::null_mut()) };
    if rc == esp_idf_svc::sys::ESP_OK || rc == esp_idf_svc::sys::ESP_ERR_INVALID_STATE {
        return Ok(());
    }
    Err(anyhow!("esp_task_wdt_add failed with code {}", rc))
}

fn feed_watchdog() {
    let _ = unsafe { esp_idf_svc::sys::esp_task_wdt_reset() };
}

fn disable_wifi_power_save() {
    let rc = unsafe { esp_idf_svc::sys::esp_wifi_set_ps(0) };
    if rc == esp_idf_svc::sys::ESP_OK {
        info!("wifi power save disabled");
    } else {
        warn!("failed to disable wifi power save: esp_err_t={rc}");
    }
}

fn is_wifi_station_connected() -> bool {
    let mut ap_info = esp_idf_svc::sys::wifi_ap_record_t::default();
    let rc = unsafe { esp_idf_svc::sys::esp_wifi_sta_get_ap_info(&mut ap_info) };
    rc == esp_idf_svc::sys::ESP_OK
}

fn maintain_wifi_health(wifi_disconnected_since: &mut Option<Instant>) {
    if is_wifi_station_connected() {
        *wifi_disconnected_since = None;
        return;
    }

    match wifi_disconnected_since {
        Some(disconnected_since)
            if disconnected_since.elapsed().as_millis() as u64 >= WIFI_RESTART_GRACE_MS =>
        {
            warn!(
                "wifi disconnected for {}s; restarting badge",
                WIFI_RESTART_GRACE_MS / 1000
            );
            thread::sleep(Duration::from_millis(100));
            unsafe { esp_idf_svc::sys::esp_restart() };
        }
        Some(_) => {}
        None => *wifi_disconnected_since = Some(Instant::now()),
    }
}
