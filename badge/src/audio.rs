use std::{
    sync::mpsc::{self, Receiver, RecvTimeoutError, Sender},
    thread,
    time::Duration,
};

use anyhow::{anyhow, Context};
use esp_idf_hal::{
    gpio::AnyOutputPin,
    ledc::{config::TimerConfig, LedcDriver, LedcTimerDriver, CHANNEL0, TIMER0},
    units::FromValueType,
};
use log::{info, warn};

use badge_common::{Audio, DeviceError, RICKROLL_ASSET};

#[derive(Debug, Clone, Copy)]
struct Note {
    hz: u32,
    ms: u64,
}

const fn note(hz: u32, ms: u64) -> Note {
    Note { hz, ms }
}

const A4: u32 = 440;
const B4: u32 = 494;
const CS5: u32 = 554;
const D5: u32 = 587;
const E5: u32 = 659;
const FS5: u32 = 740;
const REST: u32 = 0;

#[rustfmt::skip]
const RICKROLL: &[Note] = &[
    note(A4, 150), note(B4, 150), note(D5, 150), note(B4, 150),
    note(FS5, 450), note(FS5, 450), note(E5, 900), note(REST, 150),
    note(A4, 150), note(B4, 150), note(D5, 150), note(B4, 150),
    note(E5, 450), note(E5, 450), note(D5, 450), note(CS5, 150), note(B4, 300), note(REST, 150),
    note(A4, 150), note(B4, 150), note(D5, 150), note(B4, 150),
    note(D5, 600), note(E5, 300), note(CS5, 450), note(A4, 150), note(A4, 300),
    note(E5, 600), note(D5, 900),
];

enum Playback {
    Play(&'static str, &'static [Note]),
    Stop,
}

/// Piezo speaker on an LEDC channel. Melodies play on a dedicated thread so
/// `play` returns immediately.
pub struct Speaker {
    tx: Sender<Playback>,
}

impl Speaker {
    pub fn new(channel: CHANNEL0, timer: TIMER0, pin: AnyOutputPin) -> anyhow::Result<Self> {
        let (tx, rx) = mpsc::channel();

        thread::Builder::new()
            .name("audio".to_string())
            .stack_size(4096)
            .spawn(move || {
                let timer_config = TimerConfig::new().frequency(A4.Hz().into());
                let timer = match LedcTimerDriver::new(timer, &timer_config) {
                    Ok(timer) => timer,
                    Err(err) => {
                        warn!("speaker timer unavailable: {err}");
                        return;
                    }
                };
                match LedcDriver::new(channel, &timer, pin) {
                    Ok(driver) => playback_loop(driver, rx),
                    Err(err) => warn!("speaker channel unavailable: {err}"),
                }
            })
            .context("failed to spawn audio thread")?;

        Ok(Self { tx })
    }

    fn send(&self, playback: Playback) -> Result<(), DeviceError> {
        self.tx
            .send(playback)
            .map_err(|_| DeviceError::new("audio", "playback thread stopped"))
    }
}

impl Audio for Speaker {
    fn stop(&mut self) -> Result<(), DeviceError> {
        self.send(Playback::Stop)
    }

    fn play(&mut self, asset: &str) -> Result<(), DeviceError> {
        let melody = melody(asset)
            .ok_or_else(|| DeviceError::new("audio", format!("unknown asset `{asset}`")))?;
        self.send(Playback::Play(RICKROLL_ASSET, melody))
    }
}

fn melody(asset: &str) -> Option<&'static [Note]> {
    match asset {
        RICKROLL_ASSET => Some(RICKROLL),
        _ => None,
    }
}

fn playback_loop(mut driver: LedcDriver<'_>, rx: Receiver<Playback>) {
    let mut current: Option<(&'static str, &'static [Note], usize)> = None;

    loop {
        let Some((asset, notes, index)) = current else {
            match rx.recv() {
                Ok(Playback::Play(asset, notes)) => {
                    info!("playing `{asset}`");
                    current = Some((asset, notes, 0));
                }
                Ok(Playback::Stop) => {}
                Err(_) => return,
            }
            continue;
        };

        let Some(next) = notes.get(index) else {
            silence(&mut driver);
            info!("finished `{asset}`");
            current = None;
            continue;
        };

        if let Err(err) = sound(&mut driver, next.hz) {
            warn!("speaker update failed: {err:#}");
        }
        current = Some((asset, notes, index + 1));

        match rx.recv_timeout(Duration::from_millis(next.ms)) {
            Ok(Playback::Stop) => {
                silence(&mut driver);
                current = None;
            }
            Ok(Playback::Play(asset, notes)) => current = Some((asset, notes, 0)),
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => {
                silence(&mut driver);
                return;
            }
        }
    }
}

fn sound(driver: &mut LedcDriver<'_>, hz: u32) -> anyhow::Result<()> {
    if hz == REST {
        driver.set_duty(0)?;
        return Ok(());
    }

    let rc = unsafe {
        esp_idf_svc::sys::ledc_set_freq(
            esp_idf_svc::sys::ledc_mode_t_LEDC_LOW_SPEED_MODE,
            esp_idf_svc::sys::ledc_timer_t_LEDC_TIMER_0,
            hz,
        )
    };
    if rc != esp_idf_svc::sys::ESP_OK {
        return Err(anyhow!("ledc_set_freq({hz}) failed with code {rc}"));
    }
    driver.set_duty(driver.get_max_duty() / 2)?;
    Ok(())
}

fn silence(driver: &mut LedcDriver<'_>) {
    if let Err(err) = driver.set_duty(0) {
        warn!("failed to silence speaker: {err}");
    }
}
