use std::{thread, time::Duration};

use crate::error::DeviceError;

pub trait LedStrip {
    fn set_all(&mut self, r: u8, g: u8, b: u8) -> Result<(), DeviceError>;
}

pub trait Display {
    fn show_text(&mut self, text: &str) -> Result<(), DeviceError>;

    /// Two-line info screen; the secondary line is drawn only when visible.
    fn show_info(
        &mut self,
        primary: &str,
        secondary: &str,
        secondary_visible: bool,
    ) -> Result<(), DeviceError>;
}

pub trait Audio {
    fn stop(&mut self) -> Result<(), DeviceError>;

    fn play(&mut self, asset: &str) -> Result<(), DeviceError>;

    /// Advances playback; called once per loop iteration.
    fn service(&mut self) {}
}

pub trait InputSource {
    /// Knob position scaled to 0..=100.
    fn knob_percent(&mut self) -> u8;

    /// `index` is 1-based (1..=3).
    fn button_pressed(&mut self, index: u8) -> bool;

    /// `index` is 1-based (1..=2).
    fn switch_on(&mut self, index: u8) -> bool;
}

pub trait NetworkLink {
    /// Blocks until associated or the driver gives up.
    fn connect(&mut self, ssid: &str, password: Option<&str>) -> Result<(), DeviceError>;
}

pub trait Delay {
    fn delay_ms(&mut self, ms: u64);
}

impl<D: Delay + ?Sized> Delay for &mut D {
    fn delay_ms(&mut self, ms: u64) {
        (**self).delay_ms(ms);
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct ThreadDelay;

impl Delay for ThreadDelay {
    fn delay_ms(&mut self, ms: u64) {
        thread::sleep(Duration::from_millis(ms));
    }
}

/// Output peripherals the command executor drives.
pub struct Devices<L, D, A> {
    pub leds: L,
    pub display: D,
    pub audio: A,
}

impl<L, D, A> Devices<L, D, A>
where
    L: LedStrip,
    D: Display,
    A: Audio,
{
    pub fn new(leds: L, display: D, audio: A) -> Self {
        Self {
            leds,
            display,
            audio,
        }
    }
}
