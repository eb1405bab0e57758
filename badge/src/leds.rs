use std::time::Duration;

use anyhow::Context;
use esp_idf_hal::{
    gpio::OutputPin,
    peripheral::Peripheral,
    rmt::{config::TransmitConfig, PinState, Pulse, RmtChannel, TxRmtDriver, VariableLengthSignal},
};

use badge_common::{DeviceError, LedStrip};

const T0H_NS: u64 = 350;
const T0L_NS: u64 = 800;
const T1H_NS: u64 = 700;
const T1L_NS: u64 = 600;
const BITS_PER_LED: usize = 24;

/// WS2812 chain driven over an RMT channel, every LED set to the same color.
pub struct LedChain {
    tx: TxRmtDriver<'static>,
    count: usize,
    zero: (Pulse, Pulse),
    one: (Pulse, Pulse),
}

impl LedChain {
    pub fn new<C, P>(
        channel: impl Peripheral<P = C> + 'static,
        pin: impl Peripheral<P = P> + 'static,
        count: usize,
    ) -> anyhow::Result<Self>
    where
        C: RmtChannel,
        P: OutputPin,
    {
        let config = TransmitConfig::new().clock_divider(1);
        let tx = TxRmtDriver::new(channel, pin, &config).context("failed to init RMT LED driver")?;
        let ticks_hz = tx.counter_clock()?;

        let pulse = |state: PinState, ns: u64| {
            Pulse::new_with_duration(ticks_hz, state, &Duration::from_nanos(ns))
                .context("invalid WS2812 pulse timing")
        };
        let zero = (pulse(PinState::High, T0H_NS)?, pulse(PinState::Low, T0L_NS)?);
        let one = (pulse(PinState::High, T1H_NS)?, pulse(PinState::Low, T1L_NS)?);

        Ok(Self {
            tx,
            count,
            zero,
            one,
        })
    }

    fn write_all(&mut self, r: u8, g: u8, b: u8) -> anyhow::Result<()> {
        // WS2812 expects GRB, most significant bit first.
        let grb = (u32::from(g) << 16) | (u32::from(r) << 8) | u32::from(b);

        let mut signal = VariableLengthSignal::with_capacity(self.count * BITS_PER_LED * 2);
        for _ in 0..self.count {
            for bit in (0..BITS_PER_LED).rev() {
                let (high, low) = if grb & (1 << bit) != 0 {
                    &self.one
                } else {
                    &self.zero
                };
                signal
                    .push([high, low])
                    .context("failed to encode LED frame")?;
            }
        }

        self.tx
            .start_blocking(&signal)
            .context("failed to transmit LED frame over RMT")?;
        Ok(())
    }
}

impl LedStrip for LedChain {
    fn set_all(&mut self, r: u8, g: u8, b: u8) -> Result<(), DeviceError> {
        self.write_all(r, g, b)
            .map_err(|err| DeviceError::new("leds", format!("{err:#}")))
    }
}
