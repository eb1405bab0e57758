use log::{info, warn};
use serde::Serialize;

use crate::{
    config::ReporterConfig,
    devices::{Delay, InputSource},
    endpoints::{ENDPOINT_BUTTON, ENDPOINT_KNOB, ENDPOINT_SWITCH},
    transport::Transport,
};

pub const BUTTON_COUNT: u8 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SwitchState {
    Off,
    Switch1,
    Switch2,
    Both,
}

impl SwitchState {
    pub fn from_levels(switch1: bool, switch2: bool) -> Self {
        match (switch1, switch2) {
            (true, true) => Self::Both,
            (_, true) => Self::Switch2,
            (true, _) => Self::Switch1,
            _ => Self::Off,
        }
    }

    pub fn describe(self) -> &'static str {
        match self {
            Self::Off => "Both switches off",
            Self::Switch1 => "Switch 1 on",
            Self::Switch2 => "Switch 2 on",
            Self::Both => "Both switches on",
        }
    }
}

/// Raw input levels read in a single tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InputSample {
    pub knob_percent: u8,
    pub buttons: [bool; BUTTON_COUNT as usize],
    pub switch: SwitchState,
}

impl InputSample {
    pub fn read(inputs: &mut impl InputSource) -> Self {
        let mut buttons = [false; BUTTON_COUNT as usize];
        for (slot, index) in buttons.iter_mut().zip(1..=BUTTON_COUNT) {
            *slot = inputs.button_pressed(index);
        }

        Self {
            knob_percent: inputs.knob_percent().min(100),
            buttons,
            switch: SwitchState::from_levels(inputs.switch_on(1), inputs.switch_on(2)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputEvent {
    Knob(u8),
    ButtonPressed(u8),
    NothingPressed,
    Switch(SwitchState),
}

impl InputEvent {
    pub fn endpoint(self) -> &'static str {
        match self {
            Self::Knob(_) => ENDPOINT_KNOB,
            Self::ButtonPressed(_) | Self::NothingPressed => ENDPOINT_BUTTON,
            Self::Switch(_) => ENDPOINT_SWITCH,
        }
    }

    pub fn describe(self) -> String {
        match self {
            Self::Knob(percent) => format!("Knob at {percent}%"),
            Self::ButtonPressed(index) => format!("Button {index} pressed"),
            Self::NothingPressed => "Nothing pressed".to_string(),
            Self::Switch(state) => state.describe().to_string(),
        }
    }
}

#[derive(Debug, Serialize)]
struct EventBody {
    data: String,
}

/// Last-reported input state. Emits events on transitions only.
#[derive(Debug, Clone)]
pub struct InputTracker {
    knob_percent: u8,
    held: [bool; BUTTON_COUNT as usize],
    active_button: Option<u8>,
    switch: SwitchState,
}

impl InputTracker {
    /// Primes the knob with its startup value; buttons and switches start released/off.
    pub fn new(initial_knob_percent: u8) -> Self {
        Self {
            knob_percent: initial_knob_percent.min(100),
            held: [false; BUTTON_COUNT as usize],
            active_button: None,
            switch: SwitchState::Off,
        }
    }

    pub fn active_button(&self) -> Option<u8> {
        self.active_button
    }

    pub fn observe(&mut self, sample: &InputSample) -> Vec<InputEvent> {
        let mut events = Vec::new();

        if sample.knob_percent != self.knob_percent {
            self.knob_percent = sample.knob_percent;
            events.push(InputEvent::Knob(sample.knob_percent));
        }

        let buttons = self.held.iter_mut().zip(sample.buttons);
        for (index, (held, pressed)) in (1..=BUTTON_COUNT).zip(buttons) {
            if pressed && !*held {
                events.push(InputEvent::ButtonPressed(index));
                self.active_button = Some(index);
            }
            *held = pressed;
        }

        let any_pressed = sample.buttons.iter().any(|pressed| *pressed);
        if !any_pressed && self.active_button.take().is_some() {
            events.push(InputEvent::NothingPressed);
        }

        if sample.switch != self.switch {
            self.switch = sample.switch;
            events.push(InputEvent::Switch(sample.switch));
        }

        events
    }
}

/// Pushes input transitions to the server, one POST per event.
pub struct EventReporter<T> {
    transport: T,
    tracker: InputTracker,
    config: ReporterConfig,
}

impl<T: Transport> EventReporter<T> {
    pub fn new(transport: T, tracker: InputTracker, config: ReporterConfig) -> Self {
        Self {
            transport,
            tracker,
            config,
        }
    }

    pub fn tracker(&self) -> &InputTracker {
        &self.tracker
    }

    pub fn tick(&mut self, inputs: &mut impl InputSource) -> Vec<InputEvent> {
        let sample = InputSample::read(inputs);
        let events = self.tracker.observe(&sample);
        for event in &events {
            self.send(*event);
        }
        events
    }

    pub fn run<W: Delay>(
        &mut self,
        inputs: &mut impl InputSource,
        mut delay: W,
        mut keep_running: impl FnMut(u64, &[InputEvent]) -> bool,
    ) {
        let mut tick: u64 = 0;
        loop {
            tick = tick.saturating_add(1);
            let events = self.tick(inputs);
            if !keep_running(tick, &events) {
                return;
            }
            delay.delay_ms(self.config.interval_ms);
        }
    }

    fn send(&mut self, event: InputEvent) {
        let body = EventBody {
            data: event.describe(),
        };
        let payload = match serde_json::to_string(&body) {
            Ok(payload) => payload,
            Err(err) => {
                warn!("failed to encode input event: {err}");
                return;
            }
        };

        info!("reporting `{}` to /{}", body.data, event.endpoint());
        match self.transport.post_json(event.endpoint(), &payload) {
            Ok(response) if response.is_success() => {}
            Ok(response) => warn!(
                "/{} rejected input event with HTTP {}",
                event.endpoint(),
                response.status
            ),
            Err(err) => warn!("failed to report input event: {err}"),
        }
    }
}
