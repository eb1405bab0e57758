use std::collections::VecDeque;

use crate::{
    devices::{Audio, Delay, Display, Devices, InputSource, LedStrip, NetworkLink},
    error::{DeviceError, TransportError},
    transport::{Method, Response, Transport},
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedRequest {
    pub method: Method,
    pub path: String,
    pub body: Option<String>,
}

/// Replays queued replies in order, then `fallback` forever.
pub struct ScriptedTransport {
    replies: VecDeque<Result<Response, TransportError>>,
    fallback: Result<Response, TransportError>,
    pub requests: Vec<RecordedRequest>,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self {
            replies: VecDeque::new(),
            fallback: Ok(ok(204, "")),
            requests: Vec::new(),
        }
    }

    pub fn always(reply: Result<Response, TransportError>) -> Self {
        Self {
            fallback: reply,
            ..Self::new()
        }
    }

    pub fn reply(mut self, reply: Result<Response, TransportError>) -> Self {
        self.replies.push_back(reply);
        self
    }

    pub fn paths(&self) -> Vec<&str> {
        self.requests
            .iter()
            .map(|request| request.path.as_str())
            .collect()
    }
}

impl Transport for ScriptedTransport {
    fn request(
        &mut self,
        method: Method,
        path: &str,
        body: Option<&str>,
    ) -> Result<Response, TransportError> {
        self.requests.push(RecordedRequest {
            method,
            path: path.to_string(),
            body: body.map(str::to_string),
        });
        self.replies
            .pop_front()
            .unwrap_or_else(|| self.fallback.clone())
    }
}

pub fn ok(status: u16, body: &str) -> Response {
    Response {
        status,
        body: body.to_string(),
    }
}

pub fn refused() -> TransportError {
    TransportError::Connect {
        url: "http://test/".to_string(),
        message: "connection refused".to_string(),
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceCall {
    SetAll(u8, u8, u8),
    ShowText(String),
    ShowInfo(String, String, bool),
    Stop,
    Play(String),
}

#[derive(Default)]
pub struct RecordingLeds {
    pub calls: Vec<DeviceCall>,
    pub fail: bool,
}

impl LedStrip for RecordingLeds {
    fn set_all(&mut self, r: u8, g: u8, b: u8) -> Result<(), DeviceError> {
        if self.fail {
            return Err(DeviceError::new("leds", "strip not responding"));
        }
        self.calls.push(DeviceCall::SetAll(r, g, b));
        Ok(())
    }
}

#[derive(Default)]
pub struct RecordingDisplay {
    pub calls: Vec<DeviceCall>,
}

impl Display for RecordingDisplay {
    fn show_text(&mut self, text: &str) -> Result<(), DeviceError> {
        self.calls.push(DeviceCall::ShowText(text.to_string()));
        Ok(())
    }

    fn show_info(
        &mut self,
        primary: &str,
        secondary: &str,
        secondary_visible: bool,
    ) -> Result<(), DeviceError> {
        self.calls.push(DeviceCall::ShowInfo(
            primary.to_string(),
            secondary.to_string(),
            secondary_visible,
        ));
        Ok(())
    }
}

#[derive(Default)]
pub struct RecordingAudio {
    pub calls: Vec<DeviceCall>,
    pub serviced: u32,
}

impl Audio for RecordingAudio {
    fn stop(&mut self) -> Result<(), DeviceError> {
        self.calls.push(DeviceCall::Stop);
        Ok(())
    }

    fn play(&mut self, asset: &str) -> Result<(), DeviceError> {
        self.calls.push(DeviceCall::Play(asset.to_string()));
        Ok(())
    }

    fn service(&mut self) {
        self.serviced += 1;
    }
}

pub type RecordingDevices = Devices<RecordingLeds, RecordingDisplay, RecordingAudio>;

pub fn recording_devices() -> RecordingDevices {
    Devices::new(
        RecordingLeds::default(),
        RecordingDisplay::default(),
        RecordingAudio::default(),
    )
}

#[derive(Default)]
pub struct RecordingDelay {
    pub delays: Vec<u64>,
}

impl Delay for RecordingDelay {
    fn delay_ms(&mut self, ms: u64) {
        self.delays.push(ms);
    }
}

/// Input levels the test sets directly between ticks.
#[derive(Debug, Default, Clone)]
pub struct FakeInputs {
    pub knob: u8,
    pub buttons: [bool; 3],
    pub switches: [bool; 2],
}

impl InputSource for FakeInputs {
    fn knob_percent(&mut self) -> u8 {
        self.knob
    }

    fn button_pressed(&mut self, index: u8) -> bool {
        self.buttons[usize::from(index - 1)]
    }

    fn switch_on(&mut self, index: u8) -> bool {
        self.switches[usize::from(index - 1)]
    }
}

#[derive(Default)]
pub struct FakeLink {
    pub joined: Vec<(String, Option<String>)>,
    pub fail: bool,
}

impl NetworkLink for FakeLink {
    fn connect(&mut self, ssid: &str, password: Option<&str>) -> Result<(), DeviceError> {
        self.joined
            .push((ssid.to_string(), password.map(str::to_string)));
        if self.fail {
            return Err(DeviceError::new("wifi", "association timed out"));
        }
        Ok(())
    }
}
