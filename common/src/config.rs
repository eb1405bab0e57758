use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BadgeMode {
    Commands,
    Events,
}

impl BadgeMode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Commands => "commands",
            Self::Events => "events",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "commands" | "command" | "poll" => Some(Self::Commands),
            "events" | "event" | "report" => Some(Self::Events),
            _ => None,
        }
    }
}

/// Which field pair `get_credentials` must return before the badge is operational.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CredentialScheme {
    Identifier,
    IpAddress,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub base_url: String,
    pub timeout_ms: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            base_url: "http://192.168.1.100:5000".to_string(),
            timeout_ms: 10_000,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NetworkConfig {
    pub wifi_ssid: String,
    pub wifi_pass: String,
}

impl NetworkConfig {
    pub fn password(&self) -> Option<&str> {
        if self.wifi_pass.is_empty() {
            None
        } else {
            Some(self.wifi_pass.as_str())
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BootstrapConfig {
    pub max_attempts: u32,
    pub retry_delay_ms: u64,
}

impl Default for BootstrapConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            retry_delay_ms: 5_000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PollConfig {
    pub interval_ms: u64,
    pub confirm: bool,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            interval_ms: 2_000,
            confirm: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReporterConfig {
    pub interval_ms: u64,
}

impl Default for ReporterConfig {
    fn default() -> Self {
        Self { interval_ms: 50 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BadgeConfig {
    pub mode: BadgeMode,
    pub server: ServerConfig,
    #[serde(default)]
    pub network: NetworkConfig,
    pub credentials: CredentialScheme,
    #[serde(default)]
    pub bootstrap: BootstrapConfig,
    #[serde(default)]
    pub poll: PollConfig,
    #[serde(default)]
    pub reporter: ReporterConfig,
}

impl Default for BadgeConfig {
    fn default() -> Self {
        Self {
            mode: BadgeMode::Commands,
            server: ServerConfig::default(),
            network: NetworkConfig::default(),
            credentials: CredentialScheme::Identifier,
            bootstrap: BootstrapConfig::default(),
            poll: PollConfig::default(),
            reporter: ReporterConfig::default(),
        }
    }
}

impl BadgeConfig {
    pub fn sanitize(&mut self) {
        self.server.sanitize();
        self.bootstrap.max_attempts = self.bootstrap.max_attempts.clamp(1, 20);
        self.bootstrap.retry_delay_ms = self.bootstrap.retry_delay_ms.min(60_000);
        self.poll.interval_ms = self.poll.interval_ms.clamp(100, 60_000);
        self.reporter.interval_ms = self.reporter.interval_ms.clamp(10, 5_000);
    }
}

impl ServerConfig {
    pub fn sanitize(&mut self) {
        let trimmed = self.base_url.trim().trim_end_matches('/');
        self.base_url = trimmed.to_string();
        self.timeout_ms = self.timeout_ms.clamp(1_000, 60_000);
    }
}
