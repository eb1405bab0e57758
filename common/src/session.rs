use crate::{config::CredentialScheme, credentials::Credentials};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DisplayState {
    pub identifier_or_ip: String,
    pub password: String,
    pub visible: bool,
}

/// Loop-owned runtime state: the acquired credentials and what the display shows.
#[derive(Debug, Clone)]
pub struct Session {
    credentials: Credentials,
    display: DisplayState,
}

impl Session {
    pub fn new(credentials: Credentials, scheme: CredentialScheme) -> Self {
        let display = DisplayState {
            identifier_or_ip: credentials.display_name(scheme).to_string(),
            password: credentials.password.clone(),
            visible: false,
        };
        Self {
            credentials,
            display,
        }
    }

    pub fn credentials(&self) -> &Credentials {
        &self.credentials
    }

    pub fn display(&self) -> &DisplayState {
        &self.display
    }

    pub fn password(&self) -> &str {
        &self.credentials.password
    }

    pub fn set_password(&mut self, password: &str) -> bool {
        if self.credentials.password == password {
            return false;
        }
        self.credentials.password = password.to_string();
        self.display.password = password.to_string();
        true
    }

    /// Returns whether the flag actually changed.
    pub fn set_password_visible(&mut self, visible: bool) -> bool {
        let changed = self.display.visible != visible;
        self.display.visible = visible;
        changed
    }
}
