use std::collections::VecDeque;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;
use sha2::{Digest, Sha256};
use thiserror::Error;

use badge_common::{Command, CredentialScheme, Credentials};

pub const EVENT_HISTORY: usize = 100;
pub const CONFIRMATION_HISTORY: usize = 100;
const PASSWORD_HEX_LEN: usize = 16;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    #[error("unrecognized command `{0}`")]
    UnrecognizedCommand(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum InputKind {
    Knob,
    Button,
    Switch,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EventRecord {
    pub kind: InputKind,
    pub data: serde_json::Value,
    pub received_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConfirmationRecord {
    pub command: String,
    pub confirmed_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct StatusView {
    pub identifier: String,
    pub scheme: CredentialScheme,
    pub provisioned: bool,
    #[serde(rename = "queuedCommands")]
    pub queued_commands: usize,
    #[serde(rename = "lastSeen")]
    pub last_seen: Option<DateTime<Utc>>,
    #[serde(rename = "lastConfirmation")]
    pub last_confirmation: Option<ConfirmationRecord>,
    #[serde(rename = "eventCount")]
    pub event_count: usize,
}

/// Everything the server knows about the single badge it serves.
#[derive(Debug)]
pub struct BadgeRegistry {
    identifier: String,
    scheme: CredentialScheme,
    credentials: Option<Credentials>,
    queue: VecDeque<Command>,
    confirmations: VecDeque<ConfirmationRecord>,
    events: VecDeque<EventRecord>,
    last_seen: Option<DateTime<Utc>>,
}

impl BadgeRegistry {
    pub fn new(identifier: impl Into<String>, scheme: CredentialScheme) -> Self {
        Self {
            identifier: identifier.into(),
            scheme,
            credentials: None,
            queue: VecDeque::new(),
            confirmations: VecDeque::new(),
            events: VecDeque::new(),
            last_seen: None,
        }
    }

    /// Issues a fresh password; re-provisioning replaces the previous one.
    pub fn provision(&mut self, now: DateTime<Utc>) -> &Credentials {
        let password = issue_password(&self.identifier, now);
        let credentials = match self.scheme {
            CredentialScheme::Identifier => Credentials {
                identifier: self.identifier.clone(),
                ip_address: String::new(),
                password,
            },
            CredentialScheme::IpAddress => Credentials {
                identifier: String::new(),
                ip_address: self.identifier.clone(),
                password,
            },
        };
        self.credentials.insert(credentials)
    }

    pub fn credentials(&self) -> Option<&Credentials> {
        self.credentials.as_ref()
    }

    /// Returns the new queue length.
    pub fn enqueue(&mut self, command: Command) -> Result<usize, RegistryError> {
        if !command.is_recognized() {
            return Err(RegistryError::UnrecognizedCommand(command.name().to_string()));
        }
        self.queue.push_back(command);
        Ok(self.queue.len())
    }

    /// Oldest queued command, if any. Every poll counts as contact.
    pub fn next_command(&mut self, now: DateTime<Utc>) -> Option<Command> {
        self.last_seen = Some(now);
        self.queue.pop_front()
    }

    pub fn confirm(&mut self, command: &str, now: DateTime<Utc>) {
        self.last_seen = Some(now);
        push_bounded(
            &mut self.confirmations,
            ConfirmationRecord {
                command: command.to_string(),
                confirmed_at: now,
            },
            CONFIRMATION_HISTORY,
        );
    }

    pub fn record_event(&mut self, kind: InputKind, data: serde_json::Value, now: DateTime<Utc>) {
        self.last_seen = Some(now);
        push_bounded(
            &mut self.events,
            EventRecord {
                kind,
                data,
                received_at: now,
            },
            EVENT_HISTORY,
        );
    }

    /// Newest first.
    pub fn events(&self) -> Vec<EventRecord> {
        self.events.iter().rev().cloned().collect()
    }

    pub fn confirmations(&self) -> Vec<ConfirmationRecord> {
        self.confirmations.iter().rev().cloned().collect()
    }

    pub fn status(&self) -> StatusView {
        StatusView {
            identifier: self.identifier.clone(),
            scheme: self.scheme,
            provisioned: self.credentials.is_some(),
            queued_commands: self.queue.len(),
            last_seen: self.last_seen,
            last_confirmation: self.confirmations.back().cloned(),
            event_count: self.events.len(),
        }
    }
}

fn push_bounded<T>(history: &mut VecDeque<T>, item: T, limit: usize) {
    if history.len() == limit {
        history.pop_front();
    }
    history.push_back(item);
}

fn issue_password(identifier: &str, issued_at: DateTime<Utc>) -> String {
    let stamp = issued_at.to_rfc3339_opts(SecondsFormat::Micros, true);
    let digest = Sha256::digest(format!("{identifier}{stamp}").as_bytes());
    let mut hex = format!("{digest:x}");
    hex.truncate(PASSWORD_HEX_LEN);
    hex
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;
    use pretty_assertions::assert_eq;

    use super::*;

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
    }

    #[test]
    fn unprovisioned_registry_has_no_credentials() {
        let registry = BadgeRegistry::new("badge-1", CredentialScheme::Identifier);
        assert!(registry.credentials().is_none());
        assert!(!registry.status().provisioned);
    }

    #[test]
    fn provisioning_issues_short_hex_password() {
        let mut registry = BadgeRegistry::new("badge-1", CredentialScheme::Identifier);
        let credentials = registry.provision(at(0)).clone();

        assert_eq!(credentials.identifier, "badge-1");
        assert!(credentials.ip_address.is_empty());
        assert_eq!(credentials.password.len(), PASSWORD_HEX_LEN);
        assert!(credentials.password.chars().all(|c| c.is_ascii_hexdigit()));

        let reissued = registry.provision(at(1)).clone();
        assert_ne!(reissued.password, credentials.password);
    }

    #[test]
    fn ip_scheme_fills_ip_address() {
        let mut registry = BadgeRegistry::new("10.0.0.7", CredentialScheme::IpAddress);
        let credentials = registry.provision(at(0));

        assert_eq!(credentials.ip_address, "10.0.0.7");
        assert!(credentials.identifier.is_empty());
    }

    #[test]
    fn commands_are_served_oldest_first() {
        let mut registry = BadgeRegistry::new("badge-1", CredentialScheme::Identifier);
        registry
            .enqueue(Command::ChangeLedColor { r: 1, g: 2, b: 3 })
            .unwrap();
        assert_eq!(registry.enqueue(Command::Rickroll), Ok(2));

        assert_eq!(
            registry.next_command(at(5)),
            Some(Command::ChangeLedColor { r: 1, g: 2, b: 3 })
        );
        assert_eq!(registry.next_command(at(6)), Some(Command::Rickroll));
        assert_eq!(registry.next_command(at(7)), None);
        assert_eq!(registry.status().last_seen, Some(at(7)));
    }

    #[test]
    fn unrecognized_commands_are_rejected() {
        let mut registry = BadgeRegistry::new("badge-1", CredentialScheme::Identifier);
        let err = registry
            .enqueue(Command::Unrecognized {
                name: "self_destruct".to_string(),
            })
            .unwrap_err();

        assert_eq!(
            err,
            RegistryError::UnrecognizedCommand("self_destruct".to_string())
        );
        assert_eq!(registry.status().queued_commands, 0);
    }

    #[test]
    fn event_history_is_bounded_and_newest_first() {
        let mut registry = BadgeRegistry::new("badge-1", CredentialScheme::Identifier);
        for i in 0..(EVENT_HISTORY as i64 + 5) {
            let data = serde_json::json!(format!("Knob at {i}%"));
            registry.record_event(InputKind::Knob, data, at(i));
        }

        let events = registry.events();
        assert_eq!(events.len(), EVENT_HISTORY);
        assert_eq!(events[0].data, serde_json::json!("Knob at 104%"));
        assert_eq!(events[EVENT_HISTORY - 1].data, serde_json::json!("Knob at 5%"));
    }

    #[test]
    fn confirmations_show_up_in_status() {
        let mut registry = BadgeRegistry::new("badge-1", CredentialScheme::Identifier);
        registry.confirm("display_password", at(3));

        let status = registry.status();
        assert_eq!(
            status.last_confirmation,
            Some(ConfirmationRecord {
                command: "display_password".to_string(),
                confirmed_at: at(3),
            })
        );
        assert_eq!(registry.confirmations().len(), 1);
    }
}
