use serde::{Deserialize, Serialize};

use crate::{config::CredentialScheme, error::ProtocolError};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub identifier: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub ip_address: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
struct CredentialsBody {
    identifier: Option<String>,
    ip_address: Option<String>,
    password: Option<String>,
}

impl Credentials {
    /// Decodes a `get_credentials` body, requiring every field the scheme names
    /// to be present and non-empty.
    pub fn parse(body: &str, scheme: CredentialScheme) -> Result<Self, ProtocolError> {
        let raw: CredentialsBody = serde_json::from_str(body)
            .map_err(|err| ProtocolError::MalformedJson(err.to_string()))?;

        let password = required(raw.password, "password")?;
        let credentials = match scheme {
            CredentialScheme::Identifier => Self {
                identifier: required(raw.identifier, "identifier")?,
                ip_address: raw.ip_address.unwrap_or_default(),
                password,
            },
            CredentialScheme::IpAddress => Self {
                identifier: raw.identifier.unwrap_or_default(),
                ip_address: required(raw.ip_address, "ip_address")?,
                password,
            },
        };

        Ok(credentials)
    }

    /// The value shown on the first display line.
    pub fn display_name(&self, scheme: CredentialScheme) -> &str {
        match scheme {
            CredentialScheme::Identifier => &self.identifier,
            CredentialScheme::IpAddress => &self.ip_address,
        }
    }
}

fn required(value: Option<String>, field: &'static str) -> Result<String, ProtocolError> {
    match value {
        Some(value) if !value.trim().is_empty() => Ok(value),
        _ => Err(ProtocolError::MissingField(field)),
    }
}
