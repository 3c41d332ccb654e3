use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PrincipalError {
    #[error("principal {0:?} is not of the form local@domain[/resource]")]
    Malformed(String),
}

/// Addressable identity: `local@domain` optionally qualified by a transport
/// resource (`local@domain/resource`).
///
/// Channel identifiers are principals in the channel namespace
/// (`#name@domain`) and parse with the same rules.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Principal {
    bare: String,
    resource: Option<String>,
}

impl Principal {
    /// Parse from text, accepting both bare and resourceful forms.
    pub fn parse(raw: &str) -> Result<Self, PrincipalError> {
        let (bare, resource) = match raw.split_once('/') {
            Some((bare, resource)) => {
                if resource.is_empty() {
                    return Err(PrincipalError::Malformed(raw.to_string()));
                }
                (bare, Some(resource.to_string()))
            }
            None => (raw, None),
        };
        let valid = matches!(bare.split_once('@'), Some((local, domain))
            if !local.is_empty() && !domain.is_empty() && !domain.contains('@'));
        if !valid {
            return Err(PrincipalError::Malformed(raw.to_string()));
        }
        Ok(Self {
            bare: bare.to_string(),
            resource,
        })
    }

    /// The `local@domain` portion.
    pub fn bare(&self) -> &str {
        &self.bare
    }

    pub fn resource(&self) -> Option<&str> {
        self.resource.as_deref()
    }

    pub fn is_bare(&self) -> bool {
        self.resource.is_none()
    }

    /// True for channel-namespaced identifiers (`#name@domain`).
    pub fn is_channel(&self) -> bool {
        self.bare.starts_with('#')
    }

    /// Sender verification used by the dispatcher: bare portions must match,
    /// and a resource claimed by `self` must match the asserted origin's.
    pub fn matches_origin(&self, origin: &Principal) -> bool {
        if self.bare != origin.bare {
            return false;
        }
        match &self.resource {
            Some(resource) => origin.resource.as_deref() == Some(resource.as_str()),
            None => true,
        }
    }
}

impl fmt::Display for Principal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.resource {
            Some(resource) => write!(f, "{}/{}", self.bare, resource),
            None => f.write_str(&self.bare),
        }
    }
}

impl FromStr for Principal {
    type Err = PrincipalError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl Serialize for Principal {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Principal {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Self::parse(&raw).map_err(serde::de::Error::custom)
    }
}
