use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::BackupError;

/// Data-center region of a space. Each region has its own management API host.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Region {
    #[default]
    Eu,
    Us,
    Ap,
    Ca,
    Cn,
}

impl Region {
    pub fn base_url(self) -> &'static str {
        match self {
            Region::Eu => "https://mapi.storyblok.com/v1",
            Region::Us => "https://api-us.storyblok.com/v1",
            Region::Ap => "https://api-ap.storyblok.com/v1",
            Region::Ca => "https://api-ca.storyblok.com/v1",
            Region::Cn => "https://app.storyblokchina.cn/v1",
        }
    }
}

impl fmt::Display for Region {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Region::Eu => write!(f, "eu"),
            Region::Us => write!(f, "us"),
            Region::Ap => write!(f, "ap"),
            Region::Ca => write!(f, "ca"),
            Region::Cn => write!(f, "cn"),
        }
    }
}

impl FromStr for Region {
    type Err = BackupError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "eu" => Ok(Region::Eu),
            "us" => Ok(Region::Us),
            "ap" => Ok(Region::Ap),
            "ca" => Ok(Region::Ca),
            "cn" => Ok(Region::Cn),
            _ => Err(BackupError::Configuration(format!(
                "invalid region `{value}` (expected eu|us|ap|ca|cn)"
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SpaceId(String);

impl SpaceId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SpaceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for SpaceId {
    type Err = BackupError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let normalized = value.trim();
        let is_valid = !normalized.is_empty() && normalized.chars().all(|ch| ch.is_ascii_digit());
        if !is_valid {
            return Err(BackupError::Configuration(format!(
                "invalid space id `{value}`"
            )));
        }
        Ok(Self(normalized.to_string()))
    }
}

/// Whether a restore creates a new resource or updates the existing one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RestoreMode {
    Create,
    Update,
}

impl RestoreMode {
    pub fn from_flag(create: bool) -> Self {
        if create {
            RestoreMode::Create
        } else {
            RestoreMode::Update
        }
    }
}

impl fmt::Display for RestoreMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RestoreMode::Create => write!(f, "create"),
            RestoreMode::Update => write!(f, "update"),
        }
    }
}

/// Renders a JSON id (number or string) the way it appears in paths and file names.
pub fn id_to_string(value: &serde_json::Value) -> Option<String> {
    match value {
        serde_json::Value::String(text) if !text.is_empty() => Some(text.clone()),
        serde_json::Value::Number(number) => Some(number.to_string()),
        _ => None,
    }
}
