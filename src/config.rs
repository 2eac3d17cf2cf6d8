use camino::Utf8PathBuf;

use crate::domain::{Region, SpaceId};
use crate::error::BackupError;

pub const TOKEN_ENV: &str = "STORYBLOK_OAUTH_TOKEN";
pub const SPACE_ENV: &str = "STORYBLOK_SPACE_ID";
pub const REGION_ENV: &str = "STORYBLOK_REGION";

pub const DEFAULT_OUTPUT_DIR: &str = "./.output";
pub const DEFAULT_ZIP_PREFIX: &str = "backup";

/// Loads `.env` from the working directory into the process environment, if present.
pub fn load_dotenv() {
    match dotenvy::dotenv() {
        Ok(path) => tracing::debug!(path = %path.display(), "loaded environment file"),
        Err(err) if err.not_found() => {}
        Err(err) => tracing::warn!(%err, "ignoring unreadable environment file"),
    }
}

/// Credentials and target of one run, validated before any request is made.
#[derive(Debug, Clone)]
pub struct Connection {
    pub token: String,
    pub space_id: SpaceId,
    pub region: Region,
}

impl Connection {
    pub fn resolve(
        token: Option<&str>,
        space: Option<&str>,
        region: Option<&str>,
    ) -> Result<Self, BackupError> {
        let token = token
            .map(str::trim)
            .filter(|token| !token.is_empty())
            .ok_or_else(|| {
                BackupError::Configuration(format!(
                    "state your oauth token via the --token argument or the {TOKEN_ENV} environment variable"
                ))
            })?
            .to_string();
        let space_id: SpaceId = space
            .filter(|space| !space.trim().is_empty())
            .ok_or_else(|| {
                BackupError::Configuration(format!(
                    "state your space id via the --space argument or the {SPACE_ENV} environment variable"
                ))
            })?
            .parse()?;
        let region = match region.filter(|region| !region.trim().is_empty()) {
            Some(region) => region.parse()?,
            None => Region::default(),
        };
        Ok(Self {
            token,
            space_id,
            region,
        })
    }
}

pub fn resolve_input_file(path: &str) -> Result<Utf8PathBuf, BackupError> {
    let path = Utf8PathBuf::from(path);
    if !path.as_std_path().is_file() {
        return Err(BackupError::Configuration(format!(
            "stated file \"{path}\" does not exist"
        )));
    }
    Ok(path)
}
