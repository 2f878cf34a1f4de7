//! Credential storage for Live Tail
//!
//! Credentials typed in at the prompt are kept in a flat JSON file next to
//! where the CLI runs so the next run can skip the prompt. The deployment
//! they resolved to is written alongside for reference only; every run
//! without `-d` resolves it again.

use std::fs;
use std::io::ErrorKind;
use std::path::Path;

use anyhow::{Context, Result};
use livetail_api::{Credentials, Deployment};
use livetail_types::AccessKey;
use serde::{Deserialize, Serialize};

use crate::error::LiveTailError;
use crate::prompt;

/// On-disk layout of the credential file
#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredCredentials {
    #[serde(default)]
    pub deployment: String,
    #[serde(default)]
    pub access_id: String,
    #[serde(default)]
    pub access_key: AccessKey,
}

impl StoredCredentials {
    /// Load the credential file, `None` if it does not exist
    pub fn load(path: &Path) -> Result<Option<Self>> {
        let content = match fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(e)
                    .with_context(|| format!("Failed to read credential file {:?}", path));
            }
        };

        let stored = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse credential file {:?}", path))?;
        Ok(Some(stored))
    }

    /// Overwrite the credential file
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory {:?}", parent))?;
        }
        let content = serde_json::to_string_pretty(self)?;
        fs::write(path, content)
            .with_context(|| format!("Failed to write credential file {:?}", path))
    }
}

/// Where the credentials of this run came from
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Source {
    Flags,
    File,
    Prompt,
}

/// Credentials chosen for this run
#[derive(Clone, Debug)]
pub struct AccessDetails {
    pub credentials: Credentials,
    pub source: Source,
}

impl AccessDetails {
    /// Only prompted credentials get written back to disk
    pub fn freshly_prompted(&self) -> bool {
        self.source == Source::Prompt
    }
}

/// Pick credentials from the command line or the credential file.
///
/// Flags win. `None` means neither source has an access id and the user has
/// to be asked.
pub fn select(
    flags: Option<Credentials>,
    stored: Option<StoredCredentials>,
) -> Option<AccessDetails> {
    if let Some(credentials) = flags {
        return Some(AccessDetails {
            credentials,
            source: Source::Flags,
        });
    }

    let stored = stored.filter(|s| !s.access_id.trim().is_empty())?;
    Some(AccessDetails {
        credentials: Credentials {
            access_id: stored.access_id,
            access_key: stored.access_key,
        },
        source: Source::File,
    })
}

/// Resolve the credentials for this run, prompting when none are known
pub async fn load(
    flags: Option<Credentials>,
    path: &Path,
) -> Result<AccessDetails, LiveTailError> {
    let stored = StoredCredentials::load(path).map_err(LiveTailError::Credentials)?;
    if let Some(details) = select(flags, stored) {
        tracing::debug!(source = ?details.source, "Using stored or supplied credentials");
        return Ok(details);
    }

    let credentials = tokio::task::spawn_blocking(prompt::prompt_credentials)
        .await
        .map_err(|e| LiveTailError::Config(format!("Credential prompt failed: {}", e)))?
        .map_err(|e| LiveTailError::Config(format!("Unable to read credentials: {}", e)))?;

    if credentials.access_id.is_empty() {
        return Err(LiveTailError::Config(
            "An Access ID is required to start a Live Tail session".into(),
        ));
    }

    Ok(AccessDetails {
        credentials,
        source: Source::Prompt,
    })
}

/// Remember prompted credentials and the deployment they belong to
pub fn save(
    path: &Path,
    deployment: &Deployment,
    credentials: &Credentials,
) -> Result<(), LiveTailError> {
    StoredCredentials {
        deployment: deployment.to_string(),
        access_id: credentials.access_id.clone(),
        access_key: credentials.access_key.clone(),
    }
    .save(path)
    .map_err(LiveTailError::Credentials)?;

    tracing::debug!(path = %path.display(), "Saved credentials");
    Ok(())
}

/// Remove the credential file; a missing file is not an error
pub fn clear(path: &Path) -> Result<(), LiveTailError> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        Err(e) => Err(LiveTailError::Credentials(
            anyhow::Error::new(e).context(format!("Failed to remove {:?}", path)),
        )),
    }
}
