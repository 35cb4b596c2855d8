//! Store upload through fastlane lanes.

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};

use crate::core::error::StepError;
use crate::core::types::Lane;
use crate::io::process::{ProcessRequest, ProcessRunner, run_tool};

/// Store that receives an artifact, chosen by file extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Store {
    AppStore,
    PlayStore,
}

impl fmt::Display for Store {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AppStore => f.write_str("App Store"),
            Self::PlayStore => f.write_str("Play Store"),
        }
    }
}

impl Store {
    /// `.ipa` goes to the App Store and `.aab` to the Play Store. Plain
    /// `.apk` packages are not accepted for store upload.
    pub fn for_artifact(artifact: &Path) -> Result<Self, StepError> {
        let ext = artifact.extension().and_then(|ext| ext.to_str()).unwrap_or("");
        match ext {
            "ipa" => Ok(Self::AppStore),
            "aab" => Ok(Self::PlayStore),
            "apk" => Err(StepError::Config(format!(
                "{} is an .apk; store upload requires an app bundle (.aab)",
                artifact.display()
            ))),
            _ => Err(StepError::Config(format!(
                "unsupported artifact {}; expected .ipa or .aab",
                artifact.display()
            ))),
        }
    }
}

/// Locale to release-note text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ReleaseNotes(BTreeMap<String, String>);

impl Default for ReleaseNotes {
    fn default() -> Self {
        Self(BTreeMap::from([(
            "en-US".to_string(),
            "Bug fixes and improvements".to_string(),
        )]))
    }
}

impl ReleaseNotes {
    /// Parse a JSON object such as `{"en-US": "Fixes"}`.
    pub fn parse(json: &str) -> Result<Self> {
        serde_json::from_str(json).context("release notes must be a JSON object of locale to text")
    }

    fn to_json(&self) -> Result<String> {
        serde_json::to_string(&self.0).context("serialize release notes")
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AppStoreOptions {
    pub api_key_id: Option<String>,
    pub api_key_issuer_id: Option<String>,
    pub api_key_path: Option<PathBuf>,
    pub skip_binary_upload: bool,
    /// TestFlight groups.
    pub groups: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PlayStoreOptions {
    pub json_key_path: Option<PathBuf>,
    pub package_name: Option<String>,
    pub skip_upload_apk: bool,
    pub skip_upload_aab: bool,
    pub validate_only: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadRequest {
    pub lane: Lane,
    pub artifact: PathBuf,
    pub release_notes: ReleaseNotes,
    /// Directory fastlane runs in.
    pub workdir: PathBuf,
    pub app_store: AppStoreOptions,
    pub play_store: PlayStoreOptions,
}

/// Upload `request.artifact` to the store matching its extension.
#[instrument(
    skip_all,
    fields(lane = request.lane.as_str(), artifact = %request.artifact.display())
)]
pub fn upload<R: ProcessRunner>(runner: &R, request: &UploadRequest) -> Result<Store> {
    let store = Store::for_artifact(&request.artifact)?;
    let command = match store {
        Store::AppStore => app_store_command(request)?,
        Store::PlayStore => play_store_command(request)?,
    };
    info!(%store, "uploading");
    run_tool(runner, &command)?;
    info!(%store, "upload finished");
    Ok(store)
}

fn app_store_command(request: &UploadRequest) -> Result<ProcessRequest> {
    let opts = &request.app_store;
    let key_id = required(opts.api_key_id.as_deref(), "--ios-api-key-id")?;
    let issuer = required(opts.api_key_issuer_id.as_deref(), "--ios-api-key-issuer-id")?;
    let key_path = required(opts.api_key_path.as_deref(), "--ios-api-key-path")?;

    let mut command = lane_command(request)
        .arg(format!("ipa:{}", request.artifact.display()))
        .arg(format!("api_key_id:{key_id}"))
        .arg(format!("api_key_issuer_id:{issuer}"))
        .arg(format!("api_key_path:{}", key_path.display()))
        .arg(format!("skip_binary_upload:{}", opts.skip_binary_upload));
    if let Some(groups) = &opts.groups {
        command = command.arg(format!("groups:{groups}"));
    }
    Ok(command.arg(format!("release_notes:{}", request.release_notes.to_json()?)))
}

fn play_store_command(request: &UploadRequest) -> Result<ProcessRequest> {
    let opts = &request.play_store;
    let key_path = required(opts.json_key_path.as_deref(), "--android-json-key-path")?;
    let package = required(opts.package_name.as_deref(), "--android-package-name")?;

    Ok(lane_command(request)
        .arg(format!("aab:{}", request.artifact.display()))
        .arg(format!("json_key_path:{}", key_path.display()))
        .arg(format!("package_name:{package}"))
        .arg(format!("skip_upload_apk:{}", opts.skip_upload_apk))
        .arg(format!("skip_upload_aab:{}", opts.skip_upload_aab))
        .arg(format!("validate_only:{}", opts.validate_only))
        .arg(format!("release_notes:{}", request.release_notes.to_json()?)))
}

fn lane_command(request: &UploadRequest) -> ProcessRequest {
    ProcessRequest::new("fastlane", &request.workdir).arg(request.lane.as_str())
}

fn required<'v, T: ?Sized>(value: Option<&'v T>, flag: &str) -> Result<&'v T, StepError> {
    value.ok_or_else(|| StepError::Config(format!("{flag} is required for this store")))
}
