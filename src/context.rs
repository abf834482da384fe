// Per-invocation state: resolved settings plus the caches that live for the
// whole process (credential document, project config, caller identity).
// Built once in `main` and passed by reference to every command.

use crate::api::{ApiClient, RequestOptions};
use crate::credentials::{self, CredentialStore};
use crate::error::{PinpointError, Result};
use crate::identity::DEFAULT_IP_LOOKUP_URL;
use crate::project::{ProjectConfig, PROJECT_CONFIG_FILE};
use crate::ui::{ProgressFn, Prompter};
use serde_json::Value;
use std::cell::OnceCell;
use std::path::{Path, PathBuf};

pub const DEFAULT_HOST: &str = "api.pinpoint.com";
pub const API_KEY_ENV: &str = "PINPOINT_API_KEY";
pub const HOST_ENV: &str = "PINPOINT_HOST";
pub const CI_ENV: &str = "CI";

/// Everything the commands need to know about how they were invoked.
#[derive(Debug, Clone)]
pub struct Settings {
    pub host: String,
    /// Key supplied through the environment; skips the credential file.
    pub api_key: Option<String>,
    /// Running in CI: never ask for confirmation.
    pub ci: bool,
    pub dry_run: bool,
    pub project_dir: PathBuf,
    pub credentials_path: PathBuf,
    pub ip_lookup_url: String,
    /// Where deployment archives are staged; the system temp dir if unset.
    pub temp_dir: Option<PathBuf>,
}

impl Settings {
    /// Defaults for the current directory and home directory.
    pub fn new(project_dir: impl Into<PathBuf>) -> Self {
        Settings {
            host: DEFAULT_HOST.to_string(),
            api_key: None,
            ci: false,
            dry_run: false,
            project_dir: project_dir.into(),
            credentials_path: credentials::default_path(),
            ip_lookup_url: DEFAULT_IP_LOOKUP_URL.to_string(),
            temp_dir: None,
        }
    }

    /// No one is there to answer prompts.
    pub fn non_interactive(&self) -> bool {
        self.ci || self.api_key.is_some()
    }
}

pub struct Context {
    pub settings: Settings,
    pub credentials: CredentialStore,
    pub api: ApiClient,
    project: OnceCell<ProjectConfig>,
}

impl Context {
    pub fn new(settings: Settings) -> Result<Self> {
        let api = ApiClient::new(settings.ip_lookup_url.clone())?;
        Ok(Self::with_api(settings, api))
    }

    /// Use a preconfigured API client (custom retry policy, fixed identity).
    pub fn with_api(settings: Settings, api: ApiClient) -> Self {
        let credentials = CredentialStore::new(&settings.credentials_path, settings.api_key.clone());
        Context {
            settings,
            credentials,
            api,
            project: OnceCell::new(),
        }
    }

    pub fn project_dir(&self) -> &Path {
        &self.settings.project_dir
    }

    /// The project config, read from disk on first use.
    pub fn project(&self) -> Result<&ProjectConfig> {
        if let Some(project) = self.project.get() {
            return Ok(project);
        }
        let project = ProjectConfig::load(&self.settings.project_dir)?;
        Ok(self.project.get_or_init(|| project))
    }

    /// API host for this invocation: the project's `apihost` when the
    /// project directory has a config that sets one, otherwise `--host`.
    pub fn apihost(&self) -> &str {
        self.local_project()
            .and_then(|p| p.apihost.as_deref())
            .unwrap_or(&self.settings.host)
    }

    /// The project config if one is present and readable. Account commands
    /// run outside projects too, so a missing or broken file is not an error
    /// here; `project()` reports it for the commands that need one.
    fn local_project(&self) -> Option<&ProjectConfig> {
        if self.project.get().is_none() && self.settings.project_dir.join(PROJECT_CONFIG_FILE).is_file() {
            match ProjectConfig::load(&self.settings.project_dir) {
                Ok(project) => {
                    let _ = self.project.set(project);
                }
                Err(e) => tracing::debug!(error = %e, "not using project config for the api host"),
            }
        }
        self.project.get()
    }

    /// Key for a request: explicit, then environment, then the credential
    /// store entry for the loaded project's site.
    pub fn resolve_api_key(&self, opts: &RequestOptions<'_>) -> Result<Option<String>> {
        if let Some(key) = opts.api_key.as_ref().filter(|k| !k.is_empty()) {
            return Ok(Some(key.clone()));
        }
        if let Some(key) = &self.settings.api_key {
            return Ok(Some(key.clone()));
        }
        if !opts.api_key_required {
            return Ok(None);
        }
        let site_id = self.local_project().map(|p| p.site_id.as_str()).unwrap_or_default();
        let key = self.credentials.get_api_key(self.apihost(), site_id, None)?;
        if key.is_none() {
            tracing::debug!(host = self.apihost(), site_id, "no saved api key");
            return Err(PinpointError::NotLoggedIn);
        }
        Ok(key)
    }

    /// JSON request against the current API host.
    pub fn request(&self, purpose: &str, path: &str, opts: RequestOptions<'_>) -> Result<Value> {
        let key = self.resolve_api_key(&opts)?;
        self.api
            .request(self.apihost(), purpose, path, key.as_deref(), &opts)
    }

    /// Multipart upload against the current API host.
    pub fn upload(
        &self,
        purpose: &str,
        path: &str,
        file: &Path,
        on_progress: Option<ProgressFn>,
        opts: RequestOptions<'_>,
    ) -> Result<Value> {
        let key = self.resolve_api_key(&opts)?;
        self.api
            .upload(self.apihost(), purpose, path, key.as_deref(), file, on_progress, &opts)
    }

    /// See [`CredentialStore::select_user`].
    pub fn select_user(&self, prompter: &dyn Prompter) -> Result<String> {
        self.credentials.select_user(self.apihost(), prompter)
    }
}
