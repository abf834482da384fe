// Saved login sessions.
// The credential file maps API host -> user id -> the user's API key, the
// sites they can deploy and the email they logged in with. It is read at
// most once per process and rewritten (mode 0600) on every change.

use crate::error::{PinpointError, Result};
use crate::ui::Prompter;
use serde::{Deserialize, Serialize};
use std::cell::RefCell;
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

/// File name of the credential store inside the home directory.
pub const CREDENTIALS_FILE: &str = ".pinpoint.json";

/// How long a saved login stays valid: 30 days, minus a little slack so the
/// local copy expires before the server's.
pub const SESSION_TTL_MS: i64 = 2_592_000_000 - 40_000;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiKey {
    pub value: String,
    /// Expiry as epoch milliseconds. The key is valid while `expires > now`.
    pub expires: i64,
}

impl ApiKey {
    pub fn is_valid_at(&self, now: i64) -> bool {
        !self.value.is_empty() && self.expires > now
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserCredentials {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub site_ids: BTreeSet<String>,
    pub apikey: ApiKey,
}

/// host -> user id -> credentials
pub type CredentialDocument = BTreeMap<String, BTreeMap<String, UserCredentials>>;

pub fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Default location: `~/.pinpoint.json`.
pub fn default_path() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(CREDENTIALS_FILE)
}

/// Credential file plus its in-process cache.
pub struct CredentialStore {
    path: PathBuf,
    /// Key from the environment; wins over anything on disk.
    env_api_key: Option<String>,
    cache: RefCell<Option<CredentialDocument>>,
}

impl CredentialStore {
    pub fn new(path: impl Into<PathBuf>, env_api_key: Option<String>) -> Self {
        CredentialStore {
            path: path.into(),
            env_api_key: env_api_key.filter(|k| !k.is_empty()),
            cache: RefCell::new(None),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The whole document. Loaded from disk on first use only; an absent
    /// file reads as empty.
    pub fn read(&self) -> Result<CredentialDocument> {
        if let Some(doc) = self.cache.borrow().as_ref() {
            return Ok(doc.clone());
        }
        let doc = if self.path.exists() {
            let raw = std::fs::read_to_string(&self.path)?;
            if raw.trim().is_empty() {
                CredentialDocument::new()
            } else {
                serde_json::from_str(&raw).map_err(|source| PinpointError::UnreadableCredentials {
                    path: self.path.clone(),
                    source,
                })?
            }
        } else {
            CredentialDocument::new()
        };
        tracing::debug!(path = %self.path.display(), hosts = doc.len(), "read credentials");
        *self.cache.borrow_mut() = Some(doc.clone());
        Ok(doc)
    }

    /// API key for deploying `site_id` to `apihost`, if a valid one is saved.
    pub fn get_api_key(&self, apihost: &str, site_id: &str, user_id: Option<&str>) -> Result<Option<String>> {
        self.get_api_key_at(apihost, site_id, user_id, now_millis())
    }

    pub fn get_api_key_at(
        &self,
        apihost: &str,
        site_id: &str,
        user_id: Option<&str>,
        now: i64,
    ) -> Result<Option<String>> {
        if let Some(key) = &self.env_api_key {
            return Ok(Some(key.clone()));
        }
        let doc = self.read()?;
        let Some(users) = doc.get(apihost) else {
            return Ok(None);
        };
        let found = match user_id.filter(|u| !u.is_empty()) {
            Some(id) => users.get_key_value(id),
            None => users.iter().find(|(_, user)| user.site_ids.contains(site_id)),
        };
        let Some((id, user)) = found else {
            return Ok(None);
        };
        if user.apikey.is_valid_at(now) {
            return Ok(Some(user.apikey.value.clone()));
        }
        tracing::debug!(host = apihost, user = %id, "removing expired api key");
        let id = id.clone();
        self.save_api_key_at(apihost, &id, None, now)?;
        Ok(None)
    }

    /// Record (or forget) a user's session for `apihost`.
    ///
    /// An empty `apihost` removes the credential file altogether. A missing
    /// entry, or one whose key is empty or already expired, removes that
    /// user. The file is rewritten with owner-only permissions every time.
    pub fn save_api_key(&self, apihost: &str, user_id: &str, entry: Option<UserCredentials>) -> Result<()> {
        self.save_api_key_at(apihost, user_id, entry, now_millis())
    }

    pub fn save_api_key_at(
        &self,
        apihost: &str,
        user_id: &str,
        entry: Option<UserCredentials>,
        now: i64,
    ) -> Result<()> {
        if apihost.is_empty() {
            return self.delete_all();
        }
        let mut doc = self.read()?;
        match entry.filter(|e| e.apikey.is_valid_at(now)) {
            Some(entry) => {
                doc.entry(apihost.to_string())
                    .or_default()
                    .insert(user_id.to_string(), entry);
            }
            None => {
                if let Some(users) = doc.get_mut(apihost) {
                    users.remove(user_id);
                    if users.is_empty() {
                        doc.remove(apihost);
                    }
                }
            }
        }
        self.write(doc)
    }

    /// Forget one user on one host.
    pub fn remove_user(&self, apihost: &str, user_id: &str) -> Result<()> {
        self.save_api_key(apihost, user_id, None)
    }

    /// Hard logout: remove the credential file.
    pub fn delete_all(&self) -> Result<()> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
        *self.cache.borrow_mut() = Some(CredentialDocument::new());
        tracing::debug!(path = %self.path.display(), "removed credentials");
        Ok(())
    }

    /// `(user id, email)` for every user saved under `apihost`.
    pub fn users(&self, apihost: &str) -> Result<Vec<(String, String)>> {
        let doc = self.read()?;
        Ok(doc
            .get(apihost)
            .map(|users| {
                users
                    .iter()
                    .map(|(id, user)| (id.clone(), user.email.clone()))
                    .collect()
            })
            .unwrap_or_default())
    }

    /// Pick the user to act as on `apihost`: the only one saved, or ask.
    pub fn select_user(&self, apihost: &str, prompter: &dyn Prompter) -> Result<String> {
        let mut users = self.users(apihost)?;
        match users.len() {
            0 => Err(PinpointError::NoUsers(apihost.to_string())),
            1 => Ok(users.remove(0).0),
            _ => {
                let labels: Vec<String> = users
                    .iter()
                    .map(|(id, email)| if email.is_empty() { id.clone() } else { email.clone() })
                    .collect();
                let index = prompter
                    .select("Which account do you want to use?", &labels)?
                    .or_cancel()?;
                Ok(users.swap_remove(index).0)
            }
        }
    }

    fn write(&self, doc: CredentialDocument) -> Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let content = serde_json::to_string_pretty(&doc)?;
        std::fs::write(&self.path, content)?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&self.path, std::fs::Permissions::from_mode(0o600))?;
        }

        tracing::debug!(path = %self.path.display(), "credentials saved");
        *self.cache.borrow_mut() = Some(doc);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ui::{Answer, Validator};
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    const NOW: i64 = 1_700_000_000_000;

    fn user(email: &str, sites: &[&str], key: &str, expires: i64) -> UserCredentials {
        UserCredentials {
            email: email.to_string(),
            site_ids: sites.iter().map(|s| s.to_string()).collect(),
            apikey: ApiKey {
                value: key.to_string(),
                expires,
            },
        }
    }

    fn store(dir: &TempDir) -> CredentialStore {
        CredentialStore::new(dir.path().join(CREDENTIALS_FILE), None)
    }

    struct PickSecond;

    impl Prompter for PickSecond {
        fn confirm(&self, _: &str, _: bool) -> Result<Answer<bool>> {
            unreachable!()
        }
        fn text(&self, _: &str, _: Option<&str>, _: Validator<'_>) -> Result<Answer<String>> {
            unreachable!()
        }
        fn select(&self, _: &str, items: &[String]) -> Result<Answer<usize>> {
            assert_eq!(items.len(), 2);
            Ok(Answer::Value(1))
        }
    }

    #[test]
    fn absent_file_reads_empty() {
        let dir = TempDir::new().unwrap();
        let s = store(&dir);
        assert!(s.read().unwrap().is_empty());
        assert_eq!(s.get_api_key_at("api", "site", None, NOW).unwrap(), None);
    }

    #[test]
    fn legacy_layout_names_the_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(CREDENTIALS_FILE);
        std::fs::write(&path, r#"{"apikey":{"value":"k","expires":1}}"#).unwrap();

        let err = store(&dir).get_api_key_at("api", "site", None, NOW).unwrap_err();

        assert!(matches!(err, PinpointError::UnreadableCredentials { .. }));
        let message = err.to_string();
        assert!(message.contains(&path.display().to_string()));
        assert!(message.contains("pinpoint logout"));
    }

    #[test]
    fn save_then_get_returns_key() {
        let dir = TempDir::new().unwrap();
        let s = store(&dir);
        s.save_api_key_at("api", "u1", Some(user("a@b.co", &["site"], "k1", NOW + 1000)), NOW)
            .unwrap();

        assert_eq!(s.get_api_key_at("api", "site", None, NOW).unwrap().as_deref(), Some("k1"));
        assert_eq!(s.get_api_key_at("api", "other", Some("u1"), NOW).unwrap().as_deref(), Some("k1"));
        assert_eq!(s.get_api_key_at("api", "other", None, NOW).unwrap(), None);
        assert_eq!(s.get_api_key_at("elsewhere", "site", None, NOW).unwrap(), None);

        // A fresh store sees what was persisted.
        let reread = store(&dir);
        assert_eq!(reread.read().unwrap(), s.read().unwrap());
    }

    #[test]
    fn saving_expired_or_empty_key_removes_user() {
        let dir = TempDir::new().unwrap();
        let s = store(&dir);
        s.save_api_key_at("api", "u1", Some(user("", &["site"], "k1", NOW + 1000)), NOW)
            .unwrap();
        s.save_api_key_at("api", "u1", Some(user("", &["site"], "k1", NOW - 1)), NOW)
            .unwrap();
        assert!(s.read().unwrap().is_empty());

        s.save_api_key_at("api", "u1", Some(user("", &["site"], "k1", NOW + 1000)), NOW)
            .unwrap();
        s.save_api_key_at("api", "u1", Some(user("", &["site"], "", NOW + 1000)), NOW)
            .unwrap();
        assert!(s.read().unwrap().is_empty());
    }

    #[test]
    fn key_expiring_now_is_expired_and_purged() {
        let dir = TempDir::new().unwrap();
        let s = store(&dir);
        s.save_api_key_at("api", "u1", Some(user("", &["site"], "k1", NOW + 10)), NOW)
            .unwrap();
        s.save_api_key_at("api", "u2", Some(user("", &["other"], "k2", NOW + 5000)), NOW)
            .unwrap();

        assert_eq!(s.get_api_key_at("api", "site", None, NOW + 10).unwrap(), None);

        let on_disk: CredentialDocument =
            serde_json::from_str(&std::fs::read_to_string(s.path()).unwrap()).unwrap();
        assert!(!on_disk["api"].contains_key("u1"));
        assert!(on_disk["api"].contains_key("u2"));
    }

    #[test]
    fn env_key_short_circuits() {
        let dir = TempDir::new().unwrap();
        let s = CredentialStore::new(dir.path().join(CREDENTIALS_FILE), Some("env-key".into()));
        assert_eq!(s.get_api_key_at("api", "site", None, NOW).unwrap().as_deref(), Some("env-key"));
        assert!(!s.path().exists());
    }

    #[test]
    fn empty_host_deletes_file() {
        let dir = TempDir::new().unwrap();
        let s = store(&dir);
        s.save_api_key_at("api", "u1", Some(user("", &["site"], "k1", NOW + 1000)), NOW)
            .unwrap();
        assert!(s.path().exists());
        s.save_api_key_at("", "u1", None, NOW).unwrap();
        assert!(!s.path().exists());
        assert!(s.read().unwrap().is_empty());
    }

    #[test]
    fn read_is_cached_for_the_process() {
        let dir = TempDir::new().unwrap();
        let s = store(&dir);
        assert!(s.read().unwrap().is_empty());
        std::fs::write(
            s.path(),
            r#"{"api":{"u1":{"email":"","siteIds":["x"],"apikey":{"value":"k","expires":1}}}}"#,
        )
        .unwrap();
        assert!(s.read().unwrap().is_empty());
    }

    #[test]
    fn file_layout_uses_camel_case() {
        let dir = TempDir::new().unwrap();
        let s = store(&dir);
        s.save_api_key_at("api.pinpoint.com", "u1", Some(user("a@b.co", &["s1"], "k1", NOW + 1)), NOW)
            .unwrap();
        let raw: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(s.path()).unwrap()).unwrap();
        assert_eq!(raw["api.pinpoint.com"]["u1"]["siteIds"][0], "s1");
        assert_eq!(raw["api.pinpoint.com"]["u1"]["apikey"]["value"], "k1");
        assert_eq!(raw["api.pinpoint.com"]["u1"]["email"], "a@b.co");
    }

    #[cfg(unix)]
    #[test]
    fn every_write_restricts_permissions() {
        use std::os::unix::fs::PermissionsExt;
        let dir = TempDir::new().unwrap();
        let s = store(&dir);
        s.save_api_key_at("api", "u1", Some(user("", &[], "k1", NOW + 1000)), NOW)
            .unwrap();
        std::fs::set_permissions(s.path(), std::fs::Permissions::from_mode(0o644)).unwrap();
        s.save_api_key_at("api", "u2", Some(user("", &[], "k2", NOW + 1000)), NOW)
            .unwrap();
        let mode = std::fs::metadata(s.path()).unwrap().permissions().mode() & 0o777;
        assert_eq!(mode, 0o600);
    }

    #[test]
    fn select_user_variants() {
        let dir = TempDir::new().unwrap();
        let s = store(&dir);
        assert!(matches!(
            s.select_user("api", &PickSecond),
            Err(PinpointError::NoUsers(_))
        ));

        s.save_api_key("api", "u1", Some(user("one@x.co", &[], "k1", now_millis() + 60_000)))
            .unwrap();
        assert_eq!(s.select_user("api", &PickSecond).unwrap(), "u1");

        s.save_api_key("api", "u2", Some(user("two@x.co", &[], "k2", now_millis() + 60_000)))
            .unwrap();
        assert_eq!(s.select_user("api", &PickSecond).unwrap(), "u2");
    }
}
