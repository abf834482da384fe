// Project configuration: `pinpoint.config.js` at the project root.
//
// The file is a JavaScript module such as
//
//     module.exports = { siteId: "abc", slug: "demo", apihost: "api.pinpoint.com" };
//
// Only the string literals assigned to the known keys are read; nothing is
// evaluated.

use crate::error::{PinpointError, Result};
use regex::Regex;
use std::path::{Path, PathBuf};

pub const PROJECT_CONFIG_FILE: &str = "pinpoint.config.js";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectConfig {
    /// Directory holding the config file; the deployment root.
    pub root: PathBuf,
    pub site_id: String,
    pub slug: Option<String>,
    /// Overrides `--host` for every request made for this project.
    pub apihost: Option<String>,
}

impl ProjectConfig {
    /// Load the config from `root`, failing if the file is absent or has no
    /// `siteId`.
    pub fn load(root: &Path) -> Result<Self> {
        let path = root.join(PROJECT_CONFIG_FILE);
        if !path.is_file() {
            return Err(PinpointError::MissingProjectConfig(path));
        }
        let source = std::fs::read_to_string(&path)?;
        let config = Self::parse(root, &source).ok_or(PinpointError::MissingSiteId(path))?;
        tracing::debug!(site_id = %config.site_id, slug = ?config.slug, apihost = ?config.apihost, "loaded project config");
        Ok(config)
    }

    /// Extract the config values from module source. `None` when `siteId`
    /// is missing or empty.
    pub fn parse(root: &Path, source: &str) -> Option<Self> {
        let site_id = string_property(source, "siteId")?;
        Some(ProjectConfig {
            root: root.to_path_buf(),
            site_id,
            slug: string_property(source, "slug"),
            apihost: string_property(source, "apihost"),
        })
    }

    /// Slug used in user-facing URLs.
    pub fn display_slug(&self) -> &str {
        self.slug.as_deref().unwrap_or(&self.site_id)
    }
}

/// First non-empty string literal assigned to `key` in an object literal.
fn string_property(source: &str, key: &str) -> Option<String> {
    let pattern = format!(
        r#"(?:^|[\s,{{])["'`]?{}["'`]?\s*:\s*(?:"([^"]*)"|'([^']*)'|`([^`]*)`)"#,
        regex::escape(key)
    );
    let re = Regex::new(&pattern).ok()?;
    let value = re
        .captures_iter(source)
        .filter_map(|caps| caps.get(1).or_else(|| caps.get(2)).or_else(|| caps.get(3)))
        .map(|m| m.as_str().trim().to_string())
        .find(|v| !v.is_empty());
    value
}
