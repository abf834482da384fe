// Ignore rules for deployment packaging.
// Patterns are shell globs, one per line, matched against paths relative to
// the project root with forward slashes on every platform.

use crate::error::{PinpointError, Result};
use globset::{GlobBuilder, GlobSet, GlobSetBuilder};
use std::path::{Component, Path, PathBuf};

/// Name of the optional per-project ignore file.
pub const IGNORE_FILE: &str = ".pinpointignore";

// Nothing in here is needed to build or run the site once deployed.
const BUILTIN_PATTERNS: &str = "
node_modules/**
.git/**
.github/**
.next/**
.gitignore
.npmignore
.dockerignore
.prettierignore
.pinpointignore
pinpoint.config.js
README.md
LICENSE
LICENSE.md
prettier.config.js
**/*.zip
**/*.tar
**/*.gz
**/*.gzip
";

/// A compiled set of glob patterns. A path matches when any pattern does.
#[derive(Debug, Clone)]
pub struct IgnoreMatcher {
    set: GlobSet,
}

impl IgnoreMatcher {
    /// Compile a newline-separated pattern blob. Blank lines are skipped.
    pub fn new(patterns: &str) -> Result<Self> {
        let mut builder = GlobSetBuilder::new();
        for pattern in patterns.lines().map(str::trim).filter(|l| !l.is_empty()) {
            let glob = GlobBuilder::new(pattern)
                .literal_separator(true)
                .build()
                .map_err(|source| PinpointError::Pattern {
                    pattern: pattern.to_string(),
                    source,
                })?;
            builder.add(glob);
        }
        let set = builder.build().map_err(|source| PinpointError::Pattern {
            pattern: patterns.trim().to_string(),
            source,
        })?;
        Ok(IgnoreMatcher { set })
    }

    /// The patterns that are always excluded, whatever the ignore file says.
    pub fn builtin() -> Self {
        // The built-in list is a constant known to compile.
        Self::new(BUILTIN_PATTERNS).unwrap_or_else(|_| IgnoreMatcher {
            set: GlobSet::empty(),
        })
    }

    /// Read a matcher from an ignore file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::new(&contents)
    }

    pub fn matches(&self, relative: &str) -> bool {
        self.set.is_match(relative)
    }

    /// Directory form of `matches`: `dir/**` style patterns match the
    /// directory itself so the walker can prune it.
    pub fn matches_dir(&self, relative: &str) -> bool {
        self.matches(relative) || self.matches(&format!("{relative}/"))
    }

    pub fn len(&self) -> usize {
        self.set.len()
    }

    pub fn is_empty(&self) -> bool {
        self.set.is_empty()
    }
}

/// Decides which paths under a project root end up in the deployment.
///
/// A path is included only if neither the built-in rules nor the user's
/// ignore file exclude it.
#[derive(Debug, Clone)]
pub struct PathFilter {
    root: PathBuf,
    builtin: IgnoreMatcher,
    user: Option<IgnoreMatcher>,
}

impl PathFilter {
    pub fn new(root: impl Into<PathBuf>, user: Option<IgnoreMatcher>) -> Self {
        PathFilter {
            root: root.into(),
            builtin: IgnoreMatcher::builtin(),
            user,
        }
    }

    /// Built-in rules plus `.pinpointignore` from the project root, if any.
    pub fn for_project(root: &Path) -> Result<Self> {
        let ignore_file = root.join(IGNORE_FILE);
        let user = if ignore_file.is_file() {
            let matcher = IgnoreMatcher::from_file(&ignore_file)?;
            tracing::debug!(path = %ignore_file.display(), patterns = matcher.len(), "loaded ignore file");
            Some(matcher)
        } else {
            None
        };
        Ok(Self::new(root, user))
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Whether a file (absolute or root-relative) should be deployed.
    pub fn accepts(&self, path: &Path) -> bool {
        self.check(path, false)
    }

    /// Whether the walker should descend into a directory.
    pub fn accepts_dir(&self, path: &Path) -> bool {
        self.check(path, true)
    }

    fn check(&self, path: &Path, is_dir: bool) -> bool {
        let Some(relative) = relative_slash_path(&self.root, path) else {
            return false;
        };
        if relative.is_empty() {
            // the root itself
            return true;
        }
        let excluded_by = |m: &IgnoreMatcher| {
            if is_dir {
                m.matches_dir(&relative)
            } else {
                m.matches(&relative)
            }
        };
        if self.user.as_ref().is_some_and(|m| excluded_by(m)) {
            return false;
        }
        !excluded_by(&self.builtin)
    }
}

/// Path of `path` relative to `root`, joined with `/`. Relative inputs are
/// taken as already relative to the root.
pub fn relative_slash_path(root: &Path, path: &Path) -> Option<String> {
    let relative = if path.is_absolute() {
        path.strip_prefix(root).ok()?
    } else {
        path
    };
    let mut parts = Vec::new();
    for component in relative.components() {
        match component {
            Component::Normal(part) => parts.push(part.to_string_lossy().into_owned()),
            Component::CurDir => {}
            _ => return None,
        }
    }
    Some(parts.join("/"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_lines_are_ignored() {
        let m = IgnoreMatcher::new("\n  \n*.log\n\t\n").unwrap();
        assert_eq!(m.len(), 1);
        assert!(m.matches("debug.log"));
        assert!(!m.matches("index.html"));
    }

    #[test]
    fn star_does_not_cross_directories() {
        let m = IgnoreMatcher::new("*.log").unwrap();
        assert!(m.matches("a.log"));
        assert!(!m.matches("logs/a.log"));

        let m = IgnoreMatcher::new("**/*.log").unwrap();
        assert!(m.matches("a.log"));
        assert!(m.matches("logs/deep/a.log"));
    }

    #[test]
    fn builtins_cover_dependency_and_vcs_dirs() {
        let b = IgnoreMatcher::builtin();
        assert!(b.matches("node_modules/pkg/index.js"));
        assert!(b.matches(".git/HEAD"));
        assert!(b.matches("README.md"));
        assert!(b.matches("pinpoint.config.js"));
        assert!(b.matches("dist/bundle.zip"));
        assert!(b.matches_dir("node_modules"));
        assert!(b.matches_dir(".next"));
        assert!(!b.matches("index.html"));
        assert!(!b.matches_dir("src"));
    }

    #[test]
    fn user_file_cannot_reinclude_builtins() {
        // A negation or an unrelated rule has no way to bring node_modules back.
        let user = IgnoreMatcher::new("!node_modules/**\n*.tmp").unwrap();
        let filter = PathFilter::new("/project", Some(user));
        assert!(!filter.accepts(Path::new("/project/node_modules/pkg/index.js")));
        assert!(!filter.accepts_dir(Path::new("/project/node_modules")));
        assert!(!filter.accepts(Path::new("/project/scratch.tmp")));
        assert!(filter.accepts(Path::new("/project/index.html")));
    }

    #[test]
    fn paths_outside_root_are_rejected() {
        let filter = PathFilter::new("/project", None);
        assert!(!filter.accepts(Path::new("/elsewhere/index.html")));
        assert!(filter.accepts(Path::new("src/app.js")));
    }

    #[test]
    fn relative_paths_use_forward_slashes() {
        let root = Path::new("/project");
        let path = root.join("a").join("b").join("c.txt");
        assert_eq!(relative_slash_path(root, &path).as_deref(), Some("a/b/c.txt"));
        assert_eq!(relative_slash_path(root, root).as_deref(), Some(""));
    }
}
