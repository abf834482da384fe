#![allow(dead_code)]

use pinpoint::api::ApiClient;
use pinpoint::credentials::{now_millis, ApiKey, UserCredentials, CREDENTIALS_FILE};
use pinpoint::identity::Identity;
use pinpoint::ui::{Answer, Prompter, Validator};
use pinpoint::{Context, Result, Settings};
use std::cell::RefCell;
use std::collections::VecDeque;
use tempfile::TempDir;

/// One scripted reply to a prompt.
#[derive(Debug, Clone)]
pub enum Reply {
    Confirm(bool),
    Text(&'static str),
    Select(usize),
    Cancel,
}

/// `Prompter` that plays back a fixed list of replies and records the
/// questions it was asked. Text replies that fail validation are dropped and
/// the next reply is used, like a re-prompt.
#[derive(Default)]
pub struct ScriptedPrompter {
    replies: RefCell<VecDeque<Reply>>,
    pub asked: RefCell<Vec<String>>,
    pub rejected: RefCell<Vec<String>>,
}

impl ScriptedPrompter {
    pub fn new(replies: impl IntoIterator<Item = Reply>) -> Self {
        ScriptedPrompter {
            replies: RefCell::new(replies.into_iter().collect()),
            ..Default::default()
        }
    }

    fn next(&self, message: &str) -> Reply {
        self.asked.borrow_mut().push(message.to_string());
        self.replies
            .borrow_mut()
            .pop_front()
            .unwrap_or_else(|| panic!("unexpected prompt: {message}"))
    }

    pub fn remaining(&self) -> usize {
        self.replies.borrow().len()
    }
}

impl Prompter for ScriptedPrompter {
    fn confirm(&self, message: &str, _default: bool) -> Result<Answer<bool>> {
        match self.next(message) {
            Reply::Confirm(v) => Ok(Answer::Value(v)),
            Reply::Cancel => Ok(Answer::Cancelled),
            other => panic!("expected a confirm reply for {message:?}, got {other:?}"),
        }
    }

    fn text(&self, message: &str, _initial: Option<&str>, validate: Validator<'_>) -> Result<Answer<String>> {
        loop {
            match self.next(message) {
                Reply::Text(v) => match validate(v) {
                    Some(reason) => self.rejected.borrow_mut().push(reason),
                    None => return Ok(Answer::Value(v.to_string())),
                },
                Reply::Cancel => return Ok(Answer::Cancelled),
                other => panic!("expected a text reply for {message:?}, got {other:?}"),
            }
        }
    }

    fn select(&self, message: &str, items: &[String]) -> Result<Answer<usize>> {
        match self.next(message) {
            Reply::Select(i) => {
                assert!(i < items.len(), "select index {i} out of {items:?}");
                Ok(Answer::Value(i))
            }
            Reply::Cancel => Ok(Answer::Cancelled),
            other => panic!("expected a select reply for {message:?}, got {other:?}"),
        }
    }
}

/// Scratch directories for one test: the project, the user's home (for the
/// credential file) and where deployment archives get staged.
pub struct Workspace {
    pub project: TempDir,
    pub home: TempDir,
    pub staging: TempDir,
}

impl Workspace {
    pub fn new() -> Self {
        Workspace {
            project: TempDir::new().unwrap(),
            home: TempDir::new().unwrap(),
            staging: TempDir::new().unwrap(),
        }
    }

    /// A small static site with a dependency tree and a git directory.
    pub fn site(site_id: &str, slug: &str) -> Self {
        let ws = Self::new();
        ws.write(
            "pinpoint.config.js",
            &format!("module.exports = {{\n  siteId: \"{site_id}\",\n  slug: \"{slug}\",\n}};\n"),
        );
        ws.write("index.html", "<!doctype html><h1>hello</h1>");
        ws.write("node_modules/pkg/index.js", "module.exports = 1;");
        ws.write(".git/HEAD", "ref: refs/heads/main");
        ws
    }

    pub fn write(&self, relative: &str, contents: &str) {
        let path = self.project.path().join(relative);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, contents).unwrap();
    }

    pub fn credentials_path(&self) -> std::path::PathBuf {
        self.home.path().join(CREDENTIALS_FILE)
    }

    pub fn settings(&self, host: &str) -> Settings {
        let mut settings = Settings::new(self.project.path());
        settings.host = host.to_string();
        settings.credentials_path = self.credentials_path();
        settings.temp_dir = Some(self.staging.path().to_path_buf());
        settings
    }

    pub fn context(&self, settings: Settings) -> Context {
        let api = ApiClient::new("http://127.0.0.1:9/unused")
            .unwrap()
            .with_identity(Identity {
                ip: "198.51.100.7".into(),
                machine: "ci-runner (linux x86_64)".into(),
            });
        Context::with_api(settings, api)
    }

    pub fn staged_files(&self) -> usize {
        std::fs::read_dir(self.staging.path()).unwrap().count()
    }
}

pub fn session(email: &str, sites: &[&str], key: &str) -> UserCredentials {
    UserCredentials {
        email: email.to_string(),
        site_ids: sites.iter().map(|s| s.to_string()).collect(),
        apikey: ApiKey {
            value: key.to_string(),
            expires: now_millis() + 60 * 60 * 1000,
        },
    }
}

pub fn login_as(ctx: &Context, user_id: &str, creds: UserCredentials) {
    ctx.credentials
        .save_api_key(ctx.apihost(), user_id, Some(creds))
        .unwrap();
}
