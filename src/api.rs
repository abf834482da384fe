// API client module: a small blocking HTTP client for the Pinpoint API.
// Every response is a JSON envelope `{ success, message?, error?, ... }`;
// requests show a spinner while in flight and resolve it with the outcome.

use crate::error::{PinpointError, Result};
use crate::identity::{self, Identity};
use crate::retry::RetryPolicy;
use crate::ui::{ProgressFn, Spinner};
use reqwest::blocking::{multipart, Client, RequestBuilder, Response};
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};
use reqwest::{Method, StatusCode};
use serde_json::Value;
use std::fs::File;
use std::io::Read;
use std::path::Path;
use std::sync::OnceLock;

pub const IP_HEADER: &str = "x-pinpoint-ip";
pub const MACHINE_HEADER: &str = "x-pinpoint-machine";

/// Field name the upload endpoint expects the archive under.
pub const UPLOAD_FIELD: &str = "upload";

const DEFAULT_FAILURE: &str = "Internal Server Error";

/// Extra success check run on a successful envelope. Returns whether the
/// response is really a success and the message to show either way.
pub type CheckSuccess<'a> = &'a dyn Fn(&Value) -> (bool, String);

/// Decoded response envelope.
#[derive(Debug, Clone, PartialEq)]
pub enum Envelope {
    Success(Value),
    Failure { message: String },
}

impl Envelope {
    pub fn decode(body: Value) -> Self {
        if body.get("success").and_then(Value::as_bool) == Some(true) {
            return Envelope::Success(body);
        }
        let message = ["message", "error"]
            .iter()
            .filter_map(|key| body.get(*key).and_then(Value::as_str))
            .find(|m| !m.is_empty())
            .unwrap_or(DEFAULT_FAILURE)
            .to_string();
        Envelope::Failure { message }
    }
}

/// Per-request knobs. `fail_on_error` defaults to true.
pub struct RequestOptions<'a> {
    pub body: Option<Value>,
    /// Only honored when there is a body; body-less requests are GETs.
    pub method: Option<Method>,
    pub api_key: Option<String>,
    pub api_key_required: bool,
    pub fail_on_error: bool,
    pub check_success: Option<CheckSuccess<'a>>,
    pub quiet: bool,
}

impl Default for RequestOptions<'_> {
    fn default() -> Self {
        RequestOptions {
            body: None,
            method: None,
            api_key: None,
            api_key_required: false,
            fail_on_error: true,
            check_success: None,
            quiet: false,
        }
    }
}

impl<'a> RequestOptions<'a> {
    pub fn json(body: Value) -> Self {
        RequestOptions {
            body: Some(body),
            ..Self::default()
        }
    }

    pub fn method(mut self, method: Method) -> Self {
        self.method = Some(method);
        self
    }

    pub fn api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    pub fn required(mut self) -> Self {
        self.api_key_required = true;
        self
    }

    /// Report failures to the caller instead of ending the command.
    pub fn non_fatal(mut self) -> Self {
        self.fail_on_error = false;
        self
    }

    pub fn check(mut self, check: CheckSuccess<'a>) -> Self {
        self.check_success = Some(check);
        self
    }

    pub fn quiet(mut self) -> Self {
        self.quiet = true;
        self
    }

    fn resolved_method(&self) -> Method {
        match (&self.body, &self.method) {
            (Some(_), Some(m)) => m.clone(),
            (Some(_), None) => Method::POST,
            (None, _) => Method::GET,
        }
    }
}

/// Blocking API client. Holds the HTTP client, the retry policy and the
/// caller identity, which is looked up once on first use.
pub struct ApiClient {
    client: Client,
    retry: RetryPolicy,
    ip_lookup_url: String,
    identity: OnceLock<Identity>,
}

impl ApiClient {
    pub fn new(ip_lookup_url: impl Into<String>) -> Result<Self> {
        let client = Client::builder()
            .user_agent(concat!("pinpoint-cli/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(ApiClient {
            client,
            retry: RetryPolicy::default(),
            ip_lookup_url: ip_lookup_url.into(),
            identity: OnceLock::new(),
        })
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Use a known identity instead of looking it up.
    pub fn with_identity(self, identity: Identity) -> Self {
        // A fresh OnceLock is always empty.
        let _ = self.identity.set(identity);
        self
    }

    /// IP and machine description, computed on the first call only.
    pub fn identity(&self) -> &Identity {
        self.identity
            .get_or_init(|| identity::lookup(&self.client, &self.ip_lookup_url))
    }

    /// `https://<host><path>`; hosts that already carry a scheme are kept.
    pub fn url(host: &str, path: &str) -> String {
        let host = host.trim_end_matches('/');
        if host.starts_with("http://") || host.starts_with("https://") {
            format!("{host}{path}")
        } else {
            format!("https://{host}{path}")
        }
    }

    fn prepare(&self, method: Method, url: &str, api_key: Option<&str>) -> RequestBuilder {
        let identity = self.identity();
        let mut req = self
            .client
            .request(method, url)
            .header(IP_HEADER, header_safe(&identity.ip))
            .header(MACHINE_HEADER, header_safe(&identity.machine));
        if let Some(key) = api_key {
            req = req.header(AUTHORIZATION, format!("Bearer {key}"));
        }
        req
    }

    /// JSON request. Bad gateway responses are retried per the policy.
    ///
    /// `api_key` is the already-resolved key; the `Context` does the
    /// lookup and the "not logged in" check before calling this.
    pub fn request(
        &self,
        host: &str,
        purpose: &str,
        path: &str,
        api_key: Option<&str>,
        opts: &RequestOptions<'_>,
    ) -> Result<Value> {
        let spinner = spinner_for(purpose, opts);
        let method = opts.resolved_method();
        let url = Self::url(host, path);
        tracing::debug!(%method, %url, "requesting");

        let sent = self.retry.run(
            || {
                let mut req = self.prepare(method.clone(), &url, api_key);
                if let Some(body) = &opts.body {
                    req = req
                        .header(CONTENT_TYPE, "application/json")
                        .body(serde_json::to_vec(body)?);
                }
                Ok(req.send()?)
            },
            |res: &Response| res.status() == StatusCode::BAD_GATEWAY,
            std::thread::sleep,
        );

        let outcome = sent.and_then(|res| read_body(res, &method, &url));
        self.interpret(&spinner, purpose, outcome, opts)
    }

    /// Multipart upload of `file` under the `upload` field. Progress is
    /// reported to `on_progress` as the file is streamed; uploads are never
    /// retried.
    #[allow(clippy::too_many_arguments)]
    pub fn upload(
        &self,
        host: &str,
        purpose: &str,
        path: &str,
        api_key: Option<&str>,
        file: &Path,
        on_progress: Option<ProgressFn>,
        opts: &RequestOptions<'_>,
    ) -> Result<Value> {
        let spinner = spinner_for(purpose, opts);
        let url = Self::url(host, path);
        tracing::debug!(method = "POST", %url, file = %file.display(), "uploading");

        let outcome = (|| -> Result<Value> {
            let source = File::open(file)?;
            let total = source.metadata()?.len();
            let reader = ProgressReader::new(source, total, on_progress);
            let file_name = file
                .file_name()
                .and_then(|s| s.to_str())
                .unwrap_or("deployment.zip")
                .to_string();
            let part = multipart::Part::reader_with_length(reader, total)
                .file_name(file_name)
                .mime_str("application/zip")?;
            let form = multipart::Form::new().part(UPLOAD_FIELD, part);
            let res = self.prepare(Method::POST, &url, api_key).multipart(form).send()?;
            read_body(res, &Method::POST, &url)
        })();

        self.interpret(&spinner, purpose, outcome, opts)
    }

    fn interpret(
        &self,
        spinner: &Spinner,
        purpose: &str,
        outcome: Result<Value>,
        opts: &RequestOptions<'_>,
    ) -> Result<Value> {
        let body = match outcome {
            Ok(body) => body,
            Err(err) if opts.fail_on_error => return Err(fail(spinner, err.to_string(), true)),
            Err(err) => {
                spinner.fail(&err.to_string());
                return Err(err);
            }
        };

        let message = match Envelope::decode(body) {
            Envelope::Success(payload) => {
                let (ok, message) = match opts.check_success {
                    Some(check) => check(&payload),
                    None => (true, purpose.to_string()),
                };
                if ok {
                    spinner.succeed(&message);
                    return Ok(payload);
                }
                message
            }
            Envelope::Failure { message } => message,
        };

        Err(fail(spinner, message, opts.fail_on_error))
    }
}

/// Resolve the spinner for a failed request. Fatal failures are printed once
/// by the binary's `Error: ` line, so their spinner is only cleared.
fn fail(spinner: &Spinner, message: String, fail_on_error: bool) -> PinpointError {
    if fail_on_error {
        spinner.clear();
        PinpointError::Fatal(message)
    } else {
        spinner.fail(&message);
        PinpointError::Api(message)
    }
}

fn spinner_for(purpose: &str, opts: &RequestOptions<'_>) -> Spinner {
    if opts.quiet {
        Spinner::quiet()
    } else {
        Spinner::start(purpose)
    }
}

/// Read the whole response and parse it as JSON. A body that isn't JSON
/// decodes as `null`, which the envelope treats as a failure.
fn read_body(res: Response, method: &Method, url: &str) -> Result<Value> {
    let status = res.status();
    let bytes = res.bytes()?;
    let body: Value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    tracing::debug!(%method, %url, status = status.as_u16(), %body, "responded");
    Ok(body)
}

/// Header values must be visible ASCII.
fn header_safe(value: &str) -> String {
    value
        .chars()
        .map(|c| if c == ' ' || c.is_ascii_graphic() { c } else { '?' })
        .collect()
}

/// Reader that reports how much of the file has been sent.
struct ProgressReader<R> {
    inner: R,
    sent: u64,
    total: u64,
    on_progress: Option<ProgressFn>,
}

impl<R: Read> ProgressReader<R> {
    fn new(inner: R, total: u64, on_progress: Option<ProgressFn>) -> Self {
        ProgressReader {
            inner,
            sent: 0,
            total,
            on_progress,
        }
    }
}

impl<R: Read> Read for ProgressReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        let n = self.inner.read(buf)?;
        self.sent += n as u64;
        if let Some(report) = &self.on_progress {
            let fraction = if self.total == 0 {
                1.0
            } else {
                self.sent as f64 / self.total as f64
            };
            report(fraction.min(1.0));
        }
        Ok(n)
    }
}
