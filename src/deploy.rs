// Deploy command: package the project and upload it to Pinpoint.
//
// locate config -> build ignore filter -> walk files -> build archive ->
// confirm -> upload -> report the deployment URL
//
// The archive lives in a `NamedTempFile` owned by `run`, so it is removed on
// every way out of this function.

use crate::api::RequestOptions;
use crate::archive;
use crate::context::Context;
use crate::error::{PinpointError, Result};
use crate::ignore::PathFilter;
use crate::ui::{self, Prompter, Spinner, UploadBar};
use crate::walker;
use serde::Deserialize;
use std::path::Path;

/// Archives larger than this get a progress bar instead of a spinner.
pub const PROGRESS_BAR_THRESHOLD: u64 = 1024 * 1024;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeployOutcome {
    Deployed { id: String, url: String },
    /// `--dry-run`: packaged but not uploaded.
    DryRun { files: usize, bytes: u64 },
    /// The user answered "no" at the confirmation prompt.
    Declined,
}

#[derive(Debug, Deserialize)]
struct DeploymentResult {
    id: String,
}

/// Status page for a deployment. Edge and local API hosts report to the
/// staging dashboard.
pub fn deployment_url(apihost: &str, slug: &str, id: &str) -> String {
    let base = if apihost.contains(".edge.") || apihost.contains("localhost") {
        "https://app.pinpoint.dev"
    } else {
        "https://app.pinpoint.com"
    };
    format!("{base}/{slug}/deployments/{id}")
}

pub fn run(ctx: &Context, prompter: &dyn Prompter) -> Result<DeployOutcome> {
    let project = ctx.project()?.clone();
    let root = project.root.as_path();

    let spinner = Spinner::start("Creating deployment package ...");
    let packaged = package(root, ctx.settings.temp_dir.as_deref());
    let (tmp, summary) = match packaged {
        Ok(p) => p,
        Err(e) => {
            spinner.clear();
            return Err(e);
        }
    };
    spinner.succeed(&format!(
        "Created deployment package ({} files, {})",
        summary.entries,
        ui::format_bytes(summary.bytes)
    ));

    if ctx.settings.dry_run {
        tracing::info!(files = summary.entries, bytes = summary.bytes, "dry run, skipping upload");
        return Ok(DeployOutcome::DryRun {
            files: summary.entries,
            bytes: summary.bytes,
        });
    }

    if !ctx.settings.non_interactive() {
        let question = format!("Deploy {} to {}?", ui::format_bytes(summary.bytes), project.display_slug());
        if !prompter.confirm(&question, true)?.or_cancel()? {
            return Ok(DeployOutcome::Declined);
        }
    }

    let path = format!("/site/{}/deployment", project.site_id);
    let body = if summary.bytes > PROGRESS_BAR_THRESHOLD {
        let bar = UploadBar::start("Uploading");
        let result = ctx.upload(
            "Uploading deployment",
            &path,
            tmp.path(),
            Some(bar.sink()),
            RequestOptions::default().required().quiet(),
        );
        bar.finish();
        let body = result?;
        ui::tick("Uploaded deployment");
        body
    } else {
        ctx.upload(
            "Uploading deployment",
            &path,
            tmp.path(),
            None,
            RequestOptions::default().required(),
        )?
    };

    let result: DeploymentResult = serde_json::from_value(body)
        .map_err(|_| PinpointError::Fatal("Pinpoint did not return a deployment id".to_string()))?;
    let url = deployment_url(ctx.apihost(), project.display_slug(), &result.id);
    tracing::info!(id = %result.id, %url, "deployed");
    Ok(DeployOutcome::Deployed { id: result.id, url })
}

fn package(root: &Path, temp_dir: Option<&Path>) -> Result<(tempfile::NamedTempFile, archive::ArchiveSummary)> {
    let filter = PathFilter::for_project(root)?;
    let files = walker::walk(&filter)?;
    archive::build_temp(&files, root, temp_dir)
}
