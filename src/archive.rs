// Zip packaging of the files selected for a deployment.

use crate::error::{PinpointError, Result};
use crate::ignore::relative_slash_path;
use std::fs::File;
use std::io::{self, Seek, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipWriter};

/// What ended up in a built archive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveSummary {
    pub entries: usize,
    /// Size of the finished archive in bytes.
    pub bytes: u64,
}

/// Write `files` into a zip on `dest`, each under its path relative to
/// `root`. Files directly in `root` get no directory prefix.
pub fn build<W: Write + Seek>(files: &[PathBuf], root: &Path, dest: W) -> Result<ArchiveSummary> {
    let mut zip = ZipWriter::new(dest);
    let options = FileOptions::default().compression_method(CompressionMethod::Deflated);

    for path in files {
        let name = relative_slash_path(root, path).filter(|n| !n.is_empty()).ok_or_else(|| {
            PinpointError::Io(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("{} is not inside {}", path.display(), root.display()),
            ))
        })?;
        tracing::debug!(entry = %name, "adding to archive");
        zip.start_file(name, options)?;
        let mut source = File::open(path)?;
        io::copy(&mut source, &mut zip)?;
    }

    let mut dest = zip.finish()?;
    let bytes = dest.stream_position()?;
    Ok(ArchiveSummary {
        entries: files.len(),
        bytes,
    })
}

/// Build the archive into a fresh temporary file outside the project, in
/// `dir` or the system temp directory.
///
/// The file is removed when the returned handle is dropped, whether the
/// deployment succeeded or not.
pub fn build_temp(
    files: &[PathBuf],
    root: &Path,
    dir: Option<&Path>,
) -> Result<(NamedTempFile, ArchiveSummary)> {
    let mut builder = tempfile::Builder::new();
    builder.prefix("pinpoint-").suffix(".zip");
    let mut tmp = match dir {
        Some(dir) => builder.tempfile_in(dir)?,
        None => builder.tempfile()?,
    };
    let summary = build(files, root, tmp.as_file_mut())?;
    tracing::debug!(path = %tmp.path().display(), bytes = summary.bytes, "created deployment package");
    Ok((tmp, summary))
}
