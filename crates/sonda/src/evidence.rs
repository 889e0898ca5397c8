//! Evidence Recorder: screenshots on disk.
//!
//! Layout: `{root}/{run}/{probe}/{step:02}-{label}.png`, where `{run}` is a
//! timestamped run directory unless the output is explicitly shared (then
//! the run level is omitted). Files are created with `create_new`, so an
//! existing artifact is never overwritten: a repeated label, or a name that
//! already exists on disk, gets `-2`, `-3`, ... appended.

use crate::driver::CaptureMode;
use crate::result::{SondaError, SondaResult};
use crate::session::Session;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tracing::{info, warn};

/// Give up after this many suffixes for one name
const MAX_SUFFIX: usize = 1000;

/// How runs are separated under the output root
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RunScope {
    /// Each run writes below its own run directory
    Timestamped(String),
    /// Runs write straight into the output root
    Shared,
}

/// Where evidence goes
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvidenceConfig {
    /// Output root
    pub output_root: PathBuf,
    /// Run separation
    pub scope: RunScope,
}

impl EvidenceConfig {
    /// Run-scoped output below `output_root`, with a fresh run id
    #[must_use]
    pub fn new(output_root: impl Into<PathBuf>) -> Self {
        Self {
            output_root: output_root.into(),
            scope: RunScope::Timestamped(new_run_id()),
        }
    }

    /// Write straight into the output root, shared with other runs
    #[must_use]
    pub fn shared(mut self) -> Self {
        self.scope = RunScope::Shared;
        self
    }

    /// Use a fixed run id
    #[must_use]
    pub fn with_run_id(mut self, run_id: impl Into<String>) -> Self {
        self.scope = RunScope::Timestamped(run_id.into());
        self
    }

    /// Directory holding every probe of this run
    #[must_use]
    pub fn run_dir(&self) -> PathBuf {
        match &self.scope {
            RunScope::Timestamped(run) => self.output_root.join(run),
            RunScope::Shared => self.output_root.clone(),
        }
    }
}

impl Default for EvidenceConfig {
    fn default() -> Self {
        Self::new("sonda-evidence")
    }
}

fn new_run_id() -> String {
    let stamp = chrono::Local::now().format("%Y%m%d-%H%M%S");
    let nonce = uuid::Uuid::new_v4().simple().to_string();
    format!("{stamp}-{}", &nonce[..8])
}

/// One saved screenshot
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvidenceArtifact {
    /// File path
    pub path: PathBuf,
    /// Capture extent
    pub mode: CaptureMode,
    /// Logical step label as given by the caller
    pub label: String,
    /// 1-based capture index within the probe
    pub step: usize,
    /// Image width in pixels
    pub width: u32,
    /// Image height in pixels
    pub height: u32,
}

/// Lower-case a label into `[a-z0-9-]`, collapsing runs of anything else
#[must_use]
pub fn slugify(label: &str) -> String {
    let mut slug = String::with_capacity(label.len());
    for c in label.chars() {
        if c.is_ascii_alphanumeric() {
            slug.push(c.to_ascii_lowercase());
        } else if !slug.is_empty() && !slug.ends_with('-') {
            slug.push('-');
        }
    }
    while slug.ends_with('-') {
        slug.pop();
    }
    if slug.is_empty() {
        slug.push_str("step");
    }
    slug
}

/// Writes the screenshots of one probe
#[derive(Debug)]
pub struct EvidenceRecorder {
    dir: PathBuf,
    probe: String,
    step: usize,
    seen: HashMap<String, usize>,
}

impl EvidenceRecorder {
    /// Recorder for `probe` under `config`
    #[must_use]
    pub fn new(config: &EvidenceConfig, probe: &str) -> Self {
        Self {
            dir: config.run_dir().join(slugify(probe)),
            probe: probe.to_string(),
            step: 0,
            seen: HashMap::new(),
        }
    }

    /// Directory this probe writes to
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Capture a screenshot and save it
    ///
    /// # Errors
    ///
    /// Returns error if the screenshot fails or the file cannot be written
    pub async fn capture(
        &mut self,
        session: &Session,
        mode: CaptureMode,
        label: &str,
    ) -> SondaResult<EvidenceArtifact> {
        let png = session.screenshot(mode).await?;
        self.save(&png, mode, label).await
    }

    /// Save already-encoded PNG bytes as the next step
    ///
    /// # Errors
    ///
    /// Returns error if the bytes are not an image or cannot be written
    pub async fn save(
        &mut self,
        png: &[u8],
        mode: CaptureMode,
        label: &str,
    ) -> SondaResult<EvidenceArtifact> {
        let decoded = image::load_from_memory(png)?;
        tokio::fs::create_dir_all(&self.dir).await?;

        self.step += 1;
        let slug = slugify(label);
        let repeat = {
            let seen = self.seen.entry(slug.clone()).or_insert(0);
            *seen += 1;
            *seen
        };
        let base = format!("{:02}-{slug}", self.step);

        let path = write_new(&self.dir, &base, repeat, png).await?;
        info!(probe = %self.probe, path = %path.display(), %mode, "evidence captured");
        Ok(EvidenceArtifact {
            path,
            mode,
            label: label.to_string(),
            step: self.step,
            width: decoded.width(),
            height: decoded.height(),
        })
    }
}

/// Create `{base}.png`, or `{base}-{n}.png` for the first free `n >= 2`
/// when the label repeated or the file already exists
async fn write_new(dir: &Path, base: &str, repeat: usize, bytes: &[u8]) -> SondaResult<PathBuf> {
    let mut suffix = repeat;
    while suffix < MAX_SUFFIX {
        let name = if suffix <= 1 {
            format!("{base}.png")
        } else {
            format!("{base}-{suffix}.png")
        };
        let path = dir.join(name);
        match tokio::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .await
        {
            Ok(file) => {
                fill_or_discard(file, &path, bytes).await?;
                return Ok(path);
            }
            Err(e) if e.kind() == ErrorKind::AlreadyExists => suffix = suffix.max(1) + 1,
            Err(e) => return Err(e.into()),
        }
    }
    Err(SondaError::evidence(format!(
        "no free file name for {base} in {}",
        dir.display()
    )))
}

/// Write `bytes` to a freshly created `file` at `path`; on failure the
/// partial file is removed so no truncated artifact is left behind
async fn fill_or_discard<W>(mut file: W, path: &Path, bytes: &[u8]) -> SondaResult<()>
where
    W: AsyncWrite + Unpin,
{
    let written = match file.write_all(bytes).await {
        Ok(()) => file.flush().await,
        Err(e) => Err(e),
    };
    if let Err(e) = written {
        drop(file);
        warn!(path = %path.display(), error = %e, "screenshot write failed");
        tokio::fs::remove_file(path).await.ok();
        return Err(e.into());
    }
    Ok(())
}

impl Session {
    /// PNG screenshot of the current page
    pub async fn screenshot(&self, mode: CaptureMode) -> SondaResult<Vec<u8>> {
        let driver = self.driver()?;
        self.bounded("screenshot", driver.screenshot(mode)).await
    }
}
