use std::io::{ErrorKind, Write};
use std::path::{Component, Path, PathBuf};

use anyhow::Context;

use crate::error::GuardError;

/// Longest sanitized filename kept, in bytes.
pub const MAX_FILENAME_LEN: usize = 128;

/// Extensions allowed to carry over onto a generated name.
const GENERATED_EXTENSIONS: &[&str] = &[
    "pdf", "txt", "csv", "json", "png", "jpg", "jpeg", "gif", "zip", "log",
];

const MAX_EXTENSION_LEN: usize = 16;
const MAX_RENAME_ATTEMPTS: usize = 8;

/// A file persisted under the upload root.
#[derive(Debug, Clone)]
pub struct StoredFileEntry {
    pub filename: String,
    pub path: PathBuf,
    pub size: u64,
}

/// Fixed upload directory. All writes land directly inside it.
#[derive(Debug, Clone)]
pub struct UploadRoot {
    root: PathBuf,
    max_bytes: u64,
}

impl UploadRoot {
    /// Create the directory if needed and pin its canonical path.
    pub fn new(dir: &Path, max_bytes: u64) -> anyhow::Result<Self> {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("failed to create upload root {}", dir.display()))?;
        let root = std::fs::canonicalize(dir)
            .with_context(|| format!("failed to resolve upload root {}", dir.display()))?;
        Ok(Self { root, max_bytes })
    }

    pub fn path(&self) -> &Path {
        &self.root
    }

    pub fn max_bytes(&self) -> u64 {
        self.max_bytes
    }

    /// Sanitize `raw_filename`, then write `content` atomically under the root.
    ///
    /// Existing files are never replaced; a colliding name gets a random suffix.
    pub fn confine_upload(
        &self,
        raw_filename: &str,
        content: &[u8],
    ) -> Result<StoredFileEntry, GuardError> {
        if content.len() as u64 > self.max_bytes {
            tracing::warn!(size = content.len(), max = self.max_bytes, "upload too large");
            return Err(GuardError::TooLarge);
        }

        let base = sanitize_filename(raw_filename).unwrap_or_else(|| generated_name(raw_filename));
        // Validate before touching the disk.
        self.resolve(&base)?;

        let mut tmp = tempfile::Builder::new()
            .prefix(".upload-")
            .suffix(".part")
            .tempfile_in(&self.root)
            .map_err(GuardError::internal)?;
        tmp.write_all(content).map_err(GuardError::internal)?;
        tmp.as_file().sync_all().map_err(GuardError::internal)?;

        let mut name = base.clone();
        let mut attempts = 0;
        let target = loop {
            let target = self.resolve(&name)?;
            match tmp.persist_noclobber(&target) {
                Ok(_) => break target,
                Err(e) if e.error.kind() == ErrorKind::AlreadyExists
                    && attempts < MAX_RENAME_ATTEMPTS =>
                {
                    tmp = e.file;
                    attempts += 1;
                    name = unique_variant(&base);
                }
                Err(e) => return Err(GuardError::internal(e.error)),
            }
        };

        self.verify_confined(&target)?;

        tracing::info!(
            raw = ?raw_filename,
            stored = %name,
            size = content.len(),
            "upload stored"
        );

        Ok(StoredFileEntry {
            filename: name,
            path: target,
            size: content.len() as u64,
        })
    }

    /// Join a bare filename to the root; anything that is not exactly one
    /// normal component is an escape attempt.
    fn resolve(&self, name: &str) -> Result<PathBuf, GuardError> {
        let mut components = Path::new(name).components();
        match (components.next(), components.next()) {
            (Some(Component::Normal(part)), None) if part == name => Ok(self.root.join(part)),
            _ => {
                tracing::warn!(name = ?name, "rejected upload path");
                Err(GuardError::PathEscape)
            }
        }
    }

    /// Post-write check that the stored file resolves inside the root.
    fn verify_confined(&self, target: &Path) -> Result<(), GuardError> {
        let resolved = std::fs::canonicalize(target).map_err(GuardError::internal)?;
        if resolved.parent() == Some(self.root.as_path()) {
            return Ok(());
        }

        tracing::error!(path = %resolved.display(), "stored upload resolved outside root");
        if let Err(e) = std::fs::remove_file(target) {
            tracing::warn!(error = %e, "failed to remove escaped upload");
        }
        Err(GuardError::PathEscape)
    }
}

/// Reduce a client filename to a safe base name, or `None` if nothing
/// usable remains.
pub fn sanitize_filename(raw: &str) -> Option<String> {
    let base = raw.rsplit(|c| c == '/' || c == '\\').next().unwrap_or_default();

    let mapped: String = base
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect();

    let trimmed = mapped.trim_matches('.');
    if !trimmed.bytes().any(|b| b.is_ascii_alphanumeric()) {
        return None;
    }

    Some(truncate_name(trimmed))
}

/// Cut to `MAX_FILENAME_LEN`, keeping a short extension. Input is ASCII.
fn truncate_name(name: &str) -> String {
    if name.len() <= MAX_FILENAME_LEN {
        return name.to_string();
    }

    match name.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() && ext.len() <= MAX_EXTENSION_LEN => {
            let keep = MAX_FILENAME_LEN - ext.len() - 1;
            format!("{}.{ext}", &stem[..keep.min(stem.len())])
        }
        // The cut can land just after a dot; a stored name never ends in one.
        _ => name[..MAX_FILENAME_LEN].trim_end_matches('.').to_string(),
    }
}

fn generated_name(raw: &str) -> String {
    let id = uuid::Uuid::new_v4().simple().to_string();
    match whitelisted_extension(raw) {
        Some(ext) => format!("{id}.{ext}"),
        None => id,
    }
}

fn whitelisted_extension(raw: &str) -> Option<String> {
    let (_, ext) = raw.rsplit_once('.')?;
    let ext = ext.to_ascii_lowercase();
    GENERATED_EXTENSIONS.contains(&ext.as_str()).then_some(ext)
}

fn unique_variant(base: &str) -> String {
    let suffix = &uuid::Uuid::new_v4().simple().to_string()[..8];
    let name = match base.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() => format!("{stem}-{suffix}.{ext}"),
        _ => format!("{base}-{suffix}"),
    };
    truncate_name(&name)
}
