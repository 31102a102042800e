//! Disposable, rewritten copies of templates.
//!
//! A staged template lives in its own temporary directory, is copied with
//! normalized permissions, and has every canonical reference in its manifest
//! replaced by a `<scheme>:<absolute project root>` reference. The staging
//! directory is owned by [`StagedTemplate`] and removed when it is dropped or
//! closed, including on every failure path inside [`Stager::stage`].

use std::fmt;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use tempfile::TempDir;
use walkdir::WalkDir;

use crate::config::ReferenceConfig;
use crate::core::FailureKind;

pub const STAGING_DIR_PREFIX: &str = "template-test-";

#[cfg(unix)]
const DIR_MODE: u32 = 0o755;
#[cfg(unix)]
const FILE_MODE: u32 = 0o644;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagingFailure {
    pub kind: FailureKind,
    pub message: String,
}

impl StagingFailure {
    fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

impl fmt::Display for StagingFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}

impl std::error::Error for StagingFailure {}

#[derive(Debug)]
pub struct StagedTemplate {
    dir: TempDir,
    local_reference: String,
}

impl StagedTemplate {
    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    pub fn local_reference(&self) -> &str {
        &self.local_reference
    }

    /// Removes the staging directory, reporting any removal error.
    pub fn close(self) -> std::io::Result<()> {
        self.dir.close()
    }
}

#[derive(Debug, Clone)]
pub struct Stager {
    project_root: PathBuf,
    canonical: String,
    local_reference: String,
    manifest: String,
    temp_root: Option<PathBuf>,
}

impl Stager {
    pub fn new(project_root: &Path, reference: &ReferenceConfig) -> Result<Self> {
        let project_root = crate::platform::resolve_dir(project_root)
            .with_context(|| format!("failed to resolve project root: {}", project_root.display()))?;
        let root_s = project_root
            .to_str()
            .ok_or_else(|| anyhow!("project root is not valid UTF-8: {}", project_root.display()))?;
        let local_reference = local_reference(&reference.local_scheme, root_s);

        Ok(Self {
            project_root,
            canonical: reference.canonical.clone(),
            local_reference,
            manifest: reference.manifest.clone(),
            temp_root: None,
        })
    }

    #[cfg(test)]
    fn with_temp_root(mut self, temp_root: impl Into<PathBuf>) -> Self {
        self.temp_root = Some(temp_root.into());
        self
    }

    pub fn project_root(&self) -> &Path {
        &self.project_root
    }

    pub fn local_reference(&self) -> &str {
        &self.local_reference
    }

    pub fn manifest_name(&self) -> &str {
        &self.manifest
    }

    pub fn canonical_reference(&self) -> &str {
        &self.canonical
    }

    pub fn stage(&self, template_dir: &Path) -> Result<StagedTemplate, StagingFailure> {
        let dir = self.allocate()?;
        tracing::debug!(
            template = %template_dir.display(),
            staging_dir = %dir.path().display(),
            "staging template"
        );

        copy_tree(template_dir, dir.path())?;

        let manifest = dir.path().join(&self.manifest);
        if !manifest.is_file() {
            return Err(StagingFailure::new(
                FailureKind::MissingManifest,
                format!("{} not found in template", self.manifest),
            ));
        }

        let content = std::fs::read_to_string(&manifest).map_err(|e| {
            StagingFailure::new(
                FailureKind::ManifestUnreadable,
                format!("failed to read staged {}: {e}", self.manifest),
            )
        })?;
        let rewritten = rewrite_manifest(&content, &self.canonical, &self.local_reference)?;
        std::fs::write(&manifest, rewritten).map_err(|e| {
            StagingFailure::new(
                FailureKind::RewriteFailed,
                format!("failed to write staged {}: {e}", self.manifest),
            )
        })?;

        Ok(StagedTemplate {
            dir,
            local_reference: self.local_reference.clone(),
        })
    }

    fn allocate(&self) -> Result<TempDir, StagingFailure> {
        let mut builder = tempfile::Builder::new();
        builder.prefix(STAGING_DIR_PREFIX);
        let dir = match &self.temp_root {
            Some(root) => builder.tempdir_in(root),
            None => builder.tempdir(),
        };
        dir.map_err(|e| {
            StagingFailure::new(
                FailureKind::CopyFailed,
                format!("failed to create staging directory: {e}"),
            )
        })
    }
}

pub fn local_reference(scheme: &str, absolute_root: &str) -> String {
    format!("{scheme}:{absolute_root}")
}

/// Replaces every occurrence of `canonical` with `local`, failing unless the
/// result carries the local reference and no canonical reference.
pub fn rewrite_manifest(content: &str, canonical: &str, local: &str) -> Result<String, StagingFailure> {
    if !content.contains(canonical) {
        return Err(StagingFailure::new(
            FailureKind::RewriteFailed,
            format!("Failed to replace GitHub URL: {canonical} not present in manifest"),
        ));
    }

    let rewritten = content.replace(canonical, local);
    if !rewritten.contains(local) || rewritten.contains(canonical) {
        return Err(StagingFailure::new(
            FailureKind::RewriteFailed,
            format!("Failed to replace GitHub URL: {canonical} still present after rewrite"),
        ));
    }
    Ok(rewritten)
}

fn copy_tree(src: &Path, dst: &Path) -> Result<(), StagingFailure> {
    let copy_failed = |message: String| StagingFailure::new(FailureKind::CopyFailed, message);

    for entry in WalkDir::new(src)
        .follow_links(false)
        .min_depth(1)
        .sort_by_file_name()
    {
        let entry = entry.map_err(|e| copy_failed(format!("failed to walk template: {e}")))?;
        let rel = entry
            .path()
            .strip_prefix(src)
            .map_err(|e| copy_failed(format!("unexpected path {}: {e}", entry.path().display())))?;
        let target = dst.join(rel);
        let ft = entry.file_type();

        if ft.is_symlink() {
            return Err(copy_failed(format!(
                "symlinks are not supported in templates: {}",
                rel.display()
            )));
        }

        if ft.is_dir() {
            std::fs::create_dir(&target)
                .map_err(|e| copy_failed(format!("failed to create {}: {e}", rel.display())))?;
            set_mode(&target, DirOrFile::Dir)
                .map_err(|e| copy_failed(format!("failed to chmod {}: {e}", rel.display())))?;
            continue;
        }

        if !ft.is_file() {
            return Err(copy_failed(format!(
                "special files are not supported in templates: {}",
                rel.display()
            )));
        }

        if is_executable(&entry)
            .map_err(|e| copy_failed(format!("failed to stat {}: {e}", rel.display())))?
        {
            return Err(copy_failed(format!(
                "executable files are not supported in templates: {}",
                rel.display()
            )));
        }

        std::fs::copy(entry.path(), &target)
            .map_err(|e| copy_failed(format!("failed to copy {}: {e}", rel.display())))?;
        set_mode(&target, DirOrFile::File)
            .map_err(|e| copy_failed(format!("failed to chmod {}: {e}", rel.display())))?;
    }

    Ok(())
}

#[derive(Clone, Copy)]
enum DirOrFile {
    Dir,
    File,
}

#[cfg(unix)]
fn set_mode(path: &Path, kind: DirOrFile) -> std::io::Result<()> {
    use std::os::unix::fs::PermissionsExt;

    let mode = match kind {
        DirOrFile::Dir => DIR_MODE,
        DirOrFile::File => FILE_MODE,
    };
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(mode))
}

#[cfg(not(unix))]
fn set_mode(path: &Path, kind: DirOrFile) -> std::io::Result<()> {
    if let DirOrFile::File = kind {
        let mut perms = std::fs::metadata(path)?.permissions();
        perms.set_readonly(false);
        std::fs::set_permissions(path, perms)?;
    }
    Ok(())
}

#[cfg(unix)]
fn is_executable(entry: &walkdir::DirEntry) -> std::io::Result<bool> {
    use std::os::unix::fs::PermissionsExt;

    let meta = entry.metadata().map_err(std::io::Error::other)?;
    Ok(meta.permissions().mode() & 0o111 != 0)
}

#[cfg(not(unix))]
fn is_executable(_entry: &walkdir::DirEntry) -> std::io::Result<bool> {
    Ok(false)
}
