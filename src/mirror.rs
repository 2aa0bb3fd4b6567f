// ABOUTME: Bucket mirroring - copies objects present in source but absent from destination
// ABOUTME: Backends implement BucketStore; pair failures are isolated like table syncs

use anyhow::{Context, Result};
use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

/// The narrow interface the mirror needs from an object store.
pub trait BucketStore {
    fn name(&self) -> &str;
    /// All object names in the bucket.
    fn list(&self) -> Result<BTreeSet<String>>;
    /// Copy one object from this bucket into `dest` under the same name.
    fn copy_to(&self, dest: &Self, object: &str) -> Result<()>;
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MirrorStats {
    pub total: usize,
    pub copied: usize,
    pub existing: usize,
}

/// Copy every object present in `source` and absent (by name) from `dest`.
///
/// Existence is judged by name only; contents are never compared. Dry-run
/// reports the delta without copying anything.
pub fn mirror_pair<S: BucketStore>(source: &S, dest: &S, dry_run: bool) -> Result<MirrorStats> {
    if dry_run {
        tracing::info!("Running in DRY RUN mode - no objects will be copied");
    }

    let source_objects = source
        .list()
        .with_context(|| format!("failed to list source bucket {}", source.name()))?;
    let dest_objects = dest
        .list()
        .with_context(|| format!("failed to list destination bucket {}", dest.name()))?;

    let mut stats = MirrorStats {
        total: source_objects.len(),
        ..Default::default()
    };
    tracing::info!(
        "Found {} objects in source bucket {}",
        stats.total,
        source.name()
    );

    for object in &source_objects {
        if dest_objects.contains(object) {
            stats.existing += 1;
            continue;
        }
        if dry_run {
            tracing::info!("Would copy: {}", object);
        } else {
            source.copy_to(dest, object)?;
            tracing::info!("Copied: {}", object);
        }
        stats.copied += 1;
    }

    let action = if dry_run { "Would copy" } else { "Copied" };
    tracing::info!(
        "Mirror completed - total: {}, {}: {}, already existed: {}",
        stats.total,
        action,
        stats.copied,
        stats.existing
    );
    Ok(stats)
}

/// Mirror a list of bucket pairs, isolating each pair's failure.
pub fn mirror_all<S: BucketStore>(
    pairs: &[(S, S)],
    dry_run: bool,
) -> Vec<(String, Result<MirrorStats>)> {
    let mut results = Vec::with_capacity(pairs.len());
    for (source, dest) in pairs {
        let label = format!("{} -> {}", source.name(), dest.name());
        tracing::info!("Processing bucket pair: {}", label);
        let outcome = mirror_pair(source, dest, dry_run);
        if let Err(e) = &outcome {
            tracing::error!("Failed to mirror bucket pair {}: {:#}", label, e);
        }
        results.push((label, outcome));
    }
    results
}

/// Directory-backed bucket: object names are slash-separated relative paths.
pub struct DirBucket {
    name: String,
    root: PathBuf,
}

impl DirBucket {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        let name = root.display().to_string();
        Self { name, root }
    }

    fn collect(&self, dir: &Path, prefix: &str, out: &mut BTreeSet<String>) -> Result<()> {
        for entry in
            fs::read_dir(dir).with_context(|| format!("failed to list {}", dir.display()))?
        {
            let entry = entry?;
            let file_type = entry.file_type()?;
            let file_name = entry.file_name().to_string_lossy().into_owned();
            let object = if prefix.is_empty() {
                file_name
            } else {
                format!("{}/{}", prefix, file_name)
            };
            if file_type.is_dir() {
                self.collect(&entry.path(), &object, out)?;
            } else {
                out.insert(object);
            }
        }
        Ok(())
    }
}

impl BucketStore for DirBucket {
    fn name(&self) -> &str {
        &self.name
    }

    fn list(&self) -> Result<BTreeSet<String>> {
        let mut out = BTreeSet::new();
        if self.root.exists() {
            self.collect(&self.root, "", &mut out)?;
        }
        Ok(out)
    }

    fn copy_to(&self, dest: &Self, object: &str) -> Result<()> {
        let from = self.root.join(object);
        let to = dest.root.join(object);
        if let Some(parent) = to.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
        fs::copy(&from, &to)
            .with_context(|| format!("failed to copy {} to {}", from.display(), dest.name))?;
        Ok(())
    }
}
