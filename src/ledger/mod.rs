//! Ledger persistence.
//!
//! Ledgers are JSON arrays of records keyed by (project, class). Each phase is
//! the only writer of its own ledger; everything it reads was written by an
//! earlier phase or an external stage.

mod models;

pub use models::{
    BaselineEntry, MetricsRecord, RefinementEntry, TestMetrics, VerificationReason,
    VerificationRecord,
};

use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};

pub fn read_ledger<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read ledger: {}", path.display()))?;
    serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse ledger: {}", path.display()))
}

/// Like [`read_ledger`], but a missing file is an empty ledger.
pub fn read_ledger_or_empty<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>> {
    if path.exists() {
        read_ledger(path)
    } else {
        Ok(Vec::new())
    }
}

pub fn write_ledger<T: Serialize>(path: &Path, records: &[T]) -> Result<()> {
    write_json(path, records)?;
    tracing::info!("Wrote {} record(s) to {}", records.len(), path.display());
    Ok(())
}

/// Pretty-printed JSON, creating parent directories.
pub fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
        }
    }
    let json = serde_json::to_string_pretty(value).context("Failed to serialize JSON")?;
    std::fs::write(path, json).with_context(|| format!("Failed to write {}", path.display()))
}

pub fn sha256_file(path: &Path) -> std::io::Result<String> {
    let bytes = std::fs::read(path)?;
    let mut hasher = Sha256::new();
    hasher.update(&bytes);
    Ok(format!("{:x}", hasher.finalize()))
}

/// `<validated_dir>/<project>/<class with dots as underscores>`
pub fn validated_dir_for(validated_root: &Path, project: &str, class_name: &str) -> PathBuf {
    validated_root
        .join(project)
        .join(class_name.replace('.', "_"))
}

/// Copy a verified test and its scaffolding into the validated tree.
/// Returns the path of the copied primary file.
pub fn copy_validated(
    validated_root: &Path,
    record: &VerificationRecord,
    scaffolding: &[PathBuf],
) -> Result<PathBuf> {
    let dest = validated_dir_for(validated_root, &record.project, &record.class_name);
    std::fs::create_dir_all(&dest)
        .with_context(|| format!("Failed to create directory: {}", dest.display()))?;

    let options = fs_extra::file::CopyOptions {
        overwrite: true,
        skip_exist: false,
        buffer_size: 64 * 1024,
    };

    let mut primary_dest = None;
    for src in std::iter::once(&record.refined_file).chain(scaffolding) {
        let Some(name) = src.file_name() else {
            continue;
        };
        let target = dest.join(name);
        if src == &target {
            primary_dest.get_or_insert(target);
            continue;
        }
        fs_extra::file::copy(src, &target, &options)
            .map_err(|e| anyhow::anyhow!("Failed to copy {}: {}", src.display(), e))?;
        primary_dest.get_or_insert(target);
    }

    primary_dest.ok_or_else(|| {
        anyhow::anyhow!("Refined file has no file name: {}", record.refined_file.display())
    })
}
