use crate::error::EngineError;
use crate::resolver::parse_package;
use std::path::{Path, PathBuf};

/// Suffix the test generator appends to the SUT simple name.
pub const TEST_SUFFIX: &str = "_ESTest";

/// A generated Java test file on disk, with the names derived from it.
#[derive(Debug, Clone)]
pub struct TestFile {
    pub path: PathBuf,
    pub package: Option<String>,
    pub stem: String,
}

impl TestFile {
    pub fn read(path: &Path) -> Result<Self, EngineError> {
        if !path.is_file() {
            return Err(EngineError::ArtifactNotFound {
                what: format!("test file {}", path.display()),
            });
        }
        let source = std::fs::read_to_string(path)?;
        Ok(Self::from_source(path, &source))
    }

    pub fn from_source(path: &Path, source: &str) -> Self {
        let stem = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        Self {
            path: path.to_path_buf(),
            package: parse_package(source),
            stem,
        }
    }

    /// Fully-qualified test class; `None` without a package declaration.
    pub fn test_class(&self) -> Option<String> {
        self.package
            .as_ref()
            .map(|package| format!("{}.{}", package, self.stem))
    }

    /// Test class name, falling back to `<sut_class>_ESTest`.
    pub fn test_class_or(&self, sut_class: &str) -> String {
        self.test_class()
            .unwrap_or_else(|| format!("{}{}", sut_class, TEST_SUFFIX))
    }

    /// SUT class this test targets: package plus the stem without `_ESTest`.
    pub fn sut_class(&self) -> Option<String> {
        let simple = self.stem.strip_suffix(TEST_SUFFIX).unwrap_or(&self.stem);
        self.package
            .as_ref()
            .map(|package| format!("{}.{}", package, simple))
    }

    /// `*_scaffolding.java` files next to this file, sorted.
    pub fn scaffolding(&self) -> Vec<PathBuf> {
        find_scaffolding(&self.path)
    }
}

pub fn find_scaffolding(primary: &Path) -> Vec<PathBuf> {
    let Some(dir) = primary.parent() else {
        return Vec::new();
    };
    let dir = if dir.as_os_str().is_empty() {
        Path::new(".")
    } else {
        dir
    };
    let pattern = format!(
        "{}/*_scaffolding.java",
        glob::Pattern::escape(&dir.to_string_lossy())
    );

    let mut found: Vec<PathBuf> = match glob::glob(&pattern) {
        Ok(paths) => paths
            .filter_map(|p| p.ok())
            .filter(|p| p.as_path() != primary)
            .collect(),
        Err(e) => {
            tracing::warn!("Invalid scaffolding pattern {}: {}", pattern, e);
            Vec::new()
        }
    };
    found.sort();
    found
}
