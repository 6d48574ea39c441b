//! Project and artifact resolution.
//!
//! Projects live one directory per identifier under the configured roots.
//! A class resolves to its source file when one exists, otherwise to the
//! project's primary jar so callers can fall back to bytecode tooling.

use crate::error::EngineError;
use regex::Regex;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

/// A resolved SUT project. Immutable once discovered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Project {
    pub id: String,
    pub root: PathBuf,
    /// Every jar in the project directory, sorted.
    pub jars: Vec<PathBuf>,
    /// Directory holding the package tree of the sources, if any.
    pub source_root: Option<PathBuf>,
}

impl Project {
    /// The jar the SUT classes are loaded from.
    ///
    /// Prefers the `N_name -> name.jar` naming convention, else the first jar.
    pub fn primary_jar(&self) -> Option<&Path> {
        let conventional = self
            .id
            .split_once('_')
            .map(|(_, name)| format!("{}.jar", name));

        conventional
            .and_then(|name| {
                self.jars
                    .iter()
                    .find(|j| j.file_name().is_some_and(|f| f == name.as_str()))
            })
            .or_else(|| self.jars.first())
            .map(PathBuf::as_path)
    }

    /// Source root handed to report and mutation tools; the project root
    /// when no conventional source directory exists.
    pub fn source_dir(&self) -> &Path {
        self.source_root.as_deref().unwrap_or(&self.root)
    }
}

/// Where the SUT class was found.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SutLocation {
    /// A source file. `via_fallback` marks a hit from the by-simple-name
    /// search, which may belong to a different package.
    Source { path: PathBuf, via_fallback: bool },
    /// No source; the class is only available inside this jar.
    Binary { jar: PathBuf },
}

/// Source directories tried, in order, before the fallback search.
const SOURCE_ROOTS: &[&str] = &["src/main/java", "src", "source"];

/// Directories never descended into by the fallback search.
const SKIP_DIRS: &[&str] = &["target", "build", "node_modules"];

pub struct ProjectResolver {
    roots: Vec<PathBuf>,
    search_depth: usize,
    cache: HashMap<String, Project>,
}

impl ProjectResolver {
    pub fn new(roots: Vec<PathBuf>, search_depth: usize) -> Self {
        Self {
            roots,
            search_depth,
            cache: HashMap::new(),
        }
    }

    /// Look a project up by identifier, discovering it on first use.
    pub fn project(&mut self, id: &str) -> Result<&Project, EngineError> {
        if !self.cache.contains_key(id) {
            let project = self.discover(id)?;
            tracing::debug!(
                "Discovered project {} at {} ({} jar(s))",
                id,
                project.root.display(),
                project.jars.len()
            );
            self.cache.insert(id.to_string(), project);
        }
        self.cache
            .get(id)
            .ok_or_else(|| EngineError::ArtifactNotFound {
                what: format!("project {}", id),
            })
    }

    /// The primary jar of a project, or `ArtifactNotFound`.
    pub fn sut_jar(&mut self, id: &str) -> Result<PathBuf, EngineError> {
        let project = self.project(id)?;
        project
            .primary_jar()
            .map(Path::to_path_buf)
            .ok_or_else(|| EngineError::ArtifactNotFound {
                what: format!("SUT jar for project {}", id),
            })
    }

    fn discover(&self, id: &str) -> Result<Project, EngineError> {
        let root = self
            .roots
            .iter()
            .map(|r| r.join(id))
            .find(|p| p.is_dir())
            .ok_or_else(|| EngineError::ArtifactNotFound {
                what: format!("project directory for {}", id),
            })?;

        let pattern = root.join("*.jar");
        let mut jars: Vec<PathBuf> = glob::glob(&pattern.to_string_lossy())
            .map(|paths| paths.filter_map(Result::ok).collect())
            .unwrap_or_default();
        jars.sort();

        let source_root = SOURCE_ROOTS
            .iter()
            .map(|dir| root.join(dir))
            .find(|p| p.is_dir());

        Ok(Project {
            id: id.to_string(),
            root,
            jars,
            source_root,
        })
    }

    /// Find the source file for `class_name`, else the project jar.
    pub fn locate_class(
        &mut self,
        project_id: &str,
        class_name: &str,
    ) -> Result<SutLocation, EngineError> {
        let depth = self.search_depth;
        let project = self.project(project_id)?;
        let relative = class_relative_path(class_name);

        for dir in SOURCE_ROOTS {
            let candidate = project.root.join(dir).join(&relative);
            if candidate.is_file() {
                return Ok(SutLocation::Source {
                    path: candidate,
                    via_fallback: false,
                });
            }
        }

        let simple = simple_name(class_name);
        tracing::warn!(
            "Source for {} not at a conventional location; searching {} for {}.java by simple name",
            class_name,
            project.root.display(),
            simple
        );
        if let Some(found) = find_by_simple_name(&project.root, simple, depth) {
            let expected = package_of(class_name);
            match read_package(&found) {
                Some(actual) if actual == expected => {}
                actual => tracing::warn!(
                    "Fallback hit {} declares package {:?}, expected {:?}; it may be an unrelated class",
                    found.display(),
                    actual.unwrap_or_default(),
                    expected
                ),
            }
            return Ok(SutLocation::Source {
                path: found,
                via_fallback: true,
            });
        }

        match project.primary_jar() {
            Some(jar) => {
                tracing::info!(
                    "No source for {}; using jar {}",
                    class_name,
                    jar.display()
                );
                Ok(SutLocation::Binary {
                    jar: jar.to_path_buf(),
                })
            }
            None => Err(EngineError::ArtifactNotFound {
                what: format!("source or jar for {} in {}", class_name, project_id),
            }),
        }
    }

    /// Source file of a class when one exists; never falls back to the jar.
    pub fn source_file(&mut self, project_id: &str, class_name: &str) -> Option<PathBuf> {
        match self.locate_class(project_id, class_name) {
            Ok(SutLocation::Source { path, .. }) => Some(path),
            _ => None,
        }
    }
}

/// `a.b.C` -> `a/b/C.java`; inner-class suffixes are dropped.
pub fn class_relative_path(class_name: &str) -> PathBuf {
    let outer = class_name.split('$').next().unwrap_or(class_name);
    PathBuf::from(format!("{}.java", outer.replace('.', "/")))
}

/// Last dotted segment.
pub fn simple_name(class_name: &str) -> &str {
    let outer = class_name.split('$').next().unwrap_or(class_name);
    outer.rsplit('.').next().unwrap_or(outer)
}

/// Everything before the last dot; empty for the default package.
pub fn package_of(class_name: &str) -> &str {
    class_name.rsplit_once('.').map(|(pkg, _)| pkg).unwrap_or("")
}

fn package_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?m)^\s*package\s+([\w.]+)\s*;").expect("valid regex"))
}

/// The `package` declaration of Java source text.
pub fn parse_package(source: &str) -> Option<String> {
    package_regex()
        .captures(source)
        .map(|caps| caps[1].to_string())
}

fn read_package(path: &Path) -> Option<String> {
    std::fs::read_to_string(path)
        .ok()
        .and_then(|s| parse_package(&s))
}

/// Depth-bounded, deterministic search for `<simple>.java`.
fn find_by_simple_name(root: &Path, simple: &str, max_depth: usize) -> Option<PathBuf> {
    let file_name = format!("{}.java", simple);
    walkdir::WalkDir::new(root)
        .follow_links(false)
        .max_depth(max_depth)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| {
            let name = e.file_name().to_string_lossy();
            e.depth() == 0 || (!name.starts_with('.') && !SKIP_DIRS.contains(&name.as_ref()))
        })
        .filter_map(Result::ok)
        .find(|e| e.file_type().is_file() && e.file_name().to_string_lossy() == file_name)
        .map(|e| e.into_path())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write(path: &Path, content: &str) {
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, content).unwrap();
    }

    fn resolver_for(temp_dir: &TempDir) -> ProjectResolver {
        ProjectResolver::new(vec![temp_dir.path().to_path_buf()], 8)
    }

    // =========================================================================
    // Name helpers
    // =========================================================================

    #[test]
    fn test_class_relative_path() {
        assert_eq!(
            class_relative_path("com.example.Foo"),
            PathBuf::from("com/example/Foo.java")
        );
        assert_eq!(
            class_relative_path("com.example.Foo$Inner"),
            PathBuf::from("com/example/Foo.java")
        );
        assert_eq!(class_relative_path("Foo"), PathBuf::from("Foo.java"));
    }

    #[test]
    fn test_simple_name_and_package() {
        assert_eq!(simple_name("com.example.Foo"), "Foo");
        assert_eq!(simple_name("Foo"), "Foo");
        assert_eq!(package_of("com.example.Foo"), "com.example");
        assert_eq!(package_of("Foo"), "");
    }

    #[test]
    fn test_parse_package() {
        let source = "/* header */\npackage com.example.util;\n\npublic class X {}";
        assert_eq!(parse_package(source), Some("com.example.util".to_string()));
        assert_eq!(parse_package("public class X {}"), None);
    }

    // =========================================================================
    // Project discovery
    // =========================================================================

    #[test]
    fn test_project_discovery_and_cache() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path().join("1_tullibee");
        write(&root.join("lib-extra.jar"), "");
        write(&root.join("tullibee.jar"), "");
        write(&root.join("src/main/java/com/ib/Foo.java"), "package com.ib;");

        let mut resolver = resolver_for(&temp_dir);
        let project = resolver.project("1_tullibee").unwrap().clone();

        assert_eq!(project.jars.len(), 2);
        assert_eq!(project.primary_jar(), Some(root.join("tullibee.jar").as_path()));
        assert_eq!(project.source_root, Some(root.join("src/main/java")));

        // Cached lookups return the same project even if the disk changes.
        std::fs::remove_file(root.join("lib-extra.jar")).unwrap();
        assert_eq!(resolver.project("1_tullibee").unwrap().jars.len(), 2);
    }

    #[test]
    fn test_primary_jar_without_convention() {
        let project = Project {
            id: "plain".to_string(),
            root: PathBuf::from("/p"),
            jars: vec![PathBuf::from("/p/a.jar"), PathBuf::from("/p/b.jar")],
            source_root: None,
        };
        assert_eq!(project.primary_jar(), Some(Path::new("/p/a.jar")));
        assert_eq!(project.source_dir(), Path::new("/p"));
    }

    #[test]
    fn test_missing_project_is_artifact_not_found() {
        let temp_dir = TempDir::new().unwrap();
        let mut resolver = resolver_for(&temp_dir);

        let err = resolver.project("nope").unwrap_err();
        assert!(matches!(err, EngineError::ArtifactNotFound { .. }));
        assert!(matches!(
            resolver.sut_jar("nope"),
            Err(EngineError::ArtifactNotFound { .. })
        ));
    }

    #[test]
    fn test_project_without_jars() {
        let temp_dir = TempDir::new().unwrap();
        std::fs::create_dir_all(temp_dir.path().join("empty")).unwrap();
        let mut resolver = resolver_for(&temp_dir);

        assert!(matches!(
            resolver.sut_jar("empty"),
            Err(EngineError::ArtifactNotFound { .. })
        ));
    }

    // =========================================================================
    // Class location
    // =========================================================================

    #[test]
    fn test_locate_class_search_order() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path().join("proj");
        write(&root.join("src/com/a/Foo.java"), "package com.a;");
        write(&root.join("source/com/a/Foo.java"), "package com.a;");

        let mut resolver = resolver_for(&temp_dir);
        let location = resolver.locate_class("proj", "com.a.Foo").unwrap();

        assert_eq!(
            location,
            SutLocation::Source {
                path: root.join("src/com/a/Foo.java"),
                via_fallback: false
            }
        );
    }

    #[test]
    fn test_locate_class_fallback_is_flagged() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path().join("proj");
        write(&root.join("weird/layout/Foo.java"), "package other.pkg;");

        let mut resolver = resolver_for(&temp_dir);
        let location = resolver.locate_class("proj", "com.a.Foo").unwrap();

        assert_eq!(
            location,
            SutLocation::Source {
                path: root.join("weird/layout/Foo.java"),
                via_fallback: true
            }
        );
    }

    #[test]
    fn test_locate_class_fallback_skips_hidden_dirs() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path().join("proj");
        write(&root.join(".git/Foo.java"), "package com.a;");
        write(&root.join("app.jar"), "");

        let mut resolver = resolver_for(&temp_dir);
        let location = resolver.locate_class("proj", "com.a.Foo").unwrap();

        assert_eq!(
            location,
            SutLocation::Binary {
                jar: root.join("app.jar")
            }
        );
    }

    #[test]
    fn test_locate_class_nothing_found() {
        let temp_dir = TempDir::new().unwrap();
        std::fs::create_dir_all(temp_dir.path().join("proj")).unwrap();

        let mut resolver = resolver_for(&temp_dir);
        let err = resolver.locate_class("proj", "com.a.Foo").unwrap_err();
        assert!(matches!(err, EngineError::ArtifactNotFound { .. }));
        assert_eq!(resolver.source_file("proj", "com.a.Foo"), None);
    }
}
