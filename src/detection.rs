//! Project detection: chooses a builder and a fallback chain from marker files

use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::debug;

pub const CONTAINER_NATIVE_BUILDER: &str = "csdocker";
pub const FRAMEWORK_BUILDER: &str = "railpack";
pub const GENERIC_BUILDER: &str = "nixpacks";

/// Every builder detection can propose, in descending priority
pub const KNOWN_BUILDERS: &[&str] = &[CONTAINER_NATIVE_BUILDER, FRAMEWORK_BUILDER, GENERIC_BUILDER];

const DOCKERFILE_MARKERS: &[&str] = &["Dockerfile", "dockerfile"];

/// Manifests that a framework-aware builder knows how to build
const FRAMEWORK_MARKERS: &[&str] = &[
    "package.json",
    "requirements.txt",
    "pyproject.toml",
    "Pipfile",
    "go.mod",
    "Cargo.toml",
    "Gemfile",
    "composer.json",
    "pom.xml",
    "build.gradle",
    "build.gradle.kts",
    "mix.exs",
    "deno.json",
    "index.html",
];

/// Why a chain was proposed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "marker")]
pub enum DetectionReason {
    Dockerfile(String),
    FrameworkMarker(String),
    NoMarkers,
}

impl std::fmt::Display for DetectionReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DetectionReason::Dockerfile(marker) => write!(f, "found {}", marker),
            DetectionReason::FrameworkMarker(marker) => write!(f, "found {}", marker),
            DetectionReason::NoMarkers => write!(f, "no project markers found, using default"),
        }
    }
}

/// Proposed builder plus the ordered, duplicate-free fallback chain
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Detection {
    pub primary: String,
    pub chain: Vec<String>,
    pub reason: DetectionReason,
}

/// Stateless inspector of a directory's top-level marker files
#[derive(Debug, Default, Clone, Copy)]
pub struct ProjectDetector;

impl ProjectDetector {
    pub fn new() -> Self {
        Self
    }

    /// Proposes a builder chain for `path`. Never fails: unreadable or empty
    /// directories get the default chain.
    pub fn detect(&self, path: &Path) -> Detection {
        let (chain, reason) = if let Some(marker) = find_marker(path, DOCKERFILE_MARKERS) {
            (
                vec![CONTAINER_NATIVE_BUILDER, FRAMEWORK_BUILDER, GENERIC_BUILDER],
                DetectionReason::Dockerfile(marker),
            )
        } else if let Some(marker) = find_marker(path, FRAMEWORK_MARKERS) {
            (
                vec![FRAMEWORK_BUILDER, GENERIC_BUILDER],
                DetectionReason::FrameworkMarker(marker),
            )
        } else {
            (
                vec![FRAMEWORK_BUILDER, GENERIC_BUILDER],
                DetectionReason::NoMarkers,
            )
        };

        let chain = dedupe(chain.into_iter().map(str::to_string));
        debug!(path = %path.display(), ?chain, %reason, "Detected builder chain");

        Detection {
            primary: chain[0].clone(),
            chain,
            reason,
        }
    }

    /// The detected chain with `explicit` moved to the front.
    ///
    /// The remaining builders keep their detected order without duplicates.
    /// An empty `explicit` returns the detected chain unchanged.
    pub fn chain_for(&self, path: &Path, explicit: &str) -> Vec<String> {
        let detected = self.detect(path).chain;
        if explicit.is_empty() {
            return detected;
        }
        dedupe(std::iter::once(explicit.to_string()).chain(detected))
    }
}

fn find_marker(path: &Path, markers: &[&str]) -> Option<String> {
    markers
        .iter()
        .find(|marker| path.join(marker).is_file())
        .map(|marker| marker.to_string())
}

fn dedupe(names: impl IntoIterator<Item = String>) -> Vec<String> {
    let mut chain: Vec<String> = Vec::new();
    for name in names {
        if !chain.contains(&name) {
            chain.push(name);
        }
    }
    chain
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::fs;
    use tempfile::TempDir;

    fn dir_with(files: &[&str]) -> TempDir {
        let dir = TempDir::new().unwrap();
        for file in files {
            fs::write(dir.path().join(file), "").unwrap();
        }
        dir
    }

    #[test]
    fn test_dockerfile_selects_container_native_first() {
        let dir = dir_with(&["Dockerfile"]);
        let detection = ProjectDetector::new().detect(dir.path());
        assert_eq!(detection.primary, CONTAINER_NATIVE_BUILDER);
        assert_eq!(detection.chain.len(), KNOWN_BUILDERS.len());
        assert_eq!(detection.chain, KNOWN_BUILDERS);
    }

    #[test]
    fn test_dockerfile_wins_over_framework_marker() {
        let dir = dir_with(&["package.json", "Dockerfile"]);
        let detection = ProjectDetector::new().detect(dir.path());
        assert_eq!(detection.primary, CONTAINER_NATIVE_BUILDER);
        assert_eq!(detection.reason, DetectionReason::Dockerfile("Dockerfile".into()));
    }

    #[test]
    fn test_framework_marker_selects_framework_builder() {
        for marker in ["package.json", "go.mod", "requirements.txt", "Cargo.toml"] {
            let dir = dir_with(&[marker]);
            let detection = ProjectDetector::new().detect(dir.path());
            assert_eq!(detection.chain, vec![FRAMEWORK_BUILDER, GENERIC_BUILDER]);
            assert_eq!(
                detection.reason,
                DetectionReason::FrameworkMarker(marker.to_string())
            );
        }
    }

    #[test]
    fn test_empty_directory_uses_default() {
        let dir = dir_with(&[]);
        let detection = ProjectDetector::new().detect(dir.path());
        assert_eq!(detection.reason, DetectionReason::NoMarkers);
        assert!(!detection.chain.is_empty());
    }

    #[test]
    fn test_missing_directory_does_not_fail() {
        let detection = ProjectDetector::new().detect(Path::new("/nonexistent/shipyard/dir"));
        assert_eq!(detection.reason, DetectionReason::NoMarkers);
        assert_eq!(detection.primary, FRAMEWORK_BUILDER);
    }

    #[test]
    fn test_markers_are_not_searched_recursively() {
        let dir = TempDir::new().unwrap();
        fs::create_dir(dir.path().join("nested")).unwrap();
        fs::write(dir.path().join("nested/Dockerfile"), "").unwrap();
        let detection = ProjectDetector::new().detect(dir.path());
        assert_eq!(detection.reason, DetectionReason::NoMarkers);
    }

    #[test]
    fn test_chain_for_moves_explicit_to_front() {
        let dir = dir_with(&["Dockerfile"]);
        let detector = ProjectDetector::new();
        let natural = detector.detect(dir.path()).chain;

        for explicit in KNOWN_BUILDERS {
            let chain = detector.chain_for(dir.path(), explicit);
            assert_eq!(chain[0], *explicit);
            assert_eq!(chain.len(), natural.len());
            let as_set: HashSet<_> = chain.iter().collect();
            assert_eq!(as_set, natural.iter().collect::<HashSet<_>>());
        }
    }

    #[test]
    fn test_chain_for_preserves_remaining_order() {
        let dir = dir_with(&["Dockerfile"]);
        let chain = ProjectDetector::new().chain_for(dir.path(), GENERIC_BUILDER);
        assert_eq!(
            chain,
            vec![GENERIC_BUILDER, CONTAINER_NATIVE_BUILDER, FRAMEWORK_BUILDER]
        );
    }

    #[test]
    fn test_chain_for_empty_matches_detect() {
        for files in [&["Dockerfile"][..], &["package.json"][..], &[][..]] {
            let dir = dir_with(files);
            let detector = ProjectDetector::new();
            assert_eq!(
                detector.chain_for(dir.path(), ""),
                detector.detect(dir.path()).chain
            );
        }
    }

    #[test]
    fn test_chain_for_unlisted_builder_is_prepended() {
        let dir = dir_with(&["package.json"]);
        let chain = ProjectDetector::new().chain_for(dir.path(), "docker");
        assert_eq!(chain, vec!["docker", FRAMEWORK_BUILDER, GENERIC_BUILDER]);
    }
}
