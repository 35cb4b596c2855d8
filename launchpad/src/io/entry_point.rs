//! Locate the runnable application inside a working copy.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, instrument};
use walkdir::{DirEntry, WalkDir};

use crate::core::entry::{entry_pattern, has_launch_call, is_flutter_manifest};

const MANIFEST: &str = "pubspec.yaml";
const SOURCE_DIRS: [&str; 2] = ["lib", "test"];
const SKIPPED_DIRS: [&str; 4] = [".git", ".dart_tool", "build", "node_modules"];

/// A source file that declares a program entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryCandidate {
    /// Directory containing the owning `pubspec.yaml`.
    pub project_root: PathBuf,
    pub file: PathBuf,
    /// Entry pattern that matched, e.g. `void main(`.
    pub pattern: &'static str,
    pub has_launch_call: bool,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct EntryPointLocator;

impl EntryPointLocator {
    /// All entry candidates under `root`, in deterministic traversal order.
    #[instrument(skip_all, fields(root = %root.display()))]
    pub fn locate(&self, root: &Path) -> Vec<EntryCandidate> {
        let mut candidates = Vec::new();
        for project_root in flutter_projects(root) {
            for dir in SOURCE_DIRS {
                let source_dir = project_root.join(dir);
                if source_dir.is_dir() {
                    scan_sources(&project_root, &source_dir, &mut candidates);
                }
            }
        }
        debug!(count = candidates.len(), "entry candidates found");
        candidates
    }
}

/// First candidate that launches the application.
pub fn best(candidates: &[EntryCandidate]) -> Option<&EntryCandidate> {
    candidates.iter().find(|c| c.has_launch_call)
}

fn flutter_projects(root: &Path) -> Vec<PathBuf> {
    WalkDir::new(root)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|entry| !is_skipped_dir(entry))
        .filter_map(Result::ok)
        .filter(|entry| entry.file_type().is_file() && entry.file_name() == MANIFEST)
        .filter(|entry| {
            // An unreadable manifest still marks a project.
            fs::read_to_string(entry.path())
                .map(|body| is_flutter_manifest(&body))
                .unwrap_or(true)
        })
        .filter_map(|entry| entry.path().parent().map(Path::to_path_buf))
        .collect()
}

fn scan_sources(project_root: &Path, source_dir: &Path, out: &mut Vec<EntryCandidate>) {
    let files = WalkDir::new(source_dir)
        .sort_by_file_name()
        .into_iter()
        .filter_map(Result::ok)
        .filter(|entry| entry.file_type().is_file())
        .filter(|entry| entry.path().extension().is_some_and(|ext| ext == "dart"));
    for entry in files {
        let Ok(source) = fs::read_to_string(entry.path()) else {
            debug!(file = %entry.path().display(), "skipping unreadable source");
            continue;
        };
        if let Some(pattern) = entry_pattern(&source) {
            out.push(EntryCandidate {
                project_root: project_root.to_path_buf(),
                file: entry.path().to_path_buf(),
                pattern,
                has_launch_call: has_launch_call(&source),
            });
        }
    }
}

fn is_skipped_dir(entry: &DirEntry) -> bool {
    entry.depth() > 0
        && entry.file_type().is_dir()
        && entry
            .file_name()
            .to_str()
            .is_some_and(|name| SKIPPED_DIRS.contains(&name))
}
