//! Textual detection of application entry points.

use std::sync::LazyLock;

use regex::Regex;

/// Program-entry constructs, most specific first.
static ENTRY_PATTERNS: LazyLock<Vec<(&'static str, Regex)>> = LazyLock::new(|| {
    [
        ("void main(", r"void\s+main\s*\("),
        ("Future<void> main(", r"Future<void>\s+main\s*\("),
        ("main(", r"main\s*\("),
    ]
    .into_iter()
    .map(|(name, pattern)| (name, Regex::new(pattern).expect("entry pattern is valid")))
    .collect()
});

/// Application-launch calls.
static LAUNCH_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [r"runApp\s*\(", r"flutter\.runApp\s*\("]
        .into_iter()
        .map(|pattern| Regex::new(pattern).expect("launch pattern is valid"))
        .collect()
});

/// Return the first entry pattern matching `source`.
pub fn entry_pattern(source: &str) -> Option<&'static str> {
    ENTRY_PATTERNS
        .iter()
        .find(|(_, re)| re.is_match(source))
        .map(|(name, _)| *name)
}

pub fn has_launch_call(source: &str) -> bool {
    LAUNCH_PATTERNS.iter().any(|re| re.is_match(source))
}

/// True if a `pubspec.yaml` body declares a Flutter dependency.
pub fn is_flutter_manifest(manifest: &str) -> bool {
    let lower = manifest.to_lowercase();
    lower.contains("flutter:") || lower.contains("flutter_test:") || lower.contains("sdk: flutter")
}
