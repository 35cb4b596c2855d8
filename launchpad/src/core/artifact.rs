//! Artifact resolution from unstructured build-tool output.
//!
//! Tool output is not a stable format, so each artifact kind is resolved by a
//! cascade of increasingly generic rules. Rules are tried strictly in declared
//! order and the first match wins; a later, less specific rule never overrides
//! an earlier one.

use std::fmt;
use std::sync::LazyLock;

use clap::ValueEnum;
use regex::Regex;

/// What the caller is trying to recover from tool output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ArtifactKind {
    /// Android app bundle (`.aab`) or package (`.apk`).
    PackageBundle,
    /// iOS `.xcarchive` produced by `flutter build ipa`.
    Archive,
    /// Exported `.ipa` produced by `fastlane export`.
    Export,
    /// `PRODUCT_BUNDLE_IDENTIFIER` from `xcodebuild -showBuildSettings`.
    Identifier,
}

impl fmt::Display for ArtifactKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::PackageBundle => "package bundle path",
            Self::Archive => "archive path",
            Self::Export => "export path",
            Self::Identifier => "bundle identifier",
        };
        f.write_str(label)
    }
}

/// Outcome of applying a rule or a whole cascade.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MatchResult {
    Found { rule: &'static str, value: String },
    NotFound,
}

impl MatchResult {
    pub fn into_value(self) -> Option<String> {
        match self {
            Self::Found { value, .. } => Some(value),
            Self::NotFound => None,
        }
    }
}

/// A single (pattern, capture group) pair.
#[derive(Debug)]
pub struct ExtractionRule {
    pub name: &'static str,
    pattern: Regex,
    group: usize,
}

impl ExtractionRule {
    fn new(name: &'static str, pattern: &str, group: usize) -> Self {
        Self {
            name,
            pattern: Regex::new(pattern).expect("extraction pattern is valid"),
            group,
        }
    }

    pub fn apply(&self, output: &str) -> MatchResult {
        let value = self
            .pattern
            .captures(output)
            .and_then(|caps| caps.get(self.group))
            .map(|m| m.as_str().trim())
            .filter(|value| !value.is_empty());
        match value {
            Some(value) => MatchResult::Found {
                rule: self.name,
                value: value.to_string(),
            },
            None => MatchResult::NotFound,
        }
    }
}

// Characters allowed inside a path token. Quotes and brackets commonly wrap
// paths in tool output and must not be captured.
const PATH: &str = r#"[^\s'"()<>\[\]]"#;

static PACKAGE_BUNDLE_RULES: LazyLock<Vec<ExtractionRule>> = LazyLock::new(|| {
    vec![
        ExtractionRule::new("built-aab", &format!(r"Built\s+({PATH}+\.aab)\b"), 1),
        ExtractionRule::new("built-apk", &format!(r"Built\s+({PATH}+\.apk)\b"), 1),
        ExtractionRule::new(
            "build-dir",
            &format!(r"({PATH}*\bbuild/{PATH}*\.(?:aab|apk))\b"),
            1,
        ),
        ExtractionRule::new(
            "release-name",
            &format!(r"({PATH}*-release\.(?:aab|apk))\b"),
            1,
        ),
        ExtractionRule::new("any-token", r"([\w/.\-]+\.(?:aab|apk))\b", 1),
    ]
});

static ARCHIVE_RULES: LazyLock<Vec<ExtractionRule>> =
    LazyLock::new(|| vec![ExtractionRule::new("open-archive", r"open\s+(.+\.xcarchive)", 1)]);

static EXPORT_RULES: LazyLock<Vec<ExtractionRule>> =
    LazyLock::new(|| vec![ExtractionRule::new("ipa-token", r"([/\w\-.]+\.ipa)\b", 1)]);

static IDENTIFIER_RULES: LazyLock<Vec<ExtractionRule>> = LazyLock::new(|| {
    vec![ExtractionRule::new(
        "bundle-identifier",
        r"(?m)^\s*PRODUCT_BUNDLE_IDENTIFIER\s*=\s*(.+)$",
        1,
    )]
});

/// Ordered cascade for `kind`.
pub fn rules(kind: ArtifactKind) -> &'static [ExtractionRule] {
    match kind {
        ArtifactKind::PackageBundle => &PACKAGE_BUNDLE_RULES,
        ArtifactKind::Archive => &ARCHIVE_RULES,
        ArtifactKind::Export => &EXPORT_RULES,
        ArtifactKind::Identifier => &IDENTIFIER_RULES,
    }
}

/// Apply the cascade for `kind`, stopping at the first rule that matches.
pub fn resolve_match(output: &str, kind: ArtifactKind) -> MatchResult {
    rules(kind)
        .iter()
        .map(|rule| rule.apply(output))
        .find(|result| matches!(result, MatchResult::Found { .. }))
        .unwrap_or(MatchResult::NotFound)
}

/// Resolve the authoritative value for `kind`, or `None` if no rule matched.
pub fn resolve(output: &str, kind: ArtifactKind) -> Option<String> {
    resolve_match(output, kind).into_value()
}
