//! Helpers for deriving local names from remote references.

use std::sync::LazyLock;

use regex::Regex;

static REPO_NAME_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"[/:]([^/:]+?)(?:\.git)?/?$").expect("repo name pattern is valid")
});

/// Return the repository name (last path segment without `.git`).
///
/// Works for https, ssh and scp-style (`git@host:org/app.git`) remotes.
pub fn repo_name(remote: &str) -> Option<String> {
    REPO_NAME_RE
        .captures(remote.trim())
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
        .filter(|name| !name.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_git_suffix_from_https_remote() {
        assert_eq!(
            repo_name("https://github.com/acme/mobile-app.git").as_deref(),
            Some("mobile-app")
        );
    }

    #[test]
    fn handles_trailing_slash_without_suffix() {
        assert_eq!(
            repo_name("https://gitlab.example.com/team/app/").as_deref(),
            Some("app")
        );
    }

    #[test]
    fn handles_scp_style_remote() {
        assert_eq!(
            repo_name("git@github.com:acme/shop.git").as_deref(),
            Some("shop")
        );
        assert_eq!(repo_name("git@host:shop.git").as_deref(), Some("shop"));
    }

    #[test]
    fn handles_local_paths() {
        assert_eq!(repo_name("/srv/git/origin").as_deref(), Some("origin"));
    }

    #[test]
    fn rejects_bare_words() {
        assert_eq!(repo_name("origin"), None);
        assert_eq!(repo_name(""), None);
    }
}
