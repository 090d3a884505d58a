//! Glob selection of source files
//!
//! Patterns are matched against a file's path relative to the source root:
//!
//! - `*` matches anything except `/`
//! - `**` matches anything including `/` (crosses directories)
//! - `?` matches a single character (except `/`)
//! - `{a,b}` matches either alternative
//! - `[...]` character classes
//!
//! Hidden entries, files or directories whose name starts with `.`, are only selected when the
//! pattern spells out the leading dot itself (e.g. `.htaccess` or `**/.*`). Wildcards never match
//! them.
//!
//! # Examples
//!
//! ```
//! use common::pattern::SourcePattern;
//! use std::path::Path;
//!
//! let fonts = SourcePattern::parse("**/*.{woff2,woff,eot,ttf}").unwrap();
//! assert!(fonts.matches(Path::new("iconfont/MaterialIcons.woff2")));
//! assert!(!fonts.matches(Path::new("iconfont/README.md")));
//!
//! // without `**` only the top level is selected
//! let images = SourcePattern::parse("*.png").unwrap();
//! assert!(images.matches(Path::new("icons.png")));
//! assert!(!images.matches(Path::new("nested/icons.png")));
//!
//! let everything = SourcePattern::parse("**/*").unwrap();
//! assert!(!everything.matches(Path::new(".git/config")));
//! ```

use anyhow::{Context, anyhow};
use std::path::Path;

/// A compiled source pattern with its original form
#[derive(Debug, Clone)]
pub struct SourcePattern {
    /// original pattern string for log output
    pub original: String,
    /// compiled glob matcher
    matcher: globset::GlobMatcher,
    /// the pattern names hidden entries explicitly
    hidden: bool,
}

fn is_hidden(name: &std::ffi::OsStr) -> bool {
    name.as_encoded_bytes().first() == Some(&b'.')
}

impl SourcePattern {
    /// Parse a pattern string into a SourcePattern
    pub fn parse(pattern: &str) -> Result<Self, anyhow::Error> {
        // patterns are always relative to the source root
        let pattern_str = pattern.trim_start_matches('/');
        if pattern_str.is_empty() {
            return Err(anyhow!("empty pattern is not allowed"));
        }
        let glob = globset::GlobBuilder::new(pattern_str)
            .literal_separator(true) // * doesn't match /
            .build()
            .with_context(|| format!("invalid glob pattern: {pattern}"))?;
        Ok(Self {
            original: pattern.to_string(),
            matcher: glob.compile_matcher(),
            hidden: pattern_str.starts_with('.') || pattern_str.contains("/."),
        })
    }
    /// Check if a file, given relative to the source root, is selected
    pub fn matches(&self, relative_path: &Path) -> bool {
        if !self.hidden && relative_path.iter().any(is_hidden) {
            return false;
        }
        self.matcher.is_match(relative_path)
    }
    /// Whether the directory walk has to look at the entry `name` at all
    pub fn may_select(&self, name: &std::ffi::OsStr) -> bool {
        self.hidden || !is_hidden(name)
    }
}

impl std::fmt::Display for SourcePattern {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{}", self.original)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn double_star_matches_every_depth() {
        let pattern = SourcePattern::parse("**/*").unwrap();
        assert!(pattern.matches(Path::new("logo.svg")));
        assert!(pattern.matches(Path::new("images/bg.png")));
        assert!(pattern.matches(Path::new("a/b/c/d.txt")));
    }

    #[test]
    fn star_dot_star_requires_extension() {
        let pattern = SourcePattern::parse("**/*.*").unwrap();
        assert!(pattern.matches(Path::new("Roboto/Roboto-Regular.woff")));
        assert!(!pattern.matches(Path::new("Roboto/LICENSE")));
    }

    #[test]
    fn alternation() {
        let pattern = SourcePattern::parse("**/*.{woff2,woff,eot,ttf}").unwrap();
        for name in ["a.woff2", "a.woff", "x/a.eot", "x/y/a.ttf"] {
            assert!(pattern.matches(Path::new(name)), "{name} should match");
        }
        for name in ["a.otf", "a.woff2.map", "woff"] {
            assert!(!pattern.matches(Path::new(name)), "{name} should not match");
        }
    }

    #[test]
    fn leading_slash_is_ignored() {
        let pattern = SourcePattern::parse("/*.png").unwrap();
        assert!(pattern.matches(Path::new("icons.png")));
        assert_eq!(pattern.to_string(), "/*.png");
    }

    #[test]
    fn wildcards_skip_hidden_entries() {
        let everything = SourcePattern::parse("**/*").unwrap();
        assert!(!everything.matches(Path::new(".DS_Store")));
        assert!(!everything.matches(Path::new(".git/config")));
        assert!(!everything.matches(Path::new("images/.gitkeep")));
        assert!(!everything.may_select(std::ffi::OsStr::new(".git")));
        assert!(everything.may_select(std::ffi::OsStr::new("images")));
        let with_extension = SourcePattern::parse("**/*.*").unwrap();
        assert!(!with_extension.matches(Path::new("roboto/.hidden")));
        assert!(with_extension.matches(Path::new("roboto/Roboto.v2.woff")));
    }

    #[test]
    fn explicit_dot_selects_hidden_entries() {
        let htaccess = SourcePattern::parse(".htaccess").unwrap();
        assert!(htaccess.matches(Path::new(".htaccess")));
        let dotfiles = SourcePattern::parse("**/.*").unwrap();
        assert!(dotfiles.matches(Path::new("conf/.env")));
        assert!(dotfiles.may_select(std::ffi::OsStr::new(".well-known")));
    }

    #[test]
    fn invalid_patterns() {
        assert!(SourcePattern::parse("").is_err());
        assert!(SourcePattern::parse("/").is_err());
        assert!(SourcePattern::parse("[unclosed").is_err());
        assert!(SourcePattern::parse("{a,b").is_err());
    }
}
