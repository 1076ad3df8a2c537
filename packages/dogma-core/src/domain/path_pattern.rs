//! Path patterns (§3): a comma-separated list of globs, `**`/`*` semantics,
//! with `/**` subsuming every other pattern in the list.

use globset::{Glob, GlobSet, GlobSetBuilder};

use crate::error::{DogmaError, Result};

const MATCH_ALL: &str = "/**";

#[derive(Clone)]
pub struct PathPattern {
    raw: String,
    match_all: bool,
    set: Option<GlobSet>,
}

impl PathPattern {
    /// Parse a comma-separated pattern list. A segment not starting with
    /// `/` is implicitly prefixed with `/**/`, matching spec §3. If any
    /// segment normalizes to exactly `/**`, the whole pattern collapses
    /// to "matches everything" and the rest are never compiled.
    pub fn parse(spec: &str) -> Result<Self> {
        let segments: Vec<String> = spec
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(Self::normalize_segment)
            .collect();

        if segments.is_empty() {
            return Err(DogmaError::InvalidPathPattern(spec.to_string()));
        }

        if segments.iter().any(|s| s == MATCH_ALL) {
            return Ok(Self {
                raw: spec.to_string(),
                match_all: true,
                set: None,
            });
        }

        let mut builder = GlobSetBuilder::new();
        for segment in &segments {
            let glob = Glob::new(segment)
                .map_err(|e| DogmaError::InvalidPathPattern(format!("{segment}: {e}")))?;
            builder.add(glob);
        }
        let set = builder
            .build()
            .map_err(|e| DogmaError::InvalidPathPattern(e.to_string()))?;

        Ok(Self {
            raw: spec.to_string(),
            match_all: false,
            set: Some(set),
        })
    }

    /// A pattern that matches every path; used as the default watch/diff
    /// scope and as the collapse target for `/**`.
    pub fn all() -> Self {
        Self {
            raw: MATCH_ALL.to_string(),
            match_all: true,
            set: None,
        }
    }

    fn normalize_segment(segment: &str) -> String {
        if segment.starts_with('/') {
            segment.to_string()
        } else {
            format!("/**/{segment}")
        }
    }

    pub fn matches(&self, path: &str) -> bool {
        if self.match_all {
            return true;
        }
        self.set.as_ref().is_some_and(|set| set.is_match(path))
    }

    pub fn matches_any(&self, paths: impl IntoIterator<Item = impl AsRef<str>>) -> bool {
        paths.into_iter().any(|p| self.matches(p.as_ref()))
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }
}

impl std::fmt::Debug for PathPattern {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "PathPattern({})", self.raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bare_segment_is_prefixed_with_double_star() {
        let p = PathPattern::parse("a.json").unwrap();
        assert!(p.matches("/nested/deeper/a.json"));
        assert!(p.matches("/a.json"));
    }

    #[test]
    fn double_star_root_matches_everything() {
        let p = PathPattern::parse("/**").unwrap();
        assert!(p.matches("/anything/at/all.txt"));
    }

    #[test]
    fn match_all_subsumes_other_segments() {
        let p = PathPattern::parse("/a/*.json,/**,/b/**").unwrap();
        assert!(p.matches("/totally/unrelated"));
    }

    #[test]
    fn single_star_does_not_cross_segment_boundary() {
        let p = PathPattern::parse("/a/*.json").unwrap();
        assert!(p.matches("/a/b.json"));
        assert!(!p.matches("/a/nested/b.json"));
    }

    #[test]
    fn comma_separated_list_matches_any_segment() {
        let p = PathPattern::parse("/a/**, /b/**").unwrap();
        assert!(p.matches("/a/x"));
        assert!(p.matches("/b/y"));
        assert!(!p.matches("/c/z"));
    }
}
