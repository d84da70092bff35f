//! Include/exclude path patterns for partial clones
//!
//! A pattern is split on `/` into segments. A `**` segment matches zero or
//! more whole path segments; every other segment is a glob matched against
//! exactly one path segment, so `*` never crosses a `/`. A trailing `**`
//! must match at least one segment, so `docs/**` selects what is under
//! `docs` but not a file called `docs`.
//!
//! | Pattern        | Selects                                        |
//! |----------------|------------------------------------------------|
//! | `*.md`         | markdown files at the root                     |
//! | `**/*.go`      | Go files at any depth                          |
//! | `src/**`       | everything under `src`                         |
//! | `src/**/*.rs`  | Rust files anywhere under `src`                |
//! | `**/vendor/**` | everything under any directory named `vendor`  |

use anyhow::Context;
use globset::{GlobBuilder, GlobMatcher};
use std::collections::HashSet;

/// Nested `**` expansions explored before a match attempt gives up
pub const MAX_RECURSION_DEPTH: usize = 50;

#[derive(Debug, Clone)]
enum Segment {
    AnyDepth,
    Glob(GlobMatcher),
}

/// One compiled pattern
#[derive(Debug, Clone)]
pub struct PathPattern {
    source: String,
    segments: Vec<Segment>,
}

impl PathPattern {
    pub fn new(pattern: &str) -> anyhow::Result<Self> {
        let trimmed = pattern.trim_matches('/');
        if trimmed.is_empty() {
            anyhow::bail!("empty path pattern {pattern:?}");
        }

        let mut segments = Vec::new();
        for part in trimmed.split('/').filter(|part| !part.is_empty()) {
            if part == "**" {
                // consecutive `**` segments are equivalent to one
                if !matches!(segments.last(), Some(Segment::AnyDepth)) {
                    segments.push(Segment::AnyDepth);
                }
                continue;
            }

            let matcher = GlobBuilder::new(part)
                .literal_separator(true)
                .build()
                .with_context(|| format!("invalid glob segment {part:?} in {pattern:?}"))?
                .compile_matcher();
            segments.push(Segment::Glob(matcher));
        }

        Ok(PathPattern {
            source: pattern.to_string(),
            segments,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.source
    }

    pub fn matches(&self, path: &str) -> bool {
        let parts = path
            .split('/')
            .filter(|part| !part.is_empty())
            .collect::<Vec<_>>();

        SegmentMatcher::new(&self.segments, &parts).matches_from(0, 0, 0)
    }
}

/// Backtracking matcher that remembers the positions already known to fail
struct SegmentMatcher<'a> {
    pattern: &'a [Segment],
    path: &'a [&'a str],
    failed: HashSet<(usize, usize)>,
}

impl<'a> SegmentMatcher<'a> {
    fn new(pattern: &'a [Segment], path: &'a [&'a str]) -> Self {
        SegmentMatcher {
            pattern,
            path,
            failed: HashSet::new(),
        }
    }

    /// `depth` counts the `**` segments before `segment`, so a failed
    /// `(segment, part)` pair fails the same way on every route to it
    fn matches_from(&mut self, segment: usize, part: usize, depth: usize) -> bool {
        if depth > MAX_RECURSION_DEPTH || self.failed.contains(&(segment, part)) {
            return false;
        }

        let (pattern, path) = (self.pattern, self.path);
        let matched = match pattern.get(segment) {
            None => part == path.len(),
            Some(Segment::AnyDepth) if segment + 1 == pattern.len() => part < path.len(),
            Some(Segment::AnyDepth) => {
                (part..=path.len()).any(|next| self.matches_from(segment + 1, next, depth + 1))
            }
            Some(Segment::Glob(matcher)) => {
                path.get(part).is_some_and(|name| matcher.is_match(name))
                    && self.matches_from(segment + 1, part + 1, depth)
            }
        };

        if !matched {
            self.failed.insert((segment, part));
        }
        matched
    }
}

/// Include and exclude pattern sets
///
/// Exclusion wins. With no include patterns every path not excluded is
/// selected.
#[derive(Debug, Clone, Default)]
pub struct PathFilter {
    include: Vec<PathPattern>,
    exclude: Vec<PathPattern>,
}

impl PathFilter {
    pub fn new<S: AsRef<str>>(include: &[S], exclude: &[S]) -> anyhow::Result<Self> {
        let compile = |patterns: &[S]| {
            patterns
                .iter()
                .map(|pattern| PathPattern::new(pattern.as_ref()))
                .collect::<anyhow::Result<Vec<_>>>()
        };

        Ok(PathFilter {
            include: compile(include)?,
            exclude: compile(exclude)?,
        })
    }

    pub fn is_empty(&self) -> bool {
        self.include.is_empty() && self.exclude.is_empty()
    }

    pub fn matches(&self, path: &str) -> bool {
        if self.exclude.iter().any(|pattern| pattern.matches(path)) {
            return false;
        }

        self.include.is_empty() || self.include.iter().any(|pattern| pattern.matches(path))
    }
}
