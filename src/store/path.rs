use std::fmt;

use super::{StoreError, StoreResult};

const FORBIDDEN: &[char] = &['.', '$', '#', '[', ']', '/'];

/// A validated location in the document tree, e.g. `accounts/abc/balance`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StorePath {
    segments: Vec<String>,
}

impl StorePath {
    pub fn root(segment: &str) -> StoreResult<Self> {
        check_segment(segment)?;
        Ok(StorePath {
            segments: vec![segment.to_string()],
        })
    }

    /// Parses `a/b/c`. Leading and trailing slashes are ignored.
    pub fn parse(raw: &str) -> StoreResult<Self> {
        let segments: Vec<String> = raw
            .trim_matches('/')
            .split('/')
            .map(str::to_string)
            .collect();
        for s in &segments {
            check_segment(s).map_err(|_| StoreError::InvalidPath {
                path: raw.to_string(),
                reason: "segments must be non-empty and free of . $ # [ ]",
            })?;
        }
        Ok(StorePath { segments })
    }

    pub fn child(&self, segment: &str) -> StoreResult<Self> {
        check_segment(segment).map_err(|_| StoreError::InvalidPath {
            path: format!("{self}/{segment}"),
            reason: "segments must be non-empty and free of . $ # [ ] /",
        })?;
        let mut segments = self.segments.clone();
        segments.push(segment.to_string());
        Ok(StorePath { segments })
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    pub fn depth(&self) -> usize {
        self.segments.len()
    }

    pub fn last(&self) -> &str {
        self.segments.last().map(String::as_str).unwrap_or_default()
    }

    pub fn starts_with(&self, prefix: &StorePath) -> bool {
        self.segments.len() >= prefix.segments.len()
            && self.segments.iter().zip(&prefix.segments).all(|(a, b)| a == b)
    }

    /// True when a change at one path can alter the value seen at the other.
    pub fn is_related(&self, other: &StorePath) -> bool {
        self.starts_with(other) || other.starts_with(self)
    }
}

impl fmt::Display for StorePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.segments.join("/"))
    }
}

fn check_segment(segment: &str) -> StoreResult<()> {
    if segment.is_empty() || segment.contains(FORBIDDEN) {
        return Err(StoreError::InvalidPath {
            path: segment.to_string(),
            reason: "segments must be non-empty and free of . $ # [ ] /",
        });
    }
    Ok(())
}
