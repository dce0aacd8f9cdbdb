//! Route pattern parsing and matching.
//!
//! # Syntax
//! - `/accounts`: static segment
//! - `/accounts/{id}`: named parameter, matches one non-empty segment
//! - `/accounts/{id:[0-9]+}`: parameter constrained by a regex
//! - `/files/*` or `/files/{*rest}`: catch-all, last segment only
//!
//! # Design Decisions
//! - Regex constraints are anchored to the whole segment
//! - A segment is either literal or a parameter, never both
//! - A trailing `/` is significant: `/a/` ends in an empty static segment

use regex::Regex;
use thiserror::Error;

/// Name used for an anonymous `*` catch-all.
pub const CATCH_ALL: &str = "*";

/// Errors from parsing a route pattern.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PatternError {
    #[error("route pattern must start with '/': {0:?}")]
    MissingLeadingSlash(String),

    #[error("catch-all must be the last segment: {0:?}")]
    CatchAllNotLast(String),

    #[error("segment mixes literal text and a parameter: {0:?}")]
    MixedSegment(String),

    #[error("empty parameter name in {0:?}")]
    EmptyParameter(String),

    #[error("invalid regex {regex:?} in {pattern:?}: {message}")]
    InvalidRegex {
        pattern: String,
        regex: String,
        message: String,
    },
}

/// A regex constraint on a parameter segment.
#[derive(Debug, Clone)]
pub struct Constraint {
    source: String,
    regex: Regex,
}

impl Constraint {
    fn new(source: &str, pattern: &str) -> Result<Self, PatternError> {
        let regex = Regex::new(&format!("^(?:{})$", source)).map_err(|e| PatternError::InvalidRegex {
            pattern: pattern.to_string(),
            regex: source.to_string(),
            message: e.to_string(),
        })?;
        Ok(Self {
            source: source.to_string(),
            regex,
        })
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn is_match(&self, value: &str) -> bool {
        self.regex.is_match(value)
    }
}

impl PartialEq for Constraint {
    fn eq(&self, other: &Self) -> bool {
        self.source == other.source
    }
}

/// One parsed path segment.
#[derive(Debug, Clone, PartialEq)]
pub enum Segment {
    Static(String),
    Param {
        name: String,
        constraint: Option<Constraint>,
    },
    CatchAll(String),
}

impl Segment {
    fn parse(raw: &str, pattern: &str) -> Result<Self, PatternError> {
        if raw == CATCH_ALL {
            return Ok(Segment::CatchAll(CATCH_ALL.to_string()));
        }
        if let Some(inner) = raw.strip_prefix('{').and_then(|s| s.strip_suffix('}')) {
            if let Some(name) = inner.strip_prefix('*') {
                let name = if name.is_empty() { CATCH_ALL } else { name };
                return Ok(Segment::CatchAll(name.to_string()));
            }
            let (name, constraint) = match inner.split_once(':') {
                Some((name, regex)) => (name, Some(Constraint::new(regex, pattern)?)),
                None => (inner, None),
            };
            if name.is_empty() {
                return Err(PatternError::EmptyParameter(pattern.to_string()));
            }
            return Ok(Segment::Param {
                name: name.to_string(),
                constraint,
            });
        }
        if raw.contains('{') || raw.contains('}') {
            return Err(PatternError::MixedSegment(pattern.to_string()));
        }
        Ok(Segment::Static(raw.to_string()))
    }

    /// Whether a single request segment satisfies this parameter.
    pub(crate) fn accepts(&self, value: &str) -> bool {
        match self {
            Segment::Static(s) => s == value,
            Segment::Param { constraint, .. } => {
                !value.is_empty() && constraint.as_ref().map_or(true, |c| c.is_match(value))
            }
            Segment::CatchAll(_) => true,
        }
    }
}

/// Parameters captured while matching a request path.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PathParams(Vec<(String, String)>);

impl PathParams {
    pub fn get(&self, name: &str) -> Option<&str> {
        self.0.iter().find(|(k, _)| k == name).map(|(_, v)| v.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub(crate) fn push(&mut self, name: &str, value: String) {
        self.0.push((name.to_string(), value));
    }

    pub(crate) fn pop(&mut self) {
        self.0.pop();
    }
}

/// A parsed route pattern.
#[derive(Debug, Clone, PartialEq)]
pub struct Pattern {
    raw: String,
    segments: Vec<Segment>,
}

impl Pattern {
    pub fn parse(raw: &str) -> Result<Self, PatternError> {
        let rest = raw
            .strip_prefix('/')
            .ok_or_else(|| PatternError::MissingLeadingSlash(raw.to_string()))?;

        let parts: Vec<&str> = rest.split('/').collect();
        let mut segments = Vec::with_capacity(parts.len());
        for (i, part) in parts.iter().enumerate() {
            let segment = Segment::parse(part, raw)?;
            if matches!(segment, Segment::CatchAll(_)) && i + 1 != parts.len() {
                return Err(PatternError::CatchAllNotLast(raw.to_string()));
            }
            segments.push(segment);
        }

        Ok(Self {
            raw: raw.to_string(),
            segments,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    /// Match a request path against this pattern alone.
    pub fn match_path(&self, path: &str) -> Option<PathParams> {
        let parts = split_path(path);
        let mut params = PathParams::default();
        for (i, segment) in self.segments.iter().enumerate() {
            match segment {
                Segment::CatchAll(name) => {
                    let rest = parts.get(i..).filter(|r| !r.is_empty())?;
                    params.push(name, rest.join("/"));
                    return Some(params);
                }
                Segment::Param { name, .. } => {
                    let value = parts.get(i)?;
                    if !segment.accepts(value) {
                        return None;
                    }
                    params.push(name, value.to_string());
                }
                Segment::Static(_) => {
                    if !segment.accepts(parts.get(i)?) {
                        return None;
                    }
                }
            }
        }
        (parts.len() == self.segments.len()).then_some(params)
    }
}

/// Split a request path into segments the way patterns are split.
pub(crate) fn split_path(path: &str) -> Vec<&str> {
    path.strip_prefix('/').unwrap_or(path).split('/').collect()
}
