//! Variable templates.
//!
//! A manifest variable is a literal string that may embed references to
//! resolved artifacts: `${path:NAME}`, `${version:NAME}` and `${bin:NAME}`.
//! `$$` produces a literal `$`; a `$` not followed by `{` or `$` is kept as-is.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ExprError {
    #[error("unterminated '${{' at byte {0}")]
    Unterminated(usize),
    #[error("unknown reference function '{0}', expected path, version or bin")]
    UnknownFunction(String),
    #[error("reference '{0}' must have the form '<function>:<artifact>'")]
    InvalidReference(String),
    #[error("reference '{function}:{artifact}' names an artifact that is not part of the resolution")]
    Unbound { function: RefKind, artifact: String },
}

/// What a reference extracts from the artifact it names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RefKind {
    Path,
    Version,
    Bin,
}

impl fmt::Display for RefKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RefKind::Path => write!(f, "path"),
            RefKind::Version => write!(f, "version"),
            RefKind::Bin => write!(f, "bin"),
        }
    }
}

impl RefKind {
    fn from_name(name: &str) -> Option<Self> {
        match name {
            "path" => Some(RefKind::Path),
            "version" => Some(RefKind::Version),
            "bin" => Some(RefKind::Bin),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Reference { kind: RefKind, artifact: String },
}

/// A parsed variable value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Template {
    segments: Vec<Segment>,
}

impl Template {
    pub fn parse(input: &str) -> Result<Self, ExprError> {
        let mut segments = Vec::new();
        let mut literal = String::new();
        let mut rest = input;
        let mut offset = 0usize;

        while let Some(idx) = rest.find('$') {
            literal.push_str(&rest[..idx]);
            let after = &rest[idx + 1..];
            if let Some(tail) = after.strip_prefix('$') {
                literal.push('$');
                offset += idx + 2;
                rest = tail;
            } else if let Some(body) = after.strip_prefix('{') {
                let Some(close) = body.find('}') else {
                    return Err(ExprError::Unterminated(offset + idx));
                };
                let reference = &body[..close];
                let (kind, artifact) = parse_reference(reference)?;
                if !literal.is_empty() {
                    segments.push(Segment::Literal(std::mem::take(&mut literal)));
                }
                segments.push(Segment::Reference { kind, artifact });
                let consumed = idx + 2 + close + 1;
                offset += consumed;
                rest = &rest[consumed..];
            } else {
                literal.push('$');
                offset += idx + 1;
                rest = after;
            }
        }
        literal.push_str(rest);
        if !literal.is_empty() {
            segments.push(Segment::Literal(literal));
        }

        Ok(Self { segments })
    }

    /// Expand every reference through `lookup`. A `None` from the lookup means
    /// the artifact is unknown and yields [`ExprError::Unbound`].
    pub fn expand<F>(&self, mut lookup: F) -> Result<String, ExprError>
    where
        F: FnMut(RefKind, &str) -> Option<String>,
    {
        let mut out = String::new();
        for segment in &self.segments {
            match segment {
                Segment::Literal(text) => out.push_str(text),
                Segment::Reference { kind, artifact } => {
                    let value = lookup(*kind, artifact).ok_or_else(|| ExprError::Unbound {
                        function: *kind,
                        artifact: artifact.clone(),
                    })?;
                    out.push_str(&value);
                }
            }
        }
        Ok(out)
    }
}

fn parse_reference(reference: &str) -> Result<(RefKind, String), ExprError> {
    let Some((function, artifact)) = reference.split_once(':') else {
        return Err(ExprError::InvalidReference(reference.to_owned()));
    };
    let function = function.trim();
    let artifact = artifact.trim();
    if artifact.is_empty() {
        return Err(ExprError::InvalidReference(reference.to_owned()));
    }
    let kind = RefKind::from_name(function)
        .ok_or_else(|| ExprError::UnknownFunction(function.to_owned()))?;
    Ok((kind, artifact.to_owned()))
}

/// Valid variable names match `[A-Za-z_][A-Za-z0-9_]*`.
pub fn is_valid_variable_name(name: &str) -> bool {
    let mut bytes = name.bytes();
    match bytes.next() {
        Some(b) if b.is_ascii_alphabetic() || b == b'_' => {}
        _ => return false,
    }
    bytes.all(|b| b.is_ascii_alphanumeric() || b == b'_')
}
