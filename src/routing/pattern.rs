//! Path patterns.
//!
//! # Responsibilities
//! - Compile `/widgets/:id` style paths into segment matchers
//! - Extract named parameters, percent-decoded
//!
//! # Design Decisions
//! - Literal segments match case-insensitively
//! - A single trailing slash on the request path is tolerated
//! - Root `/` is special-cased and never splits the path
//! - No regex: a match is one pass over the request segments

use std::collections::HashMap;
use std::fmt;
use percent_encoding::percent_decode_str;

use crate::dispatch::HttpError;
use crate::routing::compiler::RouteError;

/// Named route parameters.
pub type Params = HashMap<String, String>;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Param(String),
}

/// A compiled path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathPattern {
    source: String,
    segments: Vec<Segment>,
    keys: Vec<String>,
}

impl PathPattern {
    /// Compile an absolute, normalized path.
    pub fn compile(path: &str) -> Result<Self, RouteError> {
        let mut segments = Vec::new();
        let mut keys = Vec::new();

        if path != "/" {
            let body = path.strip_prefix('/').unwrap_or(path);
            for piece in body.split('/') {
                match piece.strip_prefix(':') {
                    Some(name) => {
                        if !is_param_name(name) {
                            return Err(RouteError::InvalidParam {
                                path: path.to_string(),
                                name: name.to_string(),
                            });
                        }
                        keys.push(name.to_string());
                        segments.push(Segment::Param(name.to_string()));
                    }
                    None => segments.push(Segment::Literal(piece.to_string())),
                }
            }
        }

        Ok(Self {
            source: path.to_string(),
            segments,
            keys,
        })
    }

    pub fn is_root(&self) -> bool {
        self.segments.is_empty()
    }

    /// Parameter names in declaration order.
    pub fn keys(&self) -> &[String] {
        &self.keys
    }

    pub fn as_str(&self) -> &str {
        &self.source
    }

    /// Match a request path.
    ///
    /// `Ok(None)` means no match. A matching path whose parameters cannot be
    /// decoded is a 400.
    pub fn match_path(&self, path: &str) -> Result<Option<Params>, HttpError> {
        if self.is_root() {
            return Ok((path == "/" || path.is_empty()).then(Params::new));
        }

        let Some(rest) = path.strip_prefix('/') else {
            return Ok(None);
        };
        let rest = rest.strip_suffix('/').unwrap_or(rest);

        let mut raw = Vec::with_capacity(self.keys.len());
        let mut pieces = rest.split('/');
        for segment in &self.segments {
            let Some(piece) = pieces.next() else {
                return Ok(None);
            };
            match segment {
                Segment::Literal(literal) => {
                    if !literal.eq_ignore_ascii_case(piece) {
                        return Ok(None);
                    }
                }
                Segment::Param(name) => {
                    if piece.is_empty() {
                        return Ok(None);
                    }
                    raw.push((name, piece));
                }
            }
        }
        if pieces.next().is_some() {
            return Ok(None);
        }

        let mut params = Params::with_capacity(raw.len());
        for (name, value) in raw {
            params.insert(name.clone(), decode_param(value)?);
        }
        Ok(Some(params))
    }
}

impl fmt::Display for PathPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

fn is_param_name(name: &str) -> bool {
    !name.is_empty() && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
}

fn decode_param(value: &str) -> Result<String, HttpError> {
    let failed = || HttpError::bad_request(format!("Failed to decode param '{value}'"));

    // Every '%' must start a complete escape.
    let bytes = value.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' {
            let escape = bytes.get(i + 1..i + 3).ok_or_else(failed)?;
            if !escape.iter().all(u8::is_ascii_hexdigit) {
                return Err(failed());
            }
            i += 3;
        } else {
            i += 1;
        }
    }

    percent_decode_str(value)
        .decode_utf8()
        .map(|decoded| decoded.into_owned())
        .map_err(|_| failed())
}
