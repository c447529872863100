//! Formatter table and content negotiation.
//!
//! # Responsibilities
//! - Merge built-in and user formatters into one quality-sorted table
//! - Pick the formatter for a response (declared type, else `Accept`)
//! - Mark unformattable responses (406 for 2xx statuses)
//!
//! # Data Flow
//! ```text
//! response Content-Type? ── yes → strip parameters
//!          │ no
//!          → Accept vs acceptable (q desc, specificity, client order, server order)
//!          → nothing acceptable: 2xx → 406, return None
//! type registered? ── no → application/octet-stream (if registered)
//! append charset → set Content-Type → Formatter
//! ```
//!
//! # Design Decisions
//! - The table is built once and swapped whole on reconfiguration
//! - User formatters replace built-ins of the same media type

use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::Arc;
use arc_swap::ArcSwap;
use axum::http::{header, StatusCode};
use mime::Mime;

use crate::dispatch::RequestContext;
use crate::negotiation::formatter::{self, Formatter};

const OCTET_STREAM: &str = "application/octet-stream";

/// Media types in preference order plus their formatters.
#[derive(Clone, Default)]
pub struct FormatterTable {
    formatters: HashMap<String, Formatter>,
    acceptable: Vec<(String, f32)>,
}

impl FormatterTable {
    /// Built-in json, text and binary formatters.
    pub fn builtin() -> Self {
        Self::with_user(Vec::new())
    }

    /// Built-ins overridden and extended by `user` entries
    /// (`"media/type; q=0.5"` or a short name such as `"csv"`).
    pub fn with_user(user: Vec<(String, Formatter)>) -> Self {
        let mut table = Self::default();
        for (key, formatter) in formatter::builtin().into_iter().chain(user) {
            table.add(&key, formatter);
        }
        // Stable: equal weights keep registration order.
        table
            .acceptable
            .sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(Ordering::Equal));
        table
    }

    fn add(&mut self, key: &str, formatter: Formatter) {
        let mut parts = key.split(';').map(str::trim);
        let media = parts.next().unwrap_or_default();
        let media = if media.contains('/') {
            media.to_ascii_lowercase()
        } else {
            lookup(media).to_string()
        };
        // RFC 2616 §14: q defaults to 1.
        let q = parts
            .find_map(|param| param.strip_prefix("q="))
            .and_then(|q| q.trim().parse::<f32>().ok())
            .unwrap_or(1.0);

        match self.acceptable.iter_mut().find(|(t, _)| *t == media) {
            Some(entry) => entry.1 = q,
            None => self.acceptable.push((media.clone(), q)),
        }
        self.formatters.insert(media, formatter);
    }

    /// Registered media types, most preferred first.
    pub fn acceptable(&self) -> impl Iterator<Item = &str> {
        self.acceptable.iter().map(|(t, _)| t.as_str())
    }

    pub fn get(&self, media: &str) -> Option<&Formatter> {
        self.formatters.get(media)
    }

    fn is_acceptable(&self, media: &str) -> bool {
        self.acceptable.iter().any(|(t, _)| t == media)
    }
}

/// Resolves formatters for responses.
pub struct ContentNegotiator {
    table: ArcSwap<FormatterTable>,
}

impl ContentNegotiator {
    pub fn new(table: FormatterTable) -> Self {
        Self {
            table: ArcSwap::from_pointee(table),
        }
    }

    /// Replace the formatter table.
    pub fn reconfigure(&self, table: FormatterTable) {
        self.table.store(Arc::new(table));
    }

    pub fn table(&self) -> Arc<FormatterTable> {
        self.table.load_full()
    }

    /// Pick a formatter and set the response `Content-Type`.
    ///
    /// Returns `None` when nothing acceptable is registered; a 2xx status is
    /// then turned into 406.
    pub fn get_formatter(&self, ctx: &mut RequestContext) -> Option<Formatter> {
        let table = self.table.load();

        let declared = ctx
            .response
            .content_type()
            .and_then(|t| t.split(';').next())
            .map(|t| t.trim().to_ascii_lowercase());

        let mut media = match declared {
            Some(media) => media,
            None => match negotiate(ctx.accept(), table.acceptable()) {
                Some(media) => media,
                None => {
                    if ctx.response.status.is_success() {
                        ctx.response.status = StatusCode::NOT_ACCEPTABLE;
                    }
                    return None;
                }
            },
        };

        let formatter = match table.get(&media) {
            Some(formatter) => formatter.clone(),
            None => {
                if !media.contains('/') {
                    media = lookup(&media).to_string();
                }
                if !table.is_acceptable(&media) {
                    media = OCTET_STREAM.to_string();
                }
                table.get(&media).or_else(|| table.get("*/*"))?.clone()
            }
        };

        let content_type = match &ctx.response.charset {
            Some(charset) => format!("{media}; charset={charset}"),
            None => media,
        };
        ctx.response.set_header(header::CONTENT_TYPE, &content_type);
        Some(formatter)
    }
}

impl Default for ContentNegotiator {
    fn default() -> Self {
        Self::new(FormatterTable::builtin())
    }
}

struct MediaRange {
    mime: Mime,
    q: f32,
    index: usize,
}

fn parse_accept(accept: &str) -> Vec<MediaRange> {
    accept
        .split(',')
        .enumerate()
        .filter_map(|(index, range)| {
            let mime: Mime = range.trim().parse().ok()?;
            let q = mime
                .get_param("q")
                .and_then(|q| q.as_str().parse::<f32>().ok())
                .unwrap_or(1.0);
            Some(MediaRange { mime, q, index })
        })
        .collect()
}

// Specificity of `range` for `offer`, if it matches at all.
fn specificity(range: &Mime, offer: &Mime) -> Option<u8> {
    let mut score = 0;
    if range.type_() == offer.type_() {
        score |= 4;
    } else if range.type_() != mime::STAR {
        return None;
    }
    if range.subtype() == offer.subtype() {
        score |= 2;
    } else if range.subtype() != mime::STAR {
        return None;
    }
    Some(score)
}

/// Best offer for an `Accept` header; offers are in server preference order.
///
/// A missing or unparseable header accepts the first offer.
pub fn negotiate<'a>(accept: Option<&str>, offers: impl Iterator<Item = &'a str>) -> Option<String> {
    let offers: Vec<&str> = offers.collect();
    let ranges = accept.map(parse_accept).unwrap_or_default();
    if ranges.is_empty() {
        return offers.first().map(|o| o.to_string());
    }

    // (q, specificity, client index, server index)
    let mut candidates: Vec<(f32, u8, usize, usize, &str)> = Vec::new();
    for (server_index, offer) in offers.iter().enumerate() {
        let Ok(offer_mime) = offer.parse::<Mime>() else {
            continue;
        };
        let best = ranges
            .iter()
            .filter_map(|range| specificity(&range.mime, &offer_mime).map(|s| (range, s)))
            .max_by(|(a, sa), (b, sb)| {
                sa.cmp(sb)
                    .then(a.q.partial_cmp(&b.q).unwrap_or(Ordering::Equal))
                    .then(b.index.cmp(&a.index))
            });
        if let Some((range, s)) = best {
            if range.q > 0.0 {
                candidates.push((range.q, s, range.index, server_index, offer));
            }
        }
    }

    candidates.sort_by(|a, b| {
        b.0.partial_cmp(&a.0)
            .unwrap_or(Ordering::Equal)
            .then(b.1.cmp(&a.1))
            .then(a.2.cmp(&b.2))
            .then(a.3.cmp(&b.3))
    });
    candidates.first().map(|c| c.4.to_string())
}

/// Media type for a short name (`json`, `txt`, ...); unknown names map to octet-stream.
pub fn lookup(name: &str) -> &'static str {
    match name.trim_start_matches('.').to_ascii_lowercase().as_str() {
        "json" => "application/json",
        "text" | "txt" => "text/plain",
        "html" | "htm" => "text/html",
        "xml" => "application/xml",
        "csv" => "text/csv",
        "js" => "application/javascript",
        "css" => "text/css",
        "form" => "application/x-www-form-urlencoded",
        _ => OCTET_STREAM,
    }
}
