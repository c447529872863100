//! Content negotiation subsystem.
//!
//! # Data Flow
//! ```text
//! built-in formatters + user formatters ("type; q=x" → fn)
//!     → FormatterTable (merged, quality-sorted)
//!     → ContentNegotiator::get_formatter(ctx)
//!     → Return: Formatter, or None (response marked 406)
//! ```

pub mod formatter;
pub mod negotiator;

pub use formatter::{formatter, Formatter};
pub use negotiator::{lookup, negotiate, ContentNegotiator, FormatterTable};
