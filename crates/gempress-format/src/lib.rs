//! Gempress Formatters
//!
//! Stateless per-line rewrite pass turning Markdown/MDX documents into
//! gemtext. Each formatter transforms (or drops) a single line; the
//! pipeline tracks preformatted blocks and defers generated link lines
//! until the next blank line.
//!
//! The registry is built once at process startup; formatters carry no
//! global registration side effects.

pub mod line;
pub mod pipeline;
pub mod registry;

pub use line::{FormatterFlags, LineFormatter};
pub use pipeline::format_document;
pub use registry::FormatterRegistry;
