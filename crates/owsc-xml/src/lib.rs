//! Minimal XML element trees for configuration documents.
//!
//! Documents are parsed eagerly into an immutable [`Element`] tree. Parse
//! failures carry a message and a 1-based line/column location so callers can
//! report exactly where a configuration file is broken.

mod error;
mod line_index;
mod parser;
mod tree;

pub use error::ParseError;
pub use line_index::LineCol;
pub use line_index::LineIndex;
pub use parser::parse;
pub use parser::MAX_DEPTH;
pub use tree::Element;
pub use tree::Node;
pub use tree::XmlDocument;
