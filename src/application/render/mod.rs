//! Renderer boundary.
//!
//! Renderers are external engines. The orchestrator only knows how to ask
//! them for an output format, a capability document, a fallback download
//! name, and the document bytes themselves.

mod types;

pub use types::{ForwardedHeaders, RenderError, Renderer};
