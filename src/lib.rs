pub mod config;
pub mod error;
pub mod expansion;
pub mod fetch;
pub mod links;
pub mod logging;
pub mod media;
pub mod metadata;
pub mod pipeline;

pub use error::{FetchError, LinkPreviewError, Result};
pub use pipeline::LinkPreviewer;
