pub mod detector;
pub mod types;

pub use detector::detect_urls;
pub use types::UrlRef;
