mod producers;
mod types;

pub use producers::{image_preview, text_notice};
pub use types::{Expansion, NoticePolicy, THUMBNAIL_SIZE};
