use serde::Serialize;

/// Side length of the preview thumbnail posted for a relocated image
pub const THUMBNAIL_SIZE: u32 = 120;

/// Outbound chat message produced for a detected URL
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Expansion {
    ImagePreview {
        image_ref: String,
        width: u32,
        height: u32,
        caption: String,
    },
    NoticePreview {
        html_body: String,
    },
    None,
}

impl Expansion {
    pub fn is_none(&self) -> bool {
        matches!(self, Expansion::None)
    }
}

/// How the notice producer reacts to failed lookups
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NoticePolicy {
    /// Post "Error fetching: ..." instead of staying silent
    pub error_notices: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_serializes_with_kind_tag() {
        let json = serde_json::to_value(Expansion::NoticePreview {
            html_body: "hi".to_string(),
        })
        .unwrap();
        assert_eq!(json["kind"], "notice_preview");
        assert_eq!(json["html_body"], "hi");
    }
}
