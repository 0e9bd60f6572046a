use super::types::{Expansion, NoticePolicy, THUMBNAIL_SIZE};
use crate::metadata::{FetchResult, Metadata};

/// Image preview for metadata whose image was re-hosted.
///
/// Only `uploaded_image_ref` is considered; an image that was found but
/// never uploaded produces nothing.
pub fn image_preview(metadata: &Metadata) -> Expansion {
    match metadata
        .uploaded_image_ref
        .as_deref()
        .filter(|r| !r.is_empty())
    {
        Some(uploaded) => Expansion::ImagePreview {
            image_ref: uploaded.to_string(),
            width: THUMBNAIL_SIZE,
            height: THUMBNAIL_SIZE,
            caption: metadata.title.clone().unwrap_or_default(),
        },
        None => {
            tracing::debug!(
                canonical_url = ?metadata.canonical_url,
                "No uploaded image, skipping image preview"
            );
            Expansion::None
        }
    }
}

/// Rich-text notice linking the page with its title and description.
///
/// Fires when a title or a description is present. Failed lookups produce
/// an error notice only when the policy asks for it.
pub fn text_notice(result: &FetchResult, policy: &NoticePolicy) -> Expansion {
    let Some(metadata) = result.metadata.as_deref() else {
        return match (&result.error, policy.error_notices) {
            (Some(error), true) => Expansion::NoticePreview {
                html_body: format!("Error fetching: {}", escape_html(&error.to_string())),
            },
            _ => Expansion::None,
        };
    };

    let title = metadata.title.as_deref().filter(|t| !t.is_empty());
    let description = metadata.description.as_deref().filter(|d| !d.is_empty());
    if title.is_none() && description.is_none() {
        tracing::debug!(
            canonical_url = ?metadata.canonical_url,
            "No title or description, skipping notice"
        );
        return Expansion::None;
    }

    let href = metadata.canonical_url.as_deref().unwrap_or_default();
    let label = title.unwrap_or(href);

    Expansion::NoticePreview {
        html_body: format!(
            "<a href=\"{}\">{}</a><br>{}",
            escape_html(href),
            escape_html(label),
            escape_html(description.unwrap_or_default())
        ),
    }
}

fn escape_html(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            _ => escaped.push(ch),
        }
    }
    escaped
}
