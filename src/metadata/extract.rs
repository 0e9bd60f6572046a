//! Structured-tag extraction with a plain `<title>` fallback

use super::types::{MetaTag, Metadata};
use scraper::{Html, Selector};
use std::collections::HashMap;
use url::Url;

/// Extract preview metadata from a response body.
///
/// Never fails: unknown or malformed tags are skipped and missing fields stay
/// `None`. `requested_url` is the fallback canonical URL and the base for
/// relative image references.
pub fn extract(body: &[u8], content_type: Option<&str>, requested_url: &str) -> Metadata {
    let mime = content_type.map(mime_essence).filter(|m| !m.is_empty());

    if !is_html(mime.as_deref()) {
        return extract_non_html(mime, requested_url);
    }

    let html = String::from_utf8_lossy(body);
    let document = Html::parse_document(&html);
    let mut tags = read_meta_tags(&document);

    let title = tags
        .remove(&MetaTag::Title)
        .or_else(|| first_title_element(&document));

    // og:description wins over a plain description when both are present
    let description = tags
        .remove(&MetaTag::OgDescription)
        .or_else(|| tags.remove(&MetaTag::Description));

    let image_ref = tags
        .remove(&MetaTag::Image)
        .and_then(|img| resolve_reference(requested_url, &img));

    Metadata {
        title,
        description,
        content_type: tags.remove(&MetaTag::Type).or(mime),
        canonical_url: Some(
            tags.remove(&MetaTag::Url)
                .unwrap_or_else(|| requested_url.to_string()),
        ),
        image_ref,
        video_width: tags.remove(&MetaTag::VideoWidth).and_then(parse_dimension),
        video_height: tags.remove(&MetaTag::VideoHeight).and_then(parse_dimension),
        uploaded_image_ref: None,
    }
}

fn extract_non_html(mime: Option<String>, requested_url: &str) -> Metadata {
    let is_image = mime.as_deref().is_some_and(|m| m.starts_with("image/"));

    tracing::debug!(
        url = %requested_url,
        content_type = ?mime,
        is_image = is_image,
        "Skipping tag extraction for non-HTML response"
    );

    Metadata {
        image_ref: is_image.then(|| requested_url.to_string()),
        content_type: mime,
        canonical_url: Some(requested_url.to_string()),
        ..Default::default()
    }
}

fn mime_essence(content_type: &str) -> String {
    content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase()
}

fn is_html(mime: Option<&str>) -> bool {
    match mime {
        None => true,
        Some(m) => m == "text/html" || m == "application/xhtml+xml",
    }
}

/// Collect the first non-empty value of every recognized `<meta>` tag
fn read_meta_tags(document: &Html) -> HashMap<MetaTag, String> {
    let mut tags = HashMap::new();
    let Ok(selector) = Selector::parse("meta") else {
        return tags;
    };

    for element in document.select(&selector) {
        let attrs = element.value();
        let Some(tag) = attrs
            .attr("property")
            .and_then(MetaTag::from_key)
            .or_else(|| attrs.attr("name").and_then(MetaTag::from_key))
        else {
            continue;
        };

        let Some(content) = attrs.attr("content").map(str::trim) else {
            continue;
        };
        if content.is_empty() {
            continue;
        }

        tags.entry(tag).or_insert_with(|| content.to_string());
    }

    tags
}

/// Text of the first `<title>` element in document order
fn first_title_element(document: &Html) -> Option<String> {
    let selector = Selector::parse("title").ok()?;
    document
        .select(&selector)
        .next()
        .map(|el| el.text().collect::<String>().trim().to_string())
        .filter(|t| !t.is_empty())
}

fn resolve_reference(base: &str, reference: &str) -> Option<String> {
    let reference = reference.trim();
    if reference.is_empty() {
        return None;
    }

    match Url::parse(base).and_then(|base| base.join(reference)) {
        Ok(url) => Some(url.to_string()),
        Err(_) => Url::parse(reference).ok().map(|u| u.to_string()),
    }
}

fn parse_dimension(raw: String) -> Option<u32> {
    raw.trim().parse().ok()
}
