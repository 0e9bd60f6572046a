use super::types::UrlRef;
use linkify::{LinkFinder, LinkKind};

/// Detect http(s) URLs in text, in order of appearance.
///
/// Matching is strict: a scheme is required, so bare hostnames such as
/// `example.com` are not picked up. Repeated URLs are yielded once per
/// occurrence. The iterator is lazy and can be recreated at will; the same
/// text always produces the same sequence.
pub fn detect_urls(text: &str) -> impl Iterator<Item = UrlRef> + '_ {
    let mut finder = LinkFinder::new();
    finder.kinds(&[LinkKind::Url]).url_must_have_scheme(true);

    finder
        .links(text)
        .filter_map(|link| UrlRef::parse(link.as_str()))
}
