//! Minimal XML scanning for flat, well-known documents
//!
//! S3 listings and prompt-based tool calls only need element text lookups,
//! so elements are found by their literal open and close tags.

/// Replace the five predefined entities
pub fn unescape_xml(text: &str) -> String {
    text.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
        .replace("&amp;", "&")
}

/// Raw inner markup of every `<tag>...</tag>` element, in document order
pub fn element_bodies<'a>(xml: &'a str, tag: &str) -> Vec<&'a str> {
    let open = format!("<{tag}>");
    let close = format!("</{tag}>");
    let mut bodies = Vec::new();
    let mut rest = xml;

    while let Some(start) = rest.find(&open) {
        let after = &rest[start + open.len()..];
        let Some(end) = after.find(&close) else {
            break;
        };
        bodies.push(&after[..end]);
        rest = &after[end + close.len()..];
    }

    bodies
}

/// Unescaped text of every `<tag>...</tag>` element
pub fn extract_tags(xml: &str, tag: &str) -> Vec<String> {
    element_bodies(xml, tag).into_iter().map(unescape_xml).collect()
}

/// Direct child elements of a fragment as `(name, trimmed text)` pairs
///
/// `<name/>` yields an empty value. Anything between children is skipped.
pub fn child_elements(xml: &str) -> Vec<(String, String)> {
    let mut children = Vec::new();
    let mut rest = xml;

    while let Some(start) = rest.find('<') {
        let after = &rest[start + 1..];
        let Some(end) = after.find('>') else {
            break;
        };
        let tag = &after[..end];
        rest = &after[end + 1..];

        if tag.starts_with(['/', '?', '!']) {
            continue;
        }
        if let Some(name) = tag.strip_suffix('/') {
            children.push((name.trim().to_string(), String::new()));
            continue;
        }

        let name = tag.split_whitespace().next().unwrap_or_default();
        let close = format!("</{name}>");
        let Some(value_end) = rest.find(&close) else {
            break;
        };
        children.push((name.to_string(), unescape_xml(rest[..value_end].trim())));
        rest = &rest[value_end + close.len()..];
    }

    children
}
