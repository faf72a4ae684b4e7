// ABOUTME: Final-HTML sanitization applied to the fragment before publishing.
// ABOUTME: Ammonia policy allowing article markup plus the migrated-image attributes.

/// Sanitize the final article HTML before it is handed to the publisher.
///
/// Allowed elements: p, br, strong, b, em, i, u, h1-h6, ul, ol, li,
/// blockquote, pre, code, img, a, span, div.
/// Allowed attrs: href on links; src, alt, width, height and class on images
/// (the migrated-image class marker must survive); class/id on div/span;
/// class on p and a; id on headings.
pub fn sanitize_html(html: &str) -> String {
    let allowed_tags = [
        "p", "br", "strong", "b", "em", "i", "u", "h1", "h2", "h3", "h4", "h5", "h6", "ul", "ol",
        "li", "blockquote", "pre", "code", "img", "a", "span", "div",
    ];

    let mut builder = ammonia::Builder::new();
    builder.tags(allowed_tags.iter().copied().collect());

    builder.add_tag_attributes("a", &["href", "class"]);
    builder.add_tag_attributes("img", &["src", "alt", "width", "height", "class"]);
    builder.add_tag_attributes("div", &["class", "id"]);
    builder.add_tag_attributes("span", &["class", "id"]);
    builder.add_tag_attributes("p", &["class"]);
    for h in &["h1", "h2", "h3", "h4", "h5", "h6"] {
        builder.add_tag_attributes(h, &["id"]);
    }

    builder
        .url_schemes(["http", "https", "mailto"].iter().copied().collect())
        .clean(html)
        .to_string()
}
