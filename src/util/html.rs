use std::sync::OnceLock;

use regex::Regex;

fn break_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)<br\s*/?>|</p>|</div>|</li>").expect("valid regex"))
}

fn tag_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"<[^>]*>").expect("valid regex"))
}

fn img_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"(?i)<img[^>]*\ssrc\s*=\s*["']([^"']+)["']"#).expect("valid regex")
    })
}

fn decode_entities(text: &str) -> String {
    text.replace("&nbsp;", " ")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&amp;", "&")
}

/// Plain text of an HTML note body. Block ends become newlines.
pub fn html_to_text(html: &str) -> String {
    let with_breaks = break_re().replace_all(html, "\n");
    let stripped = tag_re().replace_all(&with_breaks, "");
    let decoded = decode_entities(&stripped);

    decoded
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

/// Image sources embedded in an HTML note body, in document order.
pub fn image_sources(html: &str) -> Vec<String> {
    img_re()
        .captures_iter(html)
        .filter_map(|c| c.get(1))
        .map(|m| decode_entities(m.as_str()))
        .collect()
}

/// Minimal escaping for text placed inside an HTML note.
pub fn escape(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

/// Plain text to paragraphs, one per line.
pub fn text_to_html(text: &str) -> String {
    text.lines()
        .map(|line| format!("<p>{}</p>", escape(line)))
        .collect()
}
