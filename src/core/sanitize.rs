//! Sanitization of free text received from requesting applications.
//!
//! Every string pulled off the wire (app names, manifest fields, URLs) passes
//! through here before it reaches a domain request. Output never contains
//! `<`, `>`, control characters or a scriptable URL scheme, and
//! `sanitize(sanitize(x)) == sanitize(x)`.

use regex::Regex;
use std::sync::OnceLock;

/// Cap for names and other short text.
pub const MAX_TEXT_LEN: usize = 256;
/// Cap for URLs.
pub const MAX_URL_LEN: usize = 2048;

/// Schemes stripped wherever they appear.
pub const DANGEROUS_PROTOCOLS: &[&str] = &["javascript:", "vbscript:", "data:", "file:"];

fn tag_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?is)<script\b.*?</script\s*>|<[^<>]*>").expect("tag regex"))
}

fn protocol_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)javascript:|vbscript:|data:|file:").expect("protocol regex"))
}

/// Sanitize short free text.
pub fn sanitize(input: &str) -> String {
    sanitize_with_limit(input, MAX_TEXT_LEN)
}

/// Cap, then strip. Stripping only shortens, so the cap also bounds the
/// work of the fixpoint loop below.
pub fn sanitize_with_limit(input: &str, limit: usize) -> String {
    let mut current: String = input.chars().take(limit).collect();
    // Removing one construct can splice together another ("java<b>script:"),
    // so strip until nothing changes.
    loop {
        let next = strip_once(&current);
        if next == current {
            break;
        }
        current = next;
    }
    current.trim().to_string()
}

fn strip_once(input: &str) -> String {
    let without_tags = tag_regex().replace_all(input, "");
    let without_angles: String = without_tags
        .chars()
        .filter(|c| *c != '<' && *c != '>' && !c.is_control())
        .collect();
    protocol_regex().replace_all(&without_angles, "").into_owned()
}

/// Sanitize a URL. Anything that is not plain http(s) after cleaning becomes empty.
pub fn sanitize_url(input: &str) -> String {
    let cleaned = sanitize_with_limit(input, MAX_URL_LEN);
    match url::Url::parse(&cleaned) {
        Ok(parsed) if matches!(parsed.scheme(), "http" | "https") => cleaned,
        _ => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_tags_and_scripts() {
        assert_eq!(sanitize("<b>Bee</b> Swap"), "Bee Swap");
        assert_eq!(sanitize("Dex<script>alert(1)</script>"), "Dex");
        assert_eq!(sanitize("a < b > c"), "a  c");
        assert_eq!(sanitize("1 > 0"), "1  0");
    }

    #[test]
    fn strips_spliced_protocols() {
        let out = sanitize("javajavascript:script:alert(1)");
        assert!(!out.to_ascii_lowercase().contains("javascript:"));
        let out = sanitize("java<i>script:alert(1)");
        assert!(!out.to_ascii_lowercase().contains("javascript:"));
    }

    #[test]
    fn caps_length() {
        let long = "x".repeat(MAX_TEXT_LEN * 2);
        assert_eq!(sanitize(&long).chars().count(), MAX_TEXT_LEN);
    }

    #[test]
    fn oversized_input_is_capped_before_stripping() {
        let hostile = "<b>".repeat(100_000) + "Bee";
        let out = sanitize(&hostile);
        assert!(out.is_empty());

        let nested = format!("{}x", "java".repeat(50_000) + &"script:".repeat(50_000));
        let out = sanitize(&nested);
        assert!(out.chars().count() <= MAX_TEXT_LEN);
        assert!(!out.to_ascii_lowercase().contains("javascript:"));
    }

    #[test]
    fn url_requires_http_scheme() {
        assert_eq!(sanitize_url("https://app.example/manifest.json"), "https://app.example/manifest.json");
        assert_eq!(sanitize_url("ftp://app.example"), "");
        assert_eq!(sanitize_url("javascript:alert(1)"), "");
        assert_eq!(sanitize_url("not a url"), "");
    }
}
