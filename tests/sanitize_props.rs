//! Property tests for requester-text sanitization.

use beeconnect::core::sanitize::{sanitize, sanitize_url, DANGEROUS_PROTOCOLS, MAX_TEXT_LEN};
use proptest::prelude::*;

/// Strings biased towards markup and scheme fragments.
fn hostile() -> impl Strategy<Value = String> {
    let piece = prop_oneof![
        Just("<".to_string()),
        Just(">".to_string()),
        Just("<script>".to_string()),
        Just("</script>".to_string()),
        Just("<b>".to_string()),
        Just("java".to_string()),
        Just("script:".to_string()),
        Just("JaVaScRiPt:".to_string()),
        Just("data:".to_string()),
        Just("vb".to_string()),
        Just("file:".to_string()),
        Just(":".to_string()),
        Just("\u{0}".to_string()),
        Just(" ".to_string()),
        "[a-zA-Z0-9 ./]{0,6}",
    ];
    prop::collection::vec(piece, 0..24).prop_map(|pieces| pieces.concat())
}

proptest! {
    #[test]
    fn sanitize_is_idempotent(input in hostile()) {
        let once = sanitize(&input);
        prop_assert_eq!(sanitize(&once), once);
    }

    #[test]
    fn output_has_no_markup_or_schemes(input in hostile()) {
        let out = sanitize(&input);
        prop_assert!(!out.contains('<') && !out.contains('>'));
        prop_assert!(!out.chars().any(char::is_control));
        let lower = out.to_lowercase();
        for protocol in DANGEROUS_PROTOCOLS {
            prop_assert!(!lower.contains(protocol), "{:?} survived in {:?}", protocol, out);
        }
        prop_assert!(out.chars().count() <= MAX_TEXT_LEN);
    }

    #[test]
    fn arbitrary_text_never_panics(input in any::<String>()) {
        let out = sanitize(&input);
        prop_assert_eq!(sanitize(&out), out);
    }

    #[test]
    fn surviving_urls_are_http(input in hostile()) {
        let url = sanitize_url(&format!("https://app.example/{input}"));
        prop_assert!(url.is_empty() || url.starts_with("https://") || url.starts_with("http://"));
        prop_assert_eq!(sanitize_url(&url), url);
    }
}
