//! Turns stored question markup into the plain text that gets embedded.

use std::sync::LazyLock;

use regex::{Captures, Regex};

static SCRIPT_OR_STYLE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)<script\b[^>]*>.*?</script\s*>|<style\b[^>]*>.*?</style\s*>")
        .expect("valid regex")
});
static BLOCK_TAG: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)</?(br|p|div|li|ul|ol|tr|td|th|h[1-6]|blockquote|pre)\b[^>]*>")
        .expect("valid regex")
});
static ANY_TAG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)<!--.*?-->|<[^>]*>").expect("valid regex"));
static ENTITY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"&(#[0-9]+|#[xX][0-9a-fA-F]+|[a-zA-Z]+);").expect("valid regex"));
static WHITESPACE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").expect("valid regex"));

/// Strips tags, decodes common entities and collapses whitespace.
pub fn clean_html(raw: &str) -> String {
    if raw.is_empty() {
        return String::new();
    }

    let text = SCRIPT_OR_STYLE.replace_all(raw, "");
    let text = BLOCK_TAG.replace_all(&text, " ");
    let text = ANY_TAG.replace_all(&text, "");
    let text = ENTITY.replace_all(&text, |caps: &Captures| decode_entity(&caps[0], &caps[1]));
    WHITESPACE.replace_all(&text, " ").trim().to_string()
}

fn decode_entity(whole: &str, name: &str) -> String {
    let decoded = match name {
        "amp" => Some('&'),
        "lt" => Some('<'),
        "gt" => Some('>'),
        "quot" => Some('"'),
        "apos" => Some('\''),
        "nbsp" => Some(' '),
        _ => name.strip_prefix('#').and_then(|num| {
            let code = match num.strip_prefix(['x', 'X']) {
                Some(hex) => u32::from_str_radix(hex, 16).ok(),
                None => num.parse::<u32>().ok(),
            };
            code.and_then(char::from_u32)
        }),
    };

    decoded.map_or_else(|| whole.to_string(), String::from)
}
