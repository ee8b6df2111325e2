//! MarkdownV2 helpers.

/// Characters that must be escaped anywhere in MarkdownV2 text.
const SPECIAL: &[char] = &[
    '_', '*', '[', ']', '(', ')', '~', '`', '>', '#', '+', '-', '=', '|', '{', '}', '.', '!', '\\',
];

/// Escapes `text` for use inside a MarkdownV2 message.
pub fn escape_md(text: &str) -> String {
    let mut out = String::with_capacity(text.len() + 8);
    for c in text.chars() {
        if SPECIAL.contains(&c) {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_escape_md() {
        assert_eq!(escape_md("plain text"), "plain text");
        assert_eq!(escape_md("v1.0 (beta)!"), "v1\\.0 \\(beta\\)\\!");
        assert_eq!(escape_md("a_b*c"), "a\\_b\\*c");
        assert_eq!(escape_md("back\\slash"), "back\\\\slash");
    }
}
