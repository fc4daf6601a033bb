//! Text sanitization — mandatory before any chunking.

use std::borrow::Cow;

/// Normalize newlines (CRLF/CR → LF) and strip NUL bytes.
pub fn sanitize(text: &str) -> Cow<'_, str> {
    if !text.contains('\r') && !text.contains('\0') {
        return Cow::Borrowed(text);
    }

    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '\0' => {}
            '\r' => {
                if chars.peek() == Some(&'\n') {
                    chars.next();
                }
                out.push('\n');
            }
            _ => out.push(c),
        }
    }
    Cow::Owned(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_passthrough_borrows() {
        assert!(matches!(sanitize("clean text\n"), Cow::Borrowed(_)));
    }

    #[test]
    fn test_crlf_and_nul() {
        assert_eq!(sanitize("a\r\nb\rc\0d"), "a\nb\ncd");
    }
}
