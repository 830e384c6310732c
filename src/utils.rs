/// Backslash quoting for values placed inside a quoted-string.
///
/// Both `\` and `"` are escaped, so the result reads back through
/// [`parse_challenge`](crate::parse_challenge) as the original value.
pub trait QuoteForDigest {
    fn quote_for_digest(&self) -> String;
}

impl QuoteForDigest for str {
    fn quote_for_digest(&self) -> String {
        let mut out = String::with_capacity(self.len());
        for c in self.chars() {
            if c == '\\' || c == '"' {
                out.push('\\');
            }
            out.push(c);
        }
        out
    }
}

impl QuoteForDigest for String {
    fn quote_for_digest(&self) -> String {
        self.as_str().quote_for_digest()
    }
}

#[cfg(test)]
mod tests {
    use super::QuoteForDigest;

    #[test]
    fn test_quote() {
        assert_eq!("plain".quote_for_digest(), "plain");
        assert_eq!(r#"a"b"#.quote_for_digest(), r#"a\"b"#);
        assert_eq!(r"a\b".quote_for_digest(), r"a\\b");
        assert_eq!(String::from(r#",,world""#).quote_for_digest(), r#",,world\""#);
    }
}
