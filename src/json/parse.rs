//! Purpose: Provide the internal runtime JSON decode entrypoints.
//! Exports: `from_str`, `ParseFailureCategory`, `categorize_error`, `hint_for_error`.
//! Role: Parser boundary that centralizes serde_json usage details.
//! Invariants: Categories are stable labels safe to log (no payload echo).
//! Notes: Error mapping is done by callsites so domain context stays explicit.

use serde::de::DeserializeOwned;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub(crate) enum ParseFailureCategory {
    Syntax,
    Eof,
    Shape,
    Io,
}

impl ParseFailureCategory {
    pub(crate) fn label(self) -> &'static str {
        match self {
            ParseFailureCategory::Syntax => "syntax",
            ParseFailureCategory::Eof => "eof",
            ParseFailureCategory::Shape => "shape",
            ParseFailureCategory::Io => "io",
        }
    }
}

pub(crate) fn from_str<T: DeserializeOwned>(input: &str) -> Result<T, serde_json::Error> {
    serde_json::from_str(input)
}

pub(crate) fn categorize_error(err: &serde_json::Error) -> ParseFailureCategory {
    match err.classify() {
        serde_json::error::Category::Syntax => ParseFailureCategory::Syntax,
        serde_json::error::Category::Eof => ParseFailureCategory::Eof,
        serde_json::error::Category::Data => ParseFailureCategory::Shape,
        serde_json::error::Category::Io => ParseFailureCategory::Io,
    }
}

pub(crate) fn hint_for_error(err: &serde_json::Error, context: &str) -> String {
    format!(
        "parse category: {}; line {} column {}; context: {context}",
        categorize_error(err).label(),
        err.line(),
        err.column()
    )
}

#[cfg(test)]
mod tests {
    use super::{ParseFailureCategory, categorize_error, from_str, hint_for_error};
    use serde_json::Value;

    #[test]
    fn truncated_body_is_eof() {
        let err = from_str::<Value>(r#"{"a":"#).unwrap_err();
        assert_eq!(categorize_error(&err), ParseFailureCategory::Eof);
    }

    #[test]
    fn html_error_page_is_syntax() {
        let err = from_str::<Value>("<html>502 Bad Gateway</html>").unwrap_err();
        assert_eq!(categorize_error(&err), ParseFailureCategory::Syntax);
        let hint = hint_for_error(&err, "api.reply");
        assert!(hint.contains("parse category: syntax"));
        assert!(hint.contains("context: api.reply"));
    }

    #[test]
    fn wrong_shape_is_shape() {
        let err = from_str::<Vec<u8>>(r#"{"a":1}"#).unwrap_err();
        assert_eq!(categorize_error(&err), ParseFailureCategory::Shape);
    }
}
