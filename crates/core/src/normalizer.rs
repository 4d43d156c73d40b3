use thiserror::Error;

/// Errors produced while converting a token to its ASCII-compatible form.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum NormalizerError {
    #[error("idna conversion failed for '{token}': {reason}")]
    Idna { token: String, reason: String },
    #[error("idna conversion produced an empty label for '{0}'")]
    Empty(String),
}

/// A candidate name taken from user input.
///
/// `original` is what the caller sees in results and what gets persisted;
/// `lookup` is the punycode form sent to the marketplace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    original: String,
    lookup: String,
}

impl Token {
    /// Builds a token, falling back to the original text when ASCII conversion fails.
    pub fn new(original: impl Into<String>) -> Self {
        let original = original.into();
        let lookup = Normalizer::ascii_or_original(&original);
        Self { original, lookup }
    }

    pub fn original(&self) -> &str {
        &self.original
    }

    pub fn lookup(&self) -> &str {
        &self.lookup
    }

    /// Returns `true` when the lookup form differs from what the user typed.
    pub fn is_converted(&self) -> bool {
        self.original != self.lookup
    }
}

/// Turns free-form input into lookup tokens.
pub struct Normalizer;

impl Normalizer {
    /// Splits raw text on commas and whitespace runs, trimming and lowercasing each piece.
    ///
    /// Order and duplicates are preserved.
    pub fn split(raw: &str) -> Vec<String> {
        raw.split(|c: char| c == ',' || c.is_whitespace())
            .map(str::trim)
            .filter(|segment| !segment.is_empty())
            .map(str::to_lowercase)
            .collect()
    }

    /// Splits raw text and pairs every piece with its lookup form.
    pub fn normalize(raw: &str) -> Vec<Token> {
        Self::split(raw).into_iter().map(Token::new).collect()
    }

    /// Converts an internationalized label to its ASCII-compatible (punycode) form.
    pub fn to_ascii(token: &str) -> Result<String, NormalizerError> {
        let ascii = idna::domain_to_ascii(token).map_err(|err| NormalizerError::Idna {
            token: token.to_string(),
            reason: format!("{err:?}"),
        })?;
        if ascii.is_empty() {
            return Err(NormalizerError::Empty(token.to_string()));
        }
        Ok(ascii)
    }

    /// Best-effort variant of [`Normalizer::to_ascii`]: a failed conversion
    /// yields the token unchanged so one odd label never stops a batch.
    pub fn ascii_or_original(token: &str) -> String {
        Self::to_ascii(token).unwrap_or_else(|_| token.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_on_commas_whitespace_and_newlines() {
        let tokens = Normalizer::split("Alpha, beta\n\ngamma\t,,  DELTA ");
        assert_eq!(tokens, vec!["alpha", "beta", "gamma", "delta"]);
    }

    #[test]
    fn keeps_duplicates_in_order() {
        let tokens = Normalizer::split("b a b");
        assert_eq!(tokens, vec!["b", "a", "b"]);
    }

    #[test]
    fn blank_input_yields_nothing() {
        assert!(Normalizer::split("").is_empty());
        assert!(Normalizer::split(" ,\n, \r\n").is_empty());
        assert!(Normalizer::normalize(",,,").is_empty());
    }

    #[test]
    fn ascii_names_pass_through() {
        let token = Token::new("example.com");
        assert_eq!(token.lookup(), "example.com");
        assert!(!token.is_converted());
    }

    #[test]
    fn unicode_names_get_punycode_lookup() {
        let tokens = Normalizer::normalize("example.com, तेस्ट.com");
        assert_eq!(tokens.len(), 2);

        let second = &tokens[1];
        assert_eq!(second.original(), "तेस्ट.com");
        assert!(second.lookup().starts_with("xn--"));
        assert!(second.lookup().ends_with(".com"));
        assert!(second.is_converted());
    }

    #[test]
    fn failed_conversion_keeps_original() {
        // A punycode label that does not decode.
        for raw in ["xn--a", "foo\u{200d}bar"] {
            assert!(Normalizer::to_ascii(raw).is_err(), "{raw} should be rejected");
            assert_eq!(Normalizer::ascii_or_original(raw), raw);
            assert!(!Token::new(raw).is_converted());
        }
    }
}
