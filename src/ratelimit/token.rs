//! Token validation.

use crate::error::{Result, TurnstileError};

/// Longest token accepted, in bytes.
pub const MAX_TOKEN_LEN: usize = 100;

/// A validated caller token used as the counter key.
///
/// Construction goes through [`Token::parse`], so a `Token` in hand is always
/// non-empty, at most [`MAX_TOKEN_LEN`] bytes and free of control characters.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Token(String);

impl Token {
    /// Validate a raw token.
    pub fn parse(raw: &str) -> Result<Self> {
        if raw.is_empty() {
            return Err(TurnstileError::InvalidToken("token must not be empty".into()));
        }

        if raw.len() > MAX_TOKEN_LEN {
            return Err(TurnstileError::InvalidToken(format!(
                "token is {} bytes, maximum is {}",
                raw.len(),
                MAX_TOKEN_LEN
            )));
        }

        if raw.chars().any(char::is_control) {
            return Err(TurnstileError::InvalidToken(
                "token must not contain control characters".into(),
            ));
        }

        Ok(Self(raw.to_string()))
    }

    /// Borrow the token as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Token {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_accepts_plain_identifier() {
        let token = Token::parse("user-42").unwrap();
        assert_eq!(token.as_str(), "user-42");
        assert_eq!(token.to_string(), "user-42");
    }

    #[test]
    fn test_token_rejects_empty() {
        let err = Token::parse("").unwrap_err();
        assert!(matches!(err, TurnstileError::InvalidToken(_)));
    }

    #[test]
    fn test_token_length_boundary() {
        let at_limit = "a".repeat(MAX_TOKEN_LEN);
        assert!(Token::parse(&at_limit).is_ok());

        let over_limit = "a".repeat(MAX_TOKEN_LEN + 1);
        assert!(matches!(
            Token::parse(&over_limit),
            Err(TurnstileError::InvalidToken(_))
        ));
    }

    #[test]
    fn test_token_rejects_control_characters() {
        assert!(Token::parse("abc\n").is_err());
        assert!(Token::parse("a\u{0}b").is_err());
    }

    #[test]
    fn test_token_equality() {
        assert_eq!(Token::parse("same").unwrap(), Token::parse("same").unwrap());
    }
}
