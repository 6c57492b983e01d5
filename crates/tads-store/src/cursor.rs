use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};

use crate::error::StoreError;

const SESSION_PREFIX: &str = "s:";

/// Encode the id of the last session on a page as an opaque token.
pub fn encode_cursor(last_id: i64) -> String {
    URL_SAFE_NO_PAD.encode(format!("{SESSION_PREFIX}{last_id}"))
}

/// Decode a token produced by [`encode_cursor`].
pub fn decode_cursor(token: &str) -> Result<i64, StoreError> {
    let invalid = || StoreError::InvalidCursor(token.to_string());

    let bytes = URL_SAFE_NO_PAD.decode(token.trim()).map_err(|_| invalid())?;
    let text = String::from_utf8(bytes).map_err(|_| invalid())?;
    let id: i64 = text
        .strip_prefix(SESSION_PREFIX)
        .ok_or_else(invalid)?
        .parse()
        .map_err(|_| invalid())?;
    if id <= 0 {
        return Err(invalid());
    }
    Ok(id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_is_opaque_and_decodes() {
        let token = encode_cursor(42);
        assert!(!token.contains("42"));
        assert!(!token.contains('='));
        assert_eq!(decode_cursor(&token).unwrap(), 42);
    }

    #[test]
    fn malformed_tokens_rejected() {
        let bad_tokens = vec![
            String::new(),
            "!!!".to_string(),
            URL_SAFE_NO_PAD.encode("s:abc"),
            URL_SAFE_NO_PAD.encode("x:5"),
            URL_SAFE_NO_PAD.encode("s:0"),
        ];
        for bad in bad_tokens {
            assert!(
                matches!(decode_cursor(&bad), Err(StoreError::InvalidCursor(_))),
                "{bad} should be rejected"
            );
        }
    }
}
