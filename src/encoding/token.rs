use crate::{
    crypto::cesr,
    error::{Error, Result},
    interfaces::TokenEncoder,
};
use base64ct::{Base64UrlUnpadded, Encoding};

/// Encodes token claims as unpadded base64url JSON.
#[derive(Clone, Copy, Debug, Default)]
pub struct Base64TokenEncoder;

impl TokenEncoder for Base64TokenEncoder {
    fn signature_length(&self, token: &str) -> Result<usize> {
        cesr::signature_length(token).ok_or_else(|| invalid("unknown signature code"))
    }

    fn encode(&self, claims: &str) -> Result<String> {
        Ok(Base64UrlUnpadded::encode_string(claims.as_bytes()))
    }

    fn decode(&self, encoded: &str) -> Result<String> {
        let bytes = Base64UrlUnpadded::decode_vec(encoded).map_err(invalid)?;
        String::from_utf8(bytes).map_err(invalid)
    }
}

fn invalid(reason: impl std::fmt::Display) -> Error {
    Error::InvalidToken {
        reason: reason.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn body_is_url_safe() -> anyhow::Result<()> {
        let claims = r#"{"identity":"E~?>","attributes":{"scope":"read/write"}}"#;
        let encoded = Base64TokenEncoder.encode(claims)?;
        assert!(!encoded.contains(['+', '/', '=']));
        assert_eq!(Base64TokenEncoder.decode(&encoded)?, claims);
        Ok(())
    }

    #[test]
    fn signature_length_from_code() {
        let token = format!("0B{}", "A".repeat(86));
        assert_eq!(Base64TokenEncoder.signature_length(&token), Ok(88));
        assert!(matches!(
            Base64TokenEncoder.signature_length("Zz"),
            Err(Error::InvalidToken { .. })
        ));
    }

    #[test]
    fn rejects_bad_body() {
        assert!(matches!(
            Base64TokenEncoder.decode("***"),
            Err(Error::InvalidToken { .. })
        ));
    }
}
