use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use uuid::Uuid;

use crate::engine::EngineError;
use crate::model::Ms;

/// Opaque pending-queue position: base64url (no padding) over
/// `"{requested_at_ms}|{booking_id}"`. Reversible and deterministic; its only
/// job is ordering continuity, not tamper resistance; clients pass it back
/// unmodified.
pub fn encode(requested_at: Ms, id: Uuid) -> String {
    URL_SAFE_NO_PAD.encode(format!("{requested_at}|{id}"))
}

/// Decode a page token. Any corruption (bad base64, bad layout, bad
/// timestamp, bad UUID) is `InvalidToken`, never a wrong position.
pub fn decode(token: &str) -> Result<(Ms, Uuid), EngineError> {
    let raw = URL_SAFE_NO_PAD
        .decode(token)
        .map_err(|_| EngineError::InvalidToken)?;
    let raw = String::from_utf8(raw).map_err(|_| EngineError::InvalidToken)?;
    let (ts, id) = raw.split_once('|').ok_or(EngineError::InvalidToken)?;
    let ts: Ms = ts.parse().map_err(|_| EngineError::InvalidToken)?;
    let id = Uuid::parse_str(id).map_err(|_| EngineError::InvalidToken)?;
    Ok((ts, id))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrip() {
        let id = Uuid::new_v4();
        let token = encode(1_722_000_000_123, id);
        assert_eq!(decode(&token).unwrap(), (1_722_000_000_123, id));
    }

    #[test]
    fn tokens_are_opaque_ascii() {
        let token = encode(1_722_000_000_000, Uuid::new_v4());
        assert!(token.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'));
        assert!(!token.contains('|'));
    }

    #[test]
    fn garbage_is_invalid() {
        assert!(matches!(decode("not base64!!"), Err(EngineError::InvalidToken)));
        assert!(matches!(decode(""), Err(EngineError::InvalidToken)));
    }

    #[test]
    fn wrong_layout_is_invalid() {
        // Valid base64, no separator.
        let token = URL_SAFE_NO_PAD.encode("1234567890");
        assert!(matches!(decode(&token), Err(EngineError::InvalidToken)));
        // Separator but not a UUID.
        let token = URL_SAFE_NO_PAD.encode("1234567890|nope");
        assert!(matches!(decode(&token), Err(EngineError::InvalidToken)));
        // Separator but not a timestamp.
        let token = URL_SAFE_NO_PAD.encode(format!("abc|{}", Uuid::new_v4()));
        assert!(matches!(decode(&token), Err(EngineError::InvalidToken)));
    }

    #[test]
    fn corrupted_token_never_decodes_wrong() {
        let id = Uuid::new_v4();
        let token = encode(1_722_000_000_456, id);
        // Truncations must error, not yield a different (ts, id).
        for cut in 1..token.len() {
            if let Ok(decoded) = decode(&token[..cut]) {
                assert_eq!(decoded, (1_722_000_000_456, id));
            }
        }
    }
}
