use rand::rngs::OsRng;
use rand::RngCore;
use tessera_core::{TicketingError, TicketingResult};
use tessera_shared::Ticket;

pub const TICKET_CODE_PREFIX: &str = "TKT-";

const MAX_CODE_LEN: usize = 128;

/// Generate a unique ticket code: 128 bits from the OS CSPRNG, hex encoded.
pub fn generate_ticket_code() -> String {
    let mut bytes = [0u8; 16];
    OsRng.fill_bytes(&mut bytes);
    format!("{}{}", TICKET_CODE_PREFIX, hex::encode_upper(bytes))
}

/// QR payload printed on the ticket (what door scanners read back)
pub fn qr_payload(ticket: &Ticket) -> String {
    serde_json::json!({
        "code": ticket.ticket_code,
        "event_id": ticket.event_id,
    })
    .to_string()
}

/// Turn scanner or keyboard input into a lookup key.
///
/// Accepts either a bare code or the JSON QR payload. Codes are case
/// insensitive so hand-typed input still matches.
pub fn normalize(input: &str) -> TicketingResult<String> {
    let trimmed = input.trim();

    let raw = if trimmed.starts_with('{') {
        let payload: serde_json::Value = serde_json::from_str(trimmed)
            .map_err(|_| TicketingError::InvalidRequest("unreadable QR payload".to_string()))?;
        payload["code"]
            .as_str()
            .ok_or_else(|| TicketingError::InvalidRequest("QR payload has no code".to_string()))?
            .trim()
            .to_string()
    } else {
        trimmed.to_string()
    };

    if raw.is_empty() {
        return Err(TicketingError::InvalidRequest("ticket code is required".to_string()));
    }
    if raw.len() > MAX_CODE_LEN {
        return Err(TicketingError::InvalidRequest("ticket code is too long".to_string()));
    }

    Ok(raw.to_ascii_uppercase())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use uuid::Uuid;

    #[test]
    fn test_code_format() {
        let code = generate_ticket_code();
        assert!(code.starts_with(TICKET_CODE_PREFIX));
        assert_eq!(code.len(), TICKET_CODE_PREFIX.len() + 32);
        assert!(code[TICKET_CODE_PREFIX.len()..]
            .chars()
            .all(|c| c.is_ascii_hexdigit() && !c.is_ascii_lowercase()));
    }

    #[test]
    fn test_codes_do_not_repeat() {
        let codes: HashSet<String> = (0..10_000).map(|_| generate_ticket_code()).collect();
        assert_eq!(codes.len(), 10_000);
    }

    #[test]
    fn test_normalize_accepts_qr_payload_and_lowercase() {
        let ticket = Ticket::new(Uuid::new_v4(), Uuid::new_v4(), generate_ticket_code(), "Ada".into());

        assert_eq!(normalize(&qr_payload(&ticket)).unwrap(), ticket.ticket_code);
        assert_eq!(
            normalize(&format!("  {}\n", ticket.ticket_code.to_lowercase())).unwrap(),
            ticket.ticket_code
        );
    }

    #[test]
    fn test_normalize_rejects_garbage() {
        assert!(normalize("   ").is_err());
        assert!(normalize("{not json").is_err());
        assert!(normalize(r#"{"event_id": "x"}"#).is_err());
        assert!(normalize(&"A".repeat(500)).is_err());
    }
}
