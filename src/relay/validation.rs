use super::error::RelayError;

pub const MAX_MESSAGE_LEN: usize = 2000;
pub const MAX_ID_LEN: usize = 128;

/// Check a message body: non-empty after trimming, bounded length.
pub fn validate_message(content: &str) -> Result<(), RelayError> {
    if content.trim().is_empty() {
        return Err(RelayError::Validation("Message cannot be empty".into()));
    }
    if content.len() > MAX_MESSAGE_LEN {
        return Err(RelayError::Validation(format!(
            "Message too long (max {} characters)",
            MAX_MESSAGE_LEN
        )));
    }
    Ok(())
}

/// Check an id field (user id, club id, activity id): non-empty, bounded.
pub fn validate_id(label: &str, id: &str) -> Result<(), RelayError> {
    if id.trim().is_empty() {
        return Err(RelayError::Validation(format!("{label} is required")));
    }
    if id.len() > MAX_ID_LEN {
        return Err(RelayError::Validation(format!("{label} is too long")));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_empty_and_whitespace_messages() {
        assert!(validate_message("").is_err());
        assert!(validate_message("   ").is_err());
        assert!(validate_message("hi").is_ok());
    }

    #[test]
    fn rejects_oversized_message() {
        let long = "x".repeat(MAX_MESSAGE_LEN + 1);
        assert!(validate_message(&long).is_err());
        let max = "x".repeat(MAX_MESSAGE_LEN);
        assert!(validate_message(&max).is_ok());
    }

    #[test]
    fn rejects_blank_ids() {
        assert!(validate_id("userId", "").is_err());
        assert!(validate_id("userId", "u1").is_ok());
    }
}
