//! Validation helpers for DTOs.

use validator::ValidationError;

/// Validates that a receipt number is 4 to 10 ASCII digits.
///
/// # Examples
///
/// ```ignore
/// validate_receipt_number("100042") // Ok
/// validate_receipt_number("42")     // Err - too short
/// validate_receipt_number("10-42")  // Err - not digits
/// ```
pub fn validate_receipt_number(receipt: &str) -> Result<(), ValidationError> {
    if !(4..=10).contains(&receipt.len()) {
        let mut err = ValidationError::new("receipt_length");
        err.message = Some(
            format!(
                "Receipt number must be 4 to 10 digits (got {} characters)",
                receipt.len()
            )
            .into(),
        );
        return Err(err);
    }

    if !receipt.chars().all(|c| c.is_ascii_digit()) {
        let mut err = ValidationError::new("receipt_format");
        err.message = Some("Receipt number must contain only digits".into());
        return Err(err);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_receipt_number_valid() {
        assert!(validate_receipt_number("1000").is_ok());
        assert!(validate_receipt_number("123456").is_ok());
        assert!(validate_receipt_number("9999999999").is_ok());
    }

    #[test]
    fn test_validate_receipt_number_invalid_length() {
        assert!(validate_receipt_number("123").is_err()); // too short
        assert!(validate_receipt_number("12345678901").is_err()); // too long
        assert!(validate_receipt_number("").is_err()); // empty
    }

    #[test]
    fn test_validate_receipt_number_invalid_format() {
        assert!(validate_receipt_number("12a4").is_err());
        assert!(validate_receipt_number("12 34").is_err());
        assert!(validate_receipt_number("12-34").is_err());
    }
}
