//! Validation utilities for the Nursery Management Platform
//!
//! Field-level checks shared by the API and the browser forms.

use rust_decimal::Decimal;

use crate::error::DomainError;

/// Minimum digits in a customer phone number
pub const MIN_PHONE_DIGITS: usize = 10;

// ============================================================================
// Customer Validations
// ============================================================================

/// Validate a customer phone number
/// Accepts: 9876543210, 98765-43210, +91 98765 43210
pub fn validate_phone(phone: &str) -> Result<(), &'static str> {
    let phone = phone.trim();
    if phone.is_empty() {
        return Err("Phone number is required");
    }
    if !phone
        .chars()
        .all(|c| c.is_ascii_digit() || matches!(c, '+' | '-' | ' '))
    {
        return Err("Phone number may only contain digits, spaces, '+' and '-'");
    }
    let digits = phone.chars().filter(|c| c.is_ascii_digit()).count();
    if digits < MIN_PHONE_DIGITS {
        return Err("Phone number must have at least 10 digits");
    }
    Ok(())
}

/// Strip formatting so the same number always matches on lookup
pub fn normalize_phone(phone: &str) -> String {
    phone.chars().filter(|c| !c.is_whitespace() && *c != '-').collect()
}

/// Validate that a required text field is present
pub fn validate_required(value: &str) -> Result<(), &'static str> {
    if value.trim().is_empty() {
        Err("This field is required")
    } else {
        Ok(())
    }
}

/// Validate a price or rate is not negative
pub fn validate_price(price: Decimal) -> Result<(), &'static str> {
    if price < Decimal::ZERO {
        Err("Price cannot be negative")
    } else {
        Ok(())
    }
}

// ============================================================================
// Account Validations
// ============================================================================

/// Validate username format (3-32 characters of letters, digits, '.', '_')
pub fn validate_username(username: &str) -> Result<(), &'static str> {
    if username.len() < 3 {
        return Err("Username must be at least 3 characters");
    }
    if username.len() > 32 {
        return Err("Username must be at most 32 characters");
    }
    if !username
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '.' || c == '_')
    {
        return Err("Username may only contain letters, digits, '.' and '_'");
    }
    Ok(())
}

/// Validate password strength
pub fn validate_password(password: &str) -> Result<(), &'static str> {
    if password.len() < 8 {
        return Err("Password must be at least 8 characters");
    }
    Ok(())
}

// ============================================================================
// Delete Guards
// ============================================================================

/// Refuse to delete `resource` while other rows still reference it.
///
/// `dependents` pairs a plural label with its row count; the first non-zero
/// count is the one reported.
pub fn ensure_unreferenced(
    resource: &'static str,
    dependents: &[(&'static str, i64)],
) -> Result<(), DomainError> {
    match dependents.iter().find(|(_, count)| *count > 0) {
        Some(&(dependent, count)) => Err(DomainError::InUse {
            resource,
            dependent,
            count,
        }),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_phones() {
        assert!(validate_phone("9876543210").is_ok());
        assert!(validate_phone("98765-43210").is_ok());
        assert!(validate_phone("+91 98765 43210").is_ok());
    }

    #[test]
    fn test_invalid_phones() {
        assert!(validate_phone("").is_err());
        assert!(validate_phone("987654321").is_err()); // 9 digits
        assert!(validate_phone("98765abc10").is_err());
    }

    #[test]
    fn test_normalize_phone() {
        assert_eq!(normalize_phone("+91 98765-43210"), "+919876543210");
        assert_eq!(normalize_phone("9876543210"), "9876543210");
    }

    #[test]
    fn test_required() {
        assert!(validate_required("Ramesh").is_ok());
        assert!(validate_required("   ").is_err());
    }

    #[test]
    fn test_usernames() {
        assert!(validate_username("admin").is_ok());
        assert!(validate_username("field.staff_2").is_ok());
        assert!(validate_username("ab").is_err());
        assert!(validate_username("has space").is_err());
    }

    #[test]
    fn test_password_length() {
        assert!(validate_password("longenough").is_ok());
        assert!(validate_password("short").is_err());
    }

    #[test]
    fn test_unreferenced_record_can_be_deleted() {
        assert!(ensure_unreferenced("category", &[("varieties", 0)]).is_ok());
        assert!(ensure_unreferenced("variety", &[("sowing lots", 0), ("seed inward entries", 0)]).is_ok());
        assert!(ensure_unreferenced("lot", &[]).is_ok());
    }

    #[test]
    fn test_first_dependent_blocks_delete() {
        assert_eq!(
            ensure_unreferenced("variety", &[("sowing lots", 0), ("seed inward entries", 2)]),
            Err(DomainError::InUse {
                resource: "variety",
                dependent: "seed inward entries",
                count: 2,
            })
        );

        let err = ensure_unreferenced("lot", &[("orders", 1)]).unwrap_err();
        assert_eq!(err.to_string(), "lot is still used by 1 orders");
    }
}
