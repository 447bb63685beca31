use crate::error::ApiError;

pub const MIN_USERNAME_LENGTH: usize = 3;
pub const MAX_USERNAME_LENGTH: usize = 100;
pub const MAX_EMAIL_LENGTH: usize = 256;
pub const MAX_FULL_NAME_LENGTH: usize = 256;
pub const MIN_PASSWORD_LENGTH: usize = 6;
pub const MAX_PASSWORD_LENGTH: usize = 100;

pub fn validate_username(username: &str) -> Result<(), ApiError> {
    let len = username.chars().count();
    if len < MIN_USERNAME_LENGTH || len > MAX_USERNAME_LENGTH {
        return Err(ApiError::Validation(format!(
            "Username must be between {} and {} characters",
            MIN_USERNAME_LENGTH, MAX_USERNAME_LENGTH
        )));
    }

    if username.chars().any(char::is_whitespace) {
        return Err(ApiError::Validation(
            "Username cannot contain whitespace".to_string(),
        ));
    }

    Ok(())
}

pub fn validate_email(email: &str) -> Result<(), ApiError> {
    if email.is_empty() {
        return Err(ApiError::Validation("Email cannot be empty".to_string()));
    }

    if email.chars().count() > MAX_EMAIL_LENGTH {
        return Err(ApiError::Validation("Email too long".to_string()));
    }

    // Basic shape check: something@something
    match email.split_once('@') {
        Some((local, domain)) if !local.is_empty() && !domain.is_empty() => Ok(()),
        _ => Err(ApiError::Validation("Invalid email address".to_string())),
    }
}

pub fn validate_full_name(full_name: &str) -> Result<(), ApiError> {
    if full_name.trim().is_empty() {
        return Err(ApiError::Validation("Full name cannot be empty".to_string()));
    }

    if full_name.chars().count() > MAX_FULL_NAME_LENGTH {
        return Err(ApiError::Validation("Full name too long".to_string()));
    }

    Ok(())
}

pub fn validate_password(password: &str) -> Result<(), ApiError> {
    let len = password.chars().count();
    if len < MIN_PASSWORD_LENGTH || len > MAX_PASSWORD_LENGTH {
        return Err(ApiError::Validation(format!(
            "Password must be between {} and {} characters",
            MIN_PASSWORD_LENGTH, MAX_PASSWORD_LENGTH
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_username_bounds() {
        assert!(validate_username("bob").is_ok());
        assert!(validate_username("bo").is_err());
        assert!(validate_username(&"x".repeat(101)).is_err());
        assert!(validate_username("bob smith").is_err());
    }

    #[test]
    fn test_email_shape() {
        assert!(validate_email("a@b.example").is_ok());
        assert!(validate_email("no-at-sign").is_err());
        assert!(validate_email("@example.com").is_err());
        assert!(validate_email("").is_err());
    }

    #[test]
    fn test_full_name() {
        assert!(validate_full_name("Ada Lovelace").is_ok());
        assert!(validate_full_name("   ").is_err());
    }

    #[test]
    fn test_password_length() {
        assert!(validate_password("123456").is_ok());
        assert!(validate_password("12345").is_err());
    }
}
