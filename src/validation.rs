//! Username validation for the handshake.
//!
//! Usernames are registry keys and appear verbatim in chat lines, grid
//! snapshots and log records, so they must be short single tokens.

/// Longest accepted username, in characters.
pub const MAX_USERNAME_CHARS: usize = 32;

/// Username validation errors with helpful messages
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum UsernameError {
    #[error("username cannot be empty")]
    Empty,

    #[error("username is too long (maximum {max} characters)")]
    TooLong { max: usize },

    #[error("username cannot contain whitespace")]
    Whitespace,

    #[error("username cannot contain control characters")]
    ControlCharacters,
}

/// Check `username` against the naming rules.
///
/// # Examples
///
/// ```
/// use rpgchat::validation::{validate_username, UsernameError};
///
/// assert!(validate_username("testUser1").is_ok());
/// assert_eq!(validate_username(""), Err(UsernameError::Empty));
/// assert_eq!(validate_username("two words"), Err(UsernameError::Whitespace));
/// ```
pub fn validate_username(username: &str) -> Result<(), UsernameError> {
    if username.is_empty() {
        return Err(UsernameError::Empty);
    }
    if username.chars().count() > MAX_USERNAME_CHARS {
        return Err(UsernameError::TooLong {
            max: MAX_USERNAME_CHARS,
        });
    }
    if username.chars().any(char::is_whitespace) {
        return Err(UsernameError::Whitespace);
    }
    if username.chars().any(char::is_control) {
        return Err(UsernameError::ControlCharacters);
    }
    Ok(())
}
