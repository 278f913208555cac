//! Nick name grammar.

use crate::constants::{MESSAGE_MAX_BYTES, NICK_MAX_CHARS};

/// A valid nick is 1-10 characters of ASCII letters, digits, `-` or `_`.
pub fn is_valid_nick(nick: &str) -> bool {
    let count = nick.chars().count();

    (1..=NICK_MAX_CHARS).contains(&count)
        && nick
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

/// Whether a piece of user text fits in a single message.
pub fn fits_in_message(text: &str) -> bool {
    text.len() <= MESSAGE_MAX_BYTES
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_nicks() {
        assert!(is_valid_nick("Alice"));
        assert!(is_valid_nick("a"));
        assert!(is_valid_nick("1234567890"));
        assert!(is_valid_nick("kou-chat_1"));
    }

    #[test]
    fn test_invalid_nicks() {
        assert!(!is_valid_nick(""));
        assert!(!is_valid_nick("12345678901"));
        assert!(!is_valid_nick("@Boss"));
        assert!(!is_valid_nick("two words"));
        assert!(!is_valid_nick("blåbær"));
    }

    #[test]
    fn test_message_size_limit() {
        assert!(fits_in_message(&"x".repeat(450)));
        assert!(!fits_in_message(&"x".repeat(451)));
        // multi-byte characters count by bytes
        assert!(!fits_in_message(&"æ".repeat(226)));
    }
}
