//! Credential masking applied before captured passwords are stored locally

/// Characters of the password left readable
pub const VISIBLE_PREFIX: usize = 3;

/// Replacement for every hidden character
pub const MASK_CHAR: char = '*';

/// Mask a captured password.
///
/// With `enabled` set and at least [`VISIBLE_PREFIX`] characters, keeps the
/// first three characters and masks the rest; otherwise returns the input.
/// Lengths count `char`s, so multi-byte passwords mask per character.
///
/// ```
/// use sensorlink_core::anonymize::anonymize;
///
/// assert_eq!(anonymize("abcdef", true), "abc***");
/// assert_eq!(anonymize("ab", true), "ab");
/// assert_eq!(anonymize("abcdef", false), "abcdef");
/// ```
pub fn anonymize(password: &str, enabled: bool) -> String {
    let len = password.chars().count();
    if !enabled || len < VISIBLE_PREFIX {
        return password.to_string();
    }

    password
        .chars()
        .take(VISIBLE_PREFIX)
        .chain(std::iter::repeat(MASK_CHAR).take(len - VISIBLE_PREFIX))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_masks_past_prefix() {
        assert_eq!(anonymize("abcdef", true), "abc***");
        assert_eq!(anonymize("secret", true), "sec***");
    }

    #[test]
    fn test_exactly_prefix_length() {
        assert_eq!(anonymize("abc", true), "abc");
    }

    #[test]
    fn test_short_passwords_untouched() {
        assert_eq!(anonymize("ab", true), "ab");
        assert_eq!(anonymize("", true), "");
    }

    #[test]
    fn test_disabled() {
        assert_eq!(anonymize("hunter2", false), "hunter2");
    }

    #[test]
    fn test_counts_chars_not_bytes() {
        assert_eq!(anonymize("pässwörd", true), "päs*****");
    }
}
