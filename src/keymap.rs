//! Physical key vocabulary
//!
//! Maps macOS virtual keycodes (ANSI layout positions) to the single-character
//! key identifiers used in the shortcut table.

use std::fmt;

/// Virtual keycode of the left Command key (primary dispatch modifier).
pub const LEFT_COMMAND_KEYCODE: i64 = 55;
/// Virtual keycode of the right Command key (secondary dispatch modifier).
pub const RIGHT_COMMAND_KEYCODE: i64 = 54;

/// Every key that can carry a shortcut, in keycode order.
pub const VOCABULARY: [char; 47] = [
    'a', 's', 'd', 'f', 'h', 'g', 'z', 'x', 'c', 'v', 'b', 'q', 'w', 'e', 'r', 'y', 't', '1', '2',
    '3', '4', '6', '5', '=', '9', '7', '-', '8', '0', ']', 'o', 'u', '[', 'i', 'p', 'l', 'j', '\'',
    'k', ';', '\\', ',', '/', 'n', 'm', '.', '`',
];

/// A key position that shortcuts can be bound to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct KeyId(char);

impl KeyId {
    /// Parse a configuration key. Accepts exactly one character from the
    /// vocabulary; ASCII letters are folded to lowercase.
    pub fn parse(s: &str) -> Option<KeyId> {
        let mut chars = s.chars();
        let c = chars.next()?.to_ascii_lowercase();
        if chars.next().is_some() {
            return None;
        }
        VOCABULARY.contains(&c).then_some(KeyId(c))
    }

    pub fn from_keycode(keycode: i64) -> Option<KeyId> {
        let c = match keycode {
            0 => 'a',
            1 => 's',
            2 => 'd',
            3 => 'f',
            4 => 'h',
            5 => 'g',
            6 => 'z',
            7 => 'x',
            8 => 'c',
            9 => 'v',
            11 => 'b',
            12 => 'q',
            13 => 'w',
            14 => 'e',
            15 => 'r',
            16 => 'y',
            17 => 't',
            18 => '1',
            19 => '2',
            20 => '3',
            21 => '4',
            22 => '6',
            23 => '5',
            24 => '=',
            25 => '9',
            26 => '7',
            27 => '-',
            28 => '8',
            29 => '0',
            30 => ']',
            31 => 'o',
            32 => 'u',
            33 => '[',
            34 => 'i',
            35 => 'p',
            37 => 'l',
            38 => 'j',
            39 => '\'',
            40 => 'k',
            41 => ';',
            42 => '\\',
            43 => ',',
            44 => '/',
            45 => 'n',
            46 => 'm',
            47 => '.',
            50 => '`',
            _ => return None,
        };
        Some(KeyId(c))
    }

    pub fn as_char(self) -> char {
        self.0
    }
}

impl fmt::Display for KeyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_every_vocabulary_key_has_one_keycode() {
        let mapped: Vec<KeyId> = (0..128).filter_map(KeyId::from_keycode).collect();
        assert_eq!(mapped.len(), VOCABULARY.len());

        let unique: HashSet<char> = mapped.iter().map(|k| k.as_char()).collect();
        let expected: HashSet<char> = VOCABULARY.iter().copied().collect();
        assert_eq!(unique, expected);
    }

    #[test]
    fn test_parse() {
        assert_eq!(KeyId::parse("g").map(KeyId::as_char), Some('g'));
        assert_eq!(KeyId::parse("G").map(KeyId::as_char), Some('g'));
        assert_eq!(KeyId::parse(";").map(KeyId::as_char), Some(';'));
        assert_eq!(KeyId::parse("`").map(KeyId::as_char), Some('`'));
        assert!(KeyId::parse("").is_none());
        assert!(KeyId::parse("gg").is_none());
        assert!(KeyId::parse("!").is_none());
        assert!(KeyId::parse(" ").is_none());
    }

    #[test]
    fn test_modifier_and_control_keys_are_unmapped() {
        for keycode in [LEFT_COMMAND_KEYCODE, RIGHT_COMMAND_KEYCODE, 36, 48, 49, 51, 53, 123] {
            assert!(KeyId::from_keycode(keycode).is_none(), "keycode {}", keycode);
        }
    }
}
