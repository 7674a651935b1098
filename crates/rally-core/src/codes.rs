//! Join codes, default display names and member colors.

use rand::Rng;

/// Join code alphabet: uppercase letters and digits without `0`/`O` and `1`/`I`.
pub const CODE_ALPHABET: &[u8; 32] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";

/// Length of a join code.
pub const CODE_LENGTH: usize = 4;

/// Member colors, handed out round-robin across the whole process.
pub const PALETTE: &[&str] = &[
    "#e6194b", "#3cb44b", "#ffe119", "#4363d8", "#f58231", "#911eb4", "#46f0f0", "#f032e6",
];

const ADJECTIVES: &[&str] = &[
    "Brave", "Swift", "Quiet", "Lucky", "Clever", "Bold", "Sunny", "Misty", "Wild", "Calm",
    "Fuzzy", "Nimble",
];

const NOUNS: &[&str] = &[
    "Fox", "Otter", "Raven", "Badger", "Lynx", "Heron", "Wolf", "Moth", "Hare", "Finch", "Toad",
    "Pike",
];

/// Source of candidate join codes.
///
/// Candidates need not be unique; the registry retries until it finds a free one.
pub trait CodeSource: Send {
    /// Produce the next candidate code.
    fn next_code(&mut self) -> String;
}

/// Uniformly random codes from [`CODE_ALPHABET`]. Not cryptographically secure.
#[derive(Debug, Default, Clone, Copy)]
pub struct RandomCodes;

impl CodeSource for RandomCodes {
    fn next_code(&mut self) -> String {
        generate_code()
    }
}

/// Generate a random join code.
#[must_use]
pub fn generate_code() -> String {
    let mut rng = rand::rng();
    (0..CODE_LENGTH)
        .map(|_| char::from(CODE_ALPHABET[rng.random_range(0..CODE_ALPHABET.len())]))
        .collect()
}

/// Generate a display name such as `SwiftOtter`.
#[must_use]
pub fn generate_name() -> String {
    let mut rng = rand::rng();
    let adj = ADJECTIVES[rng.random_range(0..ADJECTIVES.len())];
    let noun = NOUNS[rng.random_range(0..NOUNS.len())];
    format!("{}{}", adj, noun)
}

/// Color for the `n`th member created in this process (1-based).
///
/// Two members of one party share a color once the palette wraps.
#[must_use]
pub fn color_for(member_number: u64) -> &'static str {
    let index = member_number.saturating_sub(1) % PALETTE.len() as u64;
    PALETTE[index as usize]
}

/// Canonical form of a user-typed join code.
#[must_use]
pub fn normalize_code(raw: &str) -> String {
    raw.trim().to_ascii_uppercase()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_alphabet_has_no_ambiguous_glyphs() {
        let symbols: HashSet<u8> = CODE_ALPHABET.iter().copied().collect();
        assert_eq!(symbols.len(), 32);
        for ambiguous in [b'0', b'O', b'1', b'I'] {
            assert!(!symbols.contains(&ambiguous));
        }
    }

    #[test]
    fn test_generate_code_shape() {
        for _ in 0..200 {
            let code = generate_code();
            assert_eq!(code.len(), CODE_LENGTH);
            assert!(code.bytes().all(|b| CODE_ALPHABET.contains(&b)));
        }
    }

    #[test]
    fn test_generate_name() {
        let name = generate_name();
        assert!(ADJECTIVES.iter().any(|a| name.starts_with(a)));
        assert!(NOUNS.iter().any(|n| name.ends_with(n)));
        assert!(name.chars().count() <= 20);
    }

    #[test]
    fn test_colors_are_round_robin() {
        assert_eq!(color_for(1), PALETTE[0]);
        assert_eq!(color_for(2), PALETTE[1]);
        assert_eq!(color_for(PALETTE.len() as u64), PALETTE[PALETTE.len() - 1]);
        assert_eq!(color_for(PALETTE.len() as u64 + 1), PALETTE[0]);
    }

    #[test]
    fn test_normalize_code() {
        assert_eq!(normalize_code("  ab3k "), "AB3K");
    }
}
