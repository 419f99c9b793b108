//! Tokens — the alphabet of path regular expressions
//!
//! Each token is one printable symbol standing for one equivalence class of
//! predicates. Tokens are minted from a monotonically increasing counter;
//! code points that collide with regex syntax (or are not printable) are
//! skipped. Above ASCII only assigned letters and digits of the Latin, Greek
//! and Cyrillic blocks qualify, so combining marks and unassigned code points
//! never reach a rendered label. Minting is bounded by a ceiling and fails
//! instead of looping.

use crate::{PathError, Result};
use std::collections::BTreeSet;
use std::fmt;
use std::ops::RangeInclusive;

/// First code point handed out is one past this value (`'1'`).
pub const TOKEN_START_VALUE: u32 = 48;

/// Default highest code point a token may use.
pub const DEFAULT_TOKEN_CEILING: u32 = 0x2FFF;

/// Symbols with meaning in the path regex dialect. Never minted.
pub const RESERVED_SYMBOLS: &[char] = &[
    '*', '+', '|', '{', '}', '(', ')', '-', '^', '.', '&', '?', '"', '\'', '%', '$', ',', '/',
    '\\', '~', '[', ']',
];

/// Non-ASCII blocks that hold spacing letters only. Combining marks sit
/// outside them.
const LETTER_BLOCKS: &[RangeInclusive<u32>] = &[
    0x00C0..=0x024F, // Latin-1 letters, Latin Extended-A/B
    0x0370..=0x04FF, // Greek and Coptic, Cyrillic
    0x1E00..=0x1FFF, // Latin Extended Additional, Greek Extended
];

/// Returns `true` if `c` may never be used as a token.
#[must_use]
pub fn is_reserved(c: char) -> bool {
    if RESERVED_SYMBOLS.contains(&c) {
        return true;
    }
    if c.is_ascii() {
        return !c.is_ascii_graphic();
    }
    let code = u32::from(c);
    !(c.is_alphanumeric() && LETTER_BLOCKS.iter().any(|block| block.contains(&code)))
}

/// One symbol of the path alphabet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Token(char);

impl Token {
    /// Wrap a character, rejecting reserved symbols.
    #[must_use]
    pub fn from_char(c: char) -> Option<Self> {
        (!is_reserved(c)).then_some(Self(c))
    }

    /// The character this token is written as.
    #[must_use]
    pub fn as_char(self) -> char {
        self.0
    }

    /// Code point of the token.
    #[must_use]
    pub fn code(self) -> u32 {
        u32::from(self.0)
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Minting
// ═══════════════════════════════════════════════════════════════════════════════

/// Monotonic token counter with a hard ceiling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TokenMinter {
    last: u32,
    ceiling: u32,
    minted: usize,
}

impl TokenMinter {
    /// Create a minter that never goes above `ceiling`.
    #[must_use]
    pub fn new(ceiling: u32) -> Self {
        Self {
            last: TOKEN_START_VALUE,
            ceiling,
            minted: 0,
        }
    }

    /// Number of tokens minted so far.
    #[must_use]
    pub fn minted(&self) -> usize {
        self.minted
    }

    /// Highest code point this minter may use.
    #[must_use]
    pub fn ceiling(&self) -> u32 {
        self.ceiling
    }

    fn advance(&mut self) -> Option<Token> {
        while self.last < self.ceiling {
            self.last += 1;
            if let Some(token) = char::from_u32(self.last).and_then(Token::from_char) {
                self.minted += 1;
                return Some(token);
            }
        }
        None
    }

    /// Mint `n` tokens, or none at all.
    ///
    /// # Errors
    ///
    /// Returns [`PathError::PartitionExhausted`] when fewer than `n` symbols
    /// remain below the ceiling. The minter is left unchanged in that case.
    pub fn reserve(&mut self, n: usize) -> Result<Vec<Token>> {
        let mut trial = *self;
        let mut tokens = Vec::with_capacity(n);
        for _ in 0..n {
            match trial.advance() {
                Some(token) => tokens.push(token),
                None => {
                    return Err(PathError::PartitionExhausted {
                        minted: self.minted,
                        needed: n,
                        ceiling: self.ceiling,
                    })
                }
            }
        }
        *self = trial;
        Ok(tokens)
    }

    /// Mint a single token.
    ///
    /// # Errors
    ///
    /// Returns [`PathError::PartitionExhausted`] when the symbol space is used up.
    pub fn mint(&mut self) -> Result<Token> {
        self.reserve(1).map(|mut v| v.remove(0))
    }
}

impl Default for TokenMinter {
    fn default() -> Self {
        Self::new(DEFAULT_TOKEN_CEILING)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Token sets (edge labels)
// ═══════════════════════════════════════════════════════════════════════════════

/// An ordered set of tokens: the label of an automaton edge.
///
/// Renders as a character class with runs of consecutive code points
/// compressed into ranges, e.g. `[1-4A]`. A single token renders bare.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TokenSet(BTreeSet<Token>);

impl TokenSet {
    /// Create an empty set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a token.
    pub fn insert(&mut self, token: Token) -> bool {
        self.0.insert(token)
    }

    /// Returns `true` if the token is in the set.
    #[must_use]
    pub fn contains(&self, token: Token) -> bool {
        self.0.contains(&token)
    }

    /// Number of tokens.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns `true` if the set has no tokens.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Tokens in ascending order.
    pub fn iter(&self) -> impl Iterator<Item = Token> + '_ {
        self.0.iter().copied()
    }

    /// Parse a label written by [`Display`](fmt::Display).
    ///
    /// Accepts a bare token (`a`) or a bracketed class with ranges
    /// (`[1-4A]`). Ranges expand to every non-reserved code point between
    /// the endpoints, inclusive.
    ///
    /// # Errors
    ///
    /// Returns [`PathError::MalformedPattern`] for an empty, unterminated or
    /// inverted class.
    pub fn parse_label(label: &str) -> Result<Self> {
        let malformed = |offset: usize, reason: &str| PathError::MalformedPattern {
            pattern: label.to_owned(),
            offset,
            reason: reason.to_owned(),
        };

        let chars: Vec<char> = label.chars().collect();
        let body: &[char] = match chars.as_slice() {
            ['[', inner @ .., ']'] => inner,
            [c] => std::slice::from_ref(c),
            _ => return Err(malformed(0, "expected a token or a bracketed class")),
        };
        if body.is_empty() {
            return Err(malformed(1, "empty class"));
        }

        let mut set = Self::new();
        let mut i = 0;
        while i < body.len() {
            let low = body[i];
            if body.get(i + 1) == Some(&'-') {
                let high = *body.get(i + 2).ok_or_else(|| malformed(i + 2, "unterminated range"))?;
                if high < low {
                    return Err(malformed(i, "inverted range"));
                }
                for code in u32::from(low)..=u32::from(high) {
                    if let Some(token) = char::from_u32(code).and_then(Token::from_char) {
                        set.insert(token);
                    }
                }
                i += 3;
            } else {
                let token = Token::from_char(low).ok_or_else(|| malformed(i, "reserved symbol"))?;
                set.insert(token);
                i += 1;
            }
        }
        Ok(set)
    }
}

impl FromIterator<Token> for TokenSet {
    fn from_iter<I: IntoIterator<Item = Token>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl fmt::Display for TokenSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.len() == 1 {
            if let Some(t) = self.0.iter().next() {
                return write!(f, "{t}");
            }
        }
        f.write_str("[")?;
        let tokens: Vec<Token> = self.iter().collect();
        let mut i = 0;
        while i < tokens.len() {
            // Extend the run while code points stay consecutive.
            let mut j = i;
            while j + 1 < tokens.len() && tokens[j + 1].code() == tokens[j].code() + 1 {
                j += 1;
            }
            if j - i >= 2 {
                write!(f, "{}-{}", tokens[i], tokens[j])?;
            } else {
                for t in &tokens[i..=j] {
                    write!(f, "{t}")?;
                }
            }
            i = j + 1;
        }
        f.write_str("]")
    }
}
