//! Pattern — the path regex dialect
//!
//! Path queries and registry entries are kept as regex strings over the
//! token alphabet. This module parses those strings into a [`Pattern`] tree
//! that the automaton builder consumes.
//!
//! Grammar, lowest precedence first (whitespace is ignored):
//!
//! ```text
//! alt     := and ('|' and)*
//! and     := cat ('&' cat)*
//! cat     := unary*                 (empty = the empty string)
//! unary   := '~' unary | post
//! post    := primary ('*' | '+' | '?')*
//! primary := '(' alt ')' | '[' class ']' | token
//! ```
//!
//! `~` complements relative to the alphabet the automaton is built over.
//! Groups and complements nest at most [`MAX_PATTERN_DEPTH`] deep.

use crate::{PathError, Result, Token, TokenSet};
use std::collections::BTreeSet;
use std::fmt;

/// Deepest nesting of `(` groups and `~` complements the parser accepts.
pub const MAX_PATTERN_DEPTH: usize = 256;

/// A parsed path regular expression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Pattern {
    /// Matches nothing.
    Empty,
    /// Matches the empty path.
    Epsilon,
    /// Matches one hop classified by any of these tokens.
    Class(BTreeSet<Token>),
    /// Sequencing.
    Concat(Vec<Pattern>),
    /// Alternation.
    Alt(Vec<Pattern>),
    /// Intersection of two languages.
    And(Box<Pattern>, Box<Pattern>),
    /// Complement relative to the alphabet.
    Not(Box<Pattern>),
    /// Zero or more repetitions.
    Star(Box<Pattern>),
}

impl Pattern {
    /// Parse a path regex string.
    ///
    /// # Errors
    ///
    /// Returns [`PathError::MalformedPattern`] on unbalanced parentheses,
    /// stray operators or malformed classes.
    pub fn parse(src: &str) -> Result<Self> {
        let mut parser = Parser::new(src);
        let pattern = parser.alt()?;
        match parser.peek() {
            None => Ok(pattern),
            Some(c) => Err(parser.error(format!("unexpected {c:?}"))),
        }
    }

    /// Every token mentioned, in order.
    #[must_use]
    pub fn tokens(&self) -> BTreeSet<Token> {
        let mut out = BTreeSet::new();
        let mut stack = vec![self];
        while let Some(p) = stack.pop() {
            match p {
                Self::Empty | Self::Epsilon => {}
                Self::Class(ts) => out.extend(ts.iter().copied()),
                Self::Concat(ps) | Self::Alt(ps) => stack.extend(ps.iter()),
                Self::And(a, b) => {
                    stack.push(a);
                    stack.push(b);
                }
                Self::Not(p) | Self::Star(p) => stack.push(p),
            }
        }
        out
    }

    /// Replace every token by the tokens `expand` maps it to.
    ///
    /// Used to rewrite composite tokens into the leaf tokens they stand for.
    ///
    /// # Errors
    ///
    /// Propagates any error from `expand`.
    pub fn resolve<F>(&self, expand: &mut F) -> Result<Self>
    where
        F: FnMut(Token) -> Result<Vec<Token>>,
    {
        Ok(match self {
            Self::Empty => Self::Empty,
            Self::Epsilon => Self::Epsilon,
            Self::Class(ts) => {
                let mut leaves = BTreeSet::new();
                for t in ts {
                    leaves.extend(expand(*t)?);
                }
                if leaves.is_empty() {
                    Self::Empty
                } else {
                    Self::Class(leaves)
                }
            }
            Self::Concat(ps) => Self::Concat(
                ps.iter()
                    .map(|p| p.resolve(expand))
                    .collect::<Result<_>>()?,
            ),
            Self::Alt(ps) => Self::Alt(
                ps.iter()
                    .map(|p| p.resolve(expand))
                    .collect::<Result<_>>()?,
            ),
            Self::And(a, b) => {
                Self::And(Box::new(a.resolve(expand)?), Box::new(b.resolve(expand)?))
            }
            Self::Not(p) => Self::Not(Box::new(p.resolve(expand)?)),
            Self::Star(p) => Self::Star(Box::new(p.resolve(expand)?)),
        })
    }
}

impl fmt::Display for Pattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Empty => f.write_str("(()&~())"),
            Self::Epsilon => f.write_str("()"),
            Self::Class(ts) => {
                let set: TokenSet = ts.iter().copied().collect();
                write!(f, "{set}")
            }
            Self::Concat(ps) => {
                for p in ps {
                    write!(f, "({p})")?;
                }
                Ok(())
            }
            Self::Alt(ps) => {
                for (i, p) in ps.iter().enumerate() {
                    if i > 0 {
                        f.write_str("|")?;
                    }
                    write!(f, "({p})")?;
                }
                Ok(())
            }
            Self::And(a, b) => write!(f, "({a})&({b})"),
            Self::Not(p) => write!(f, "~({p})"),
            Self::Star(p) => write!(f, "({p})*"),
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Parser
// ═══════════════════════════════════════════════════════════════════════════════

struct Parser<'a> {
    src: &'a str,
    chars: Vec<(usize, char)>,
    pos: usize,
    depth: usize,
}

impl<'a> Parser<'a> {
    fn new(src: &'a str) -> Self {
        let chars = src
            .chars()
            .enumerate()
            .filter(|(_, c)| !c.is_whitespace())
            .collect();
        Self {
            src,
            chars,
            pos: 0,
            depth: 0,
        }
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).map(|(_, c)| *c)
    }

    fn offset(&self) -> usize {
        self.chars
            .get(self.pos)
            .map_or_else(|| self.src.chars().count(), |(i, _)| *i)
    }

    fn eat(&mut self, expected: char) -> bool {
        if self.peek() == Some(expected) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn error(&self, reason: impl Into<String>) -> PathError {
        PathError::MalformedPattern {
            pattern: self.src.to_owned(),
            offset: self.offset(),
            reason: reason.into(),
        }
    }

    fn nested<T>(&mut self, f: impl FnOnce(&mut Self) -> Result<T>) -> Result<T> {
        if self.depth >= MAX_PATTERN_DEPTH {
            return Err(self.error(format!("nesting deeper than {MAX_PATTERN_DEPTH}")));
        }
        self.depth += 1;
        let out = f(self);
        self.depth -= 1;
        out
    }

    fn alt(&mut self) -> Result<Pattern> {
        let mut branches = vec![self.and()?];
        while self.eat('|') {
            branches.push(self.and()?);
        }
        Ok(if branches.len() == 1 {
            branches.remove(0)
        } else {
            Pattern::Alt(branches)
        })
    }

    fn and(&mut self) -> Result<Pattern> {
        let mut left = self.cat()?;
        while self.eat('&') {
            let right = self.cat()?;
            left = Pattern::And(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn cat(&mut self) -> Result<Pattern> {
        let mut items = Vec::new();
        while let Some(c) = self.peek() {
            if matches!(c, '|' | '&' | ')') {
                break;
            }
            items.push(self.unary()?);
        }
        Ok(match items.len() {
            0 => Pattern::Epsilon,
            1 => items.remove(0),
            _ => Pattern::Concat(items),
        })
    }

    fn unary(&mut self) -> Result<Pattern> {
        if self.eat('~') {
            let inner = self.nested(Self::unary)?;
            Ok(Pattern::Not(Box::new(inner)))
        } else {
            self.postfix()
        }
    }

    /// A run of postfix operators collapses to one: any mix of two or more
    /// distinct operators is `*`, and a repeated `+` or `?` is itself.
    fn postfix(&mut self) -> Result<Pattern> {
        let p = self.primary()?;
        let mut op: Option<char> = None;
        while let Some(c @ ('*' | '+' | '?')) = self.peek() {
            self.pos += 1;
            op = Some(match op {
                None => c,
                Some(prev) if prev == c => c,
                Some(_) => '*',
            });
        }
        Ok(match op {
            Some('*') => Pattern::Star(Box::new(p)),
            Some('+') => Pattern::Concat(vec![p.clone(), Pattern::Star(Box::new(p))]),
            Some(_) => Pattern::Alt(vec![p, Pattern::Epsilon]),
            None => p,
        })
    }

    fn primary(&mut self) -> Result<Pattern> {
        let Some(c) = self.peek() else {
            return Err(self.error("unexpected end of expression"));
        };
        match c {
            '(' => {
                self.pos += 1;
                let inner = self.nested(Self::alt)?;
                if !self.eat(')') {
                    return Err(self.error("expected ')'"));
                }
                Ok(inner)
            }
            '[' => self.class(),
            _ => {
                let token = Token::from_char(c)
                    .ok_or_else(|| self.error(format!("unexpected {c:?}")))?;
                self.pos += 1;
                Ok(Pattern::Class(BTreeSet::from([token])))
            }
        }
    }

    fn class(&mut self) -> Result<Pattern> {
        let start = self.pos;
        let mut label = String::new();
        loop {
            let Some(c) = self.peek() else {
                self.pos = start;
                return Err(self.error("unterminated class"));
            };
            label.push(c);
            self.pos += 1;
            if c == ']' && label.len() > 1 {
                break;
            }
        }
        let set = TokenSet::parse_label(&label).map_err(|e| {
            let reason = match e {
                PathError::MalformedPattern { reason, .. } => reason,
                other => other.to_string(),
            };
            self.pos = start;
            self.error(reason)
        });
        Ok(Pattern::Class(set?.iter().collect()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn class(s: &str) -> Pattern {
        Pattern::Class(s.chars().filter_map(Token::from_char).collect())
    }

    #[test]
    fn single_token() {
        assert_eq!(Pattern::parse("a").unwrap(), class("a"));
    }

    #[test]
    fn concat_binds_tighter_than_alt() {
        let p = Pattern::parse("ab|c").unwrap();
        assert_eq!(
            p,
            Pattern::Alt(vec![Pattern::Concat(vec![class("a"), class("b")]), class("c")])
        );
    }

    #[test]
    fn star_binds_tightest() {
        let p = Pattern::parse("ab*").unwrap();
        assert_eq!(
            p,
            Pattern::Concat(vec![class("a"), Pattern::Star(Box::new(class("b")))])
        );
    }

    #[test]
    fn and_not_with_whitespace() {
        let p = Pattern::parse("(a|b) & ~(a)").unwrap();
        assert_eq!(
            p,
            Pattern::And(
                Box::new(Pattern::Alt(vec![class("a"), class("b")])),
                Box::new(Pattern::Not(Box::new(class("a")))),
            )
        );
    }

    #[test]
    fn plus_and_optional_desugar() {
        let p = Pattern::parse("a+").unwrap();
        assert_eq!(
            p,
            Pattern::Concat(vec![class("a"), Pattern::Star(Box::new(class("a")))])
        );
        let q = Pattern::parse("a?").unwrap();
        assert_eq!(q, Pattern::Alt(vec![class("a"), Pattern::Epsilon]));
    }

    #[test]
    fn empty_group_is_epsilon() {
        assert_eq!(Pattern::parse("()").unwrap(), Pattern::Epsilon);
        assert_eq!(Pattern::parse("").unwrap(), Pattern::Epsilon);
    }

    #[test]
    fn bracket_class_with_range() {
        assert_eq!(Pattern::parse("[1-3x]").unwrap(), class("123x"));
    }

    #[test]
    fn unbalanced_paren_reports_offset() {
        let err = Pattern::parse("(ab").unwrap_err();
        match err {
            PathError::MalformedPattern { offset, .. } => assert_eq!(offset, 3),
            other => panic!("expected MalformedPattern, got {other:?}"),
        }
    }

    #[test]
    fn stray_close_paren_is_rejected() {
        assert!(Pattern::parse("a)").is_err());
    }

    #[test]
    fn reserved_symbol_is_rejected() {
        assert!(Pattern::parse("a.b").is_err());
        assert!(Pattern::parse("[a").is_err());
    }

    #[test]
    fn tokens_collects_all() {
        let p = Pattern::parse("(ab)*&~c|[de]").unwrap();
        let got: String = p.tokens().into_iter().map(Token::as_char).collect();
        assert_eq!(got, "abcde");
    }

    #[test]
    fn resolve_expands_composites() {
        let p = Pattern::parse("ax").unwrap();
        let resolved = p
            .resolve(&mut |t| {
                Ok(if t.as_char() == 'x' {
                    "yz".chars().filter_map(Token::from_char).collect()
                } else {
                    vec![t]
                })
            })
            .unwrap();
        assert_eq!(resolved, Pattern::Concat(vec![class("a"), class("yz")]));
    }

    #[test]
    fn display_reparses_to_same_tree() {
        for src in ["a", "ab|c", "(a|b)*c", "(ab) & ~(a)", "[1-4]x", "a?b+"] {
            let p = Pattern::parse(src).unwrap();
            let again = Pattern::parse(&p.to_string()).unwrap();
            assert_eq!(p, again, "{src} -> {p}");
        }
    }

    #[test]
    fn nesting_at_the_limit_parses() {
        let depth = MAX_PATTERN_DEPTH;
        let src = format!("{}a{}", "(".repeat(depth), ")".repeat(depth));
        assert_eq!(Pattern::parse(&src).unwrap(), class("a"));
    }

    #[test]
    fn runaway_nesting_is_rejected() {
        let groups = format!("{}a{}", "(".repeat(10_000), ")".repeat(10_000));
        let err = Pattern::parse(&groups).unwrap_err();
        let past_limit = MAX_PATTERN_DEPTH + 1;
        assert!(
            matches!(err, PathError::MalformedPattern { offset, .. } if offset == past_limit),
            "{err}"
        );

        let complements = format!("{}a", "~".repeat(10_000));
        assert!(matches!(
            Pattern::parse(&complements),
            Err(PathError::MalformedPattern { .. })
        ));
    }

    #[test]
    fn postfix_runs_collapse() {
        let star = Pattern::Star(Box::new(class("a")));
        assert_eq!(Pattern::parse("a*").unwrap(), star);
        assert_eq!(Pattern::parse("a**").unwrap(), star);
        assert_eq!(Pattern::parse("a+?").unwrap(), star);
        assert_eq!(Pattern::parse("a?+").unwrap(), star);
        assert_eq!(Pattern::parse("a++").unwrap(), Pattern::parse("a+").unwrap());
        assert_eq!(Pattern::parse("a??").unwrap(), Pattern::parse("a?").unwrap());

        let long = format!("a{}", "+?".repeat(5_000));
        assert_eq!(Pattern::parse(&long).unwrap(), star);
    }
}
