//! Path expressions — regexes over the token alphabet
//!
//! A [`PathExpr`] is either an [`Atom`] (one predicate, one token) or a
//! [`Composite`] built with concatenation, alternation and Kleene star.
//! Every operator returns a new value; expressions are never mutated.
//!
//! The predicate algebra (`and`, `or`, `minus`, `invert`) is only defined
//! between atoms. Handing it a composite is an [`InvalidOperand`] error, not
//! a coercion.
//!
//! [`InvalidOperand`]: crate::PathError::InvalidOperand
//!
//! # Example
//!
//! ```ignore
//! let x = compiler.atom(HeaderSpace::field("switch", 1))?;
//! let y = compiler.atom(HeaderSpace::field("switch", 2))?;
//! let query = (&x ^ &y).star().with_callback(Arc::new(|pkt| println!("{pkt:?}")));
//! ```

use crate::{HeaderPredicate, Partitioner, PathError, Result, Token};
use std::fmt;
use std::ops::{BitOr, BitXor};
use std::sync::Arc;

/// Observer attached to a query's result sink.
pub type Callback<P> = Arc<dyn Fn(&<P as HeaderPredicate>::Packet) + Send + Sync>;

/// A path of length one: a single predicate and its token.
pub struct Atom<P: HeaderPredicate> {
    predicate: P,
    token: Token,
    callbacks: Vec<Callback<P>>,
}

impl<P: HeaderPredicate> Atom<P> {
    /// Register `predicate` and wrap its token.
    ///
    /// # Errors
    ///
    /// Returns [`PathError::PartitionExhausted`] if registration runs out of tokens.
    pub fn new(predicate: P, partitioner: &mut Partitioner<P>) -> Result<Self> {
        let token = partitioner.token(&predicate)?;
        Ok(Self {
            predicate,
            token,
            callbacks: Vec::new(),
        })
    }

    /// The predicate this atom classifies hops with.
    #[must_use]
    pub fn predicate(&self) -> &P {
        &self.predicate
    }

    /// The token standing for the predicate.
    #[must_use]
    pub fn token(&self) -> Token {
        self.token
    }
}

impl<P: HeaderPredicate> Clone for Atom<P> {
    fn clone(&self) -> Self {
        Self {
            predicate: self.predicate.clone(),
            token: self.token,
            callbacks: self.callbacks.clone(),
        }
    }
}

/// A path built by composition, held as its regex string.
pub struct Composite<P: HeaderPredicate> {
    expr: String,
    callbacks: Vec<Callback<P>>,
}

impl<P: HeaderPredicate> Composite<P> {
    /// The regex over tokens.
    #[must_use]
    pub fn expr(&self) -> &str {
        &self.expr
    }
}

impl<P: HeaderPredicate> Clone for Composite<P> {
    fn clone(&self) -> Self {
        Self {
            expr: self.expr.clone(),
            callbacks: self.callbacks.clone(),
        }
    }
}

/// A path query: an atom or a composition of atoms.
pub enum PathExpr<P: HeaderPredicate> {
    /// A single predicate.
    Atom(Atom<P>),
    /// A composed regex.
    Composite(Composite<P>),
}

impl<P: HeaderPredicate> Clone for PathExpr<P> {
    fn clone(&self) -> Self {
        match self {
            Self::Atom(a) => Self::Atom(a.clone()),
            Self::Composite(c) => Self::Composite(c.clone()),
        }
    }
}

/// True if `expr` has an alternation outside every group.
fn has_top_level_alternation(expr: &str) -> bool {
    let mut depth = 0usize;
    for c in expr.chars() {
        match c {
            '(' | '[' => depth += 1,
            ')' | ']' => depth = depth.saturating_sub(1),
            '|' if depth == 0 => return true,
            _ => {}
        }
    }
    false
}

impl<P: HeaderPredicate> PathExpr<P> {
    /// Register `predicate` and build an atom over it.
    ///
    /// # Errors
    ///
    /// Returns [`PathError::PartitionExhausted`] if registration runs out of tokens.
    pub fn atom(predicate: P, partitioner: &mut Partitioner<P>) -> Result<Self> {
        Atom::new(predicate, partitioner).map(Self::Atom)
    }

    fn composite(expr: String, callbacks: Vec<Callback<P>>) -> Self {
        Self::Composite(Composite { expr, callbacks })
    }

    fn kind(&self) -> &'static str {
        match self {
            Self::Atom(_) => "atom",
            Self::Composite(_) => "composite",
        }
    }

    /// The regex over tokens this expression denotes.
    #[must_use]
    pub fn expr(&self) -> String {
        match self {
            Self::Atom(a) => a.token.to_string(),
            Self::Composite(c) => c.expr.clone(),
        }
    }

    /// Callbacks attached so far, in insertion order.
    #[must_use]
    pub fn callbacks(&self) -> &[Callback<P>] {
        match self {
            Self::Atom(a) => &a.callbacks,
            Self::Composite(c) => &c.callbacks,
        }
    }

    /// Returns the atom, if this is one.
    #[must_use]
    pub fn as_atom(&self) -> Option<&Atom<P>> {
        match self {
            Self::Atom(a) => Some(a),
            Self::Composite(_) => None,
        }
    }

    /// Returns `true` for an atom.
    #[must_use]
    pub fn is_atom(&self) -> bool {
        matches!(self, Self::Atom(_))
    }

    fn joined_callbacks(&self, other: &Self) -> Vec<Callback<P>> {
        self.callbacks().iter().chain(other.callbacks()).cloned().collect()
    }

    /// A copy with `callback` appended.
    #[must_use]
    pub fn with_callback(&self, callback: Callback<P>) -> Self {
        let mut out = self.clone();
        match &mut out {
            Self::Atom(a) => a.callbacks.push(callback),
            Self::Composite(c) => c.callbacks.push(callback),
        }
        out
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Path composition
    // ═══════════════════════════════════════════════════════════════════════

    /// `self` followed by `other`.
    ///
    /// An operand with a top-level `|` is parenthesized first, so the result
    /// always means "a path in `self`, then a path in `other`".
    #[must_use]
    pub fn concat(&self, other: &Self) -> Self {
        let wrap = |e: String| {
            if has_top_level_alternation(&e) {
                format!("({e})")
            } else {
                e
            }
        };
        let expr = wrap(self.expr()) + &wrap(other.expr());
        Self::composite(expr, self.joined_callbacks(other))
    }

    /// Paths in `self` or in `other`.
    #[must_use]
    pub fn alternate(&self, other: &Self) -> Self {
        let expr = format!("({})|({})", self.expr(), other.expr());
        Self::composite(expr, self.joined_callbacks(other))
    }

    /// Zero or more repetitions of `self`.
    #[must_use]
    pub fn star(&self) -> Self {
        Self::composite(format!("({})*", self.expr()), self.callbacks().to_vec())
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Atom algebra
    // ═══════════════════════════════════════════════════════════════════════

    fn atoms<'s>(
        &'s self,
        other: &'s Self,
        op: &'static str,
    ) -> Result<(&'s Atom<P>, &'s Atom<P>)> {
        match (self, other) {
            (Self::Atom(a), Self::Atom(b)) => Ok((a, b)),
            (Self::Composite(_), _) => Err(PathError::InvalidOperand { op, found: self.kind() }),
            (_, Self::Composite(_)) => Err(PathError::InvalidOperand {
                op,
                found: other.kind(),
            }),
        }
    }

    fn derived(
        &self,
        other: Option<&Self>,
        predicate: P,
        partitioner: &mut Partitioner<P>,
    ) -> Result<Self> {
        let mut atom = Atom::new(predicate, partitioner)?;
        atom.callbacks = match other {
            Some(o) => self.joined_callbacks(o),
            None => self.callbacks().to_vec(),
        };
        Ok(Self::Atom(atom))
    }

    /// Atom over the intersection of both predicates.
    ///
    /// # Errors
    ///
    /// [`PathError::InvalidOperand`] if either operand is a composite;
    /// [`PathError::PartitionExhausted`] if registration runs out of tokens.
    pub fn and(&self, other: &Self, partitioner: &mut Partitioner<P>) -> Result<Self> {
        let (a, b) = self.atoms(other, "and")?;
        self.derived(Some(other), a.predicate.and(&b.predicate), partitioner)
    }

    /// Atom over `self ∧ ¬other`.
    ///
    /// # Errors
    ///
    /// [`PathError::InvalidOperand`] if either operand is a composite;
    /// [`PathError::PartitionExhausted`] if registration runs out of tokens.
    pub fn minus(&self, other: &Self, partitioner: &mut Partitioner<P>) -> Result<Self> {
        let (a, b) = self.atoms(other, "minus")?;
        self.derived(Some(other), a.predicate.and(&b.predicate.not()), partitioner)
    }

    /// Atom over the complement.
    ///
    /// # Errors
    ///
    /// [`PathError::InvalidOperand`] for a composite;
    /// [`PathError::PartitionExhausted`] if registration runs out of tokens.
    pub fn invert(&self, partitioner: &mut Partitioner<P>) -> Result<Self> {
        let Self::Atom(a) = self else {
            return Err(PathError::InvalidOperand {
                op: "invert",
                found: self.kind(),
            });
        };
        self.derived(None, a.predicate.not(), partitioner)
    }

    /// Either atom's hop, as a one-hop composite `(a)|(b)`.
    ///
    /// A union of predicates has no single token without registering it, so
    /// this is alternation restricted to atoms.
    ///
    /// # Errors
    ///
    /// [`PathError::InvalidOperand`] if either operand is a composite.
    pub fn or(&self, other: &Self) -> Result<Self> {
        self.atoms(other, "or")?;
        Ok(self.alternate(other))
    }
}

impl<P: HeaderPredicate> BitXor for &PathExpr<P> {
    type Output = PathExpr<P>;

    fn bitxor(self, rhs: Self) -> PathExpr<P> {
        self.concat(rhs)
    }
}

impl<P: HeaderPredicate> BitOr for &PathExpr<P> {
    type Output = PathExpr<P>;

    fn bitor(self, rhs: Self) -> PathExpr<P> {
        self.alternate(rhs)
    }
}

impl<P: HeaderPredicate> fmt::Debug for PathExpr<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Atom(a) => f
                .debug_struct("Atom")
                .field("token", &a.token)
                .field("predicate", &a.predicate)
                .field("callbacks", &a.callbacks.len())
                .finish(),
            Self::Composite(c) => f
                .debug_struct("Composite")
                .field("expr", &c.expr)
                .field("callbacks", &c.callbacks.len())
                .finish(),
        }
    }
}

impl<P: HeaderPredicate> fmt::Display for PathExpr<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.expr())
    }
}
