//! Partitioner — disjoint equivalence classes of predicates
//!
//! Every registered predicate gets a [`Token`]. Leaf tokens are bound to a
//! predicate directly; composite tokens stand for the union of other tokens.
//! The leaves are kept pairwise disjoint at all times, so a path regex over
//! leaf tokens classifies every hop unambiguously.
//!
//! # Refinement
//!
//! Registering a new predicate `N` scans the current leaves `E`:
//!
//! - `E` disjoint from `N` is left alone.
//! - `E` inside `N` is kept and counted as part of `N`.
//! - `E` straddling `N` is split into two fresh leaves `E & !N` and `E & N`;
//!   `E`'s token is retired into a composite of the two, and the `E & N`
//!   half is counted as part of `N`.
//!
//! If nothing overlapped, `N` becomes a new leaf. Otherwise `N` gets a fresh
//! composite token over the counted parts plus, when non-empty, one more leaf
//! for the residue of `N` outside every existing leaf.
//!
//! # Storage
//!
//! Tokens live in an arena of nodes. Composite nodes hold child indices, and
//! the only nodes that ever gain children are (a) brand-new composites, whose
//! children already exist, and (b) retired leaves, whose children are created
//! in the same step. A node can therefore never reach itself, and traversal is
//! an explicit stack walk instead of recursion.

use crate::{HeaderPredicate, PathError, Result, Token, TokenMinter, TokenSet};
use std::collections::{HashMap, VecDeque};
use tracing::debug;

type NodeId = usize;

#[derive(Debug, Clone)]
enum NodeKind<P> {
    Leaf(P),
    Composite(Vec<NodeId>),
}

#[derive(Debug, Clone)]
struct Node<P> {
    token: Token,
    kind: NodeKind<P>,
}

/// How an existing leaf relates to a predicate being registered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Overlap {
    Contained,
    Straddles,
}

/// Maintains the token forest and the predicate/token maps.
///
/// # Example
///
/// ```ignore
/// let mut partitioner = Partitioner::new();
/// let a = partitioner.token(&HeaderSpace::field("switch", 1))?;
/// let b = partitioner.token(&HeaderSpace::field("port", 2))?;
/// // `a` and `b` overlap, so `a` was split and `b` is a composite.
/// assert!(!partitioner.is_leaf(b));
/// ```
#[derive(Debug, Clone)]
pub struct Partitioner<P: HeaderPredicate> {
    nodes: Vec<Node<P>>,
    by_token: HashMap<Token, NodeId>,
    by_predicate: HashMap<P, Token>,
    minter: TokenMinter,
}

impl<P: HeaderPredicate> Partitioner<P> {
    /// Create an empty partitioner with the default token ceiling.
    #[must_use]
    pub fn new() -> Self {
        Self::with_minter(TokenMinter::default())
    }

    /// Create an empty partitioner minting from `minter`.
    #[must_use]
    pub fn with_minter(minter: TokenMinter) -> Self {
        Self {
            nodes: Vec::new(),
            by_token: HashMap::new(),
            by_predicate: HashMap::new(),
            minter,
        }
    }

    /// Forget every token and predicate. The token counter restarts.
    pub fn clear(&mut self) {
        self.nodes.clear();
        self.by_token.clear();
        self.by_predicate.clear();
        self.minter = TokenMinter::new(self.minter.ceiling());
    }

    /// Number of tokens (leaf and composite) ever minted in this universe.
    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Returns `true` if nothing has been registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Token for `predicate`, refining the partition if it is new.
    ///
    /// A predicate seen before (by structural equality) returns its earlier
    /// token without touching the forest.
    ///
    /// # Errors
    ///
    /// Returns [`PathError::PartitionExhausted`] if the refinement needs more
    /// tokens than remain. The partitioner is unchanged in that case.
    pub fn token(&mut self, predicate: &P) -> Result<Token> {
        if let Some(token) = self.by_predicate.get(predicate) {
            return Ok(*token);
        }
        let token = self.refine(predicate)?;
        self.by_predicate.insert(predicate.clone(), token);
        Ok(token)
    }

    /// Returns the token already bound to `predicate`, if any.
    #[must_use]
    pub fn lookup(&self, predicate: &P) -> Option<Token> {
        self.by_predicate.get(predicate).copied()
    }

    fn refine(&mut self, new: &P) -> Result<Token> {
        // Plan first, so a failed reservation leaves nothing half-applied.
        let mut plan: Vec<(NodeId, Overlap)> = Vec::new();
        let mut covered: Option<P> = None;
        for (id, node) in self.nodes.iter().enumerate() {
            let NodeKind::Leaf(existing) = &node.kind else {
                continue;
            };
            if !existing.overlaps(new) {
                continue;
            }
            let overlap = if existing.is_subset_of(new) {
                Overlap::Contained
            } else {
                Overlap::Straddles
            };
            plan.push((id, overlap));
            covered = Some(match covered {
                None => existing.clone(),
                Some(c) => c.or(existing),
            });
        }

        let Some(covered) = covered else {
            let token = self.minter.mint()?;
            self.push_leaf(token, new.clone());
            debug!(%token, "registered disjoint predicate as a new leaf");
            return Ok(token);
        };

        let residue = new.and(&covered.not());
        let residue = (!residue.is_empty()).then_some(residue);
        let splits = plan.iter().filter(|(_, o)| *o == Overlap::Straddles).count();
        let needed = 2 * splits + 1 + usize::from(residue.is_some());
        let mut fresh: VecDeque<Token> = self.minter.reserve(needed)?.into();
        let mut next = || {
            fresh
                .pop_front()
                .ok_or_else(|| PathError::build_failure("token reservation underflow"))
        };

        let mut parts = Vec::with_capacity(plan.len() + 1);
        for (id, overlap) in plan {
            match overlap {
                Overlap::Contained => parts.push(id),
                Overlap::Straddles => {
                    let NodeKind::Leaf(existing) = self.nodes[id].kind.clone() else {
                        continue;
                    };
                    let outside = self.push_leaf(next()?, existing.and(&new.not()));
                    let inside = self.push_leaf(next()?, existing.and(new));
                    self.nodes[id].kind = NodeKind::Composite(vec![outside, inside]);
                    debug!(
                        retired = %self.nodes[id].token,
                        outside = %self.nodes[outside].token,
                        inside = %self.nodes[inside].token,
                        "split straddling leaf"
                    );
                    parts.push(inside);
                }
            }
        }

        let token = next()?;
        if let Some(residue) = residue {
            let leaf = self.push_leaf(next()?, residue);
            parts.push(leaf);
        }
        let id = self.nodes.len();
        self.nodes.push(Node {
            token,
            kind: NodeKind::Composite(parts),
        });
        self.by_token.insert(token, id);
        debug!(%token, splits, "registered overlapping predicate as a composite");
        Ok(token)
    }

    fn push_leaf(&mut self, token: Token, predicate: P) -> NodeId {
        let id = self.nodes.len();
        self.by_predicate.entry(predicate.clone()).or_insert(token);
        self.nodes.push(Node {
            token,
            kind: NodeKind::Leaf(predicate),
        });
        self.by_token.insert(token, id);
        id
    }

    fn node(&self, token: Token) -> Result<NodeId> {
        self.by_token
            .get(&token)
            .copied()
            .ok_or(PathError::UnknownToken(token.as_char()))
    }

    /// Returns `true` if `token` is directly bound to a predicate.
    #[must_use]
    pub fn is_leaf(&self, token: Token) -> bool {
        self.by_token
            .get(&token)
            .is_some_and(|id| matches!(self.nodes[*id].kind, NodeKind::Leaf(_)))
    }

    /// Direct constituents of a composite token, `None` for leaves.
    ///
    /// # Errors
    ///
    /// Returns [`PathError::UnknownToken`] if `token` was never minted.
    pub fn constituents(&self, token: Token) -> Result<Option<Vec<Token>>> {
        let id = self.node(token)?;
        Ok(match &self.nodes[id].kind {
            NodeKind::Leaf(_) => None,
            NodeKind::Composite(children) => {
                Some(children.iter().map(|c| self.nodes[*c].token).collect())
            }
        })
    }

    /// The leaf tokens `token` stands for, in forest order.
    ///
    /// # Errors
    ///
    /// Returns [`PathError::UnknownToken`] if `token` was never minted.
    pub fn leaves(&self, token: Token) -> Result<Vec<Token>> {
        let root = self.node(token)?;
        let mut out = Vec::new();
        let mut stack = vec![root];
        while let Some(id) = stack.pop() {
            match &self.nodes[id].kind {
                NodeKind::Leaf(_) => out.push(self.nodes[id].token),
                NodeKind::Composite(children) => stack.extend(children.iter().rev()),
            }
        }
        Ok(out)
    }

    /// Every current leaf token: the alphabet automata are built over.
    #[must_use]
    pub fn alphabet(&self) -> Vec<Token> {
        let mut tokens: Vec<Token> = self
            .nodes
            .iter()
            .filter(|n| matches!(n.kind, NodeKind::Leaf(_)))
            .map(|n| n.token)
            .collect();
        tokens.sort_unstable();
        tokens
    }

    /// The predicate `token` denotes: the bound predicate for a leaf, the
    /// union of its leaves for a composite.
    ///
    /// # Errors
    ///
    /// Returns [`PathError::UnknownToken`] if `token` was never minted.
    pub fn predicate(&self, token: Token) -> Result<P> {
        let leaves = self.leaves(token)?;
        let preds: Vec<&P> = leaves
            .iter()
            .filter_map(|t| match &self.nodes[self.by_token[t]].kind {
                NodeKind::Leaf(p) => Some(p),
                NodeKind::Composite(_) => None,
            })
            .collect();
        Ok(P::any_of(preds))
    }

    /// Union of the predicates of every token in an edge label.
    ///
    /// # Errors
    ///
    /// Returns [`PathError::UnknownToken`] if the label mentions an unminted token.
    pub fn label_predicate(&self, label: &TokenSet) -> Result<P> {
        let mut out: Option<P> = None;
        for token in label.iter() {
            let p = self.predicate(token)?;
            out = Some(match out {
                None => p,
                Some(acc) => acc.or(&p),
            });
        }
        Ok(out.unwrap_or_else(P::drop))
    }

    /// Rewrite a path regex so it only mentions leaf tokens.
    ///
    /// Each composite token becomes a parenthesized alternation of its leaves;
    /// syntax characters and leaves are copied as-is.
    ///
    /// # Errors
    ///
    /// Returns [`PathError::UnknownToken`] for a non-syntax character that
    /// was never minted.
    pub fn terminal_expression(&self, expr: &str) -> Result<String> {
        let mut out = String::with_capacity(expr.len());
        for c in expr.chars() {
            let Some(token) = Token::from_char(c) else {
                out.push(c);
                continue;
            };
            if self.is_leaf(token) {
                out.push(c);
                continue;
            }
            let leaves = self.leaves(token)?;
            out.push('(');
            for (i, leaf) in leaves.iter().enumerate() {
                if i > 0 {
                    out.push('|');
                }
                out.push(leaf.as_char());
            }
            out.push(')');
        }
        Ok(out)
    }
}

impl<P: HeaderPredicate> Default for Partitioner<P> {
    fn default() -> Self {
        Self::new()
    }
}
