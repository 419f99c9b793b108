//! Query-set loading: [`QuerySetConfig`] → registered atoms and finalized queries.
//!
//! Atoms are resolved to predicates first (depth-first over name references,
//! rejecting unknown names and cycles), then registered in name order so the
//! token assignment is deterministic for a given file. Every path is built
//! before the first query is finalized; a bad reference fails the load without
//! touching the registry.

use crate::config::{AtomConfig, IntoPredicate, PathConfig, QuerySetConfig};
use crate::{Compiler, HeaderPredicate, PathError, PathExpr, QueryId, Result};
use std::collections::{BTreeMap, BTreeSet};
use tracing::debug;

/// Atoms and queries created by [`Compiler::load`].
#[derive(Debug, Clone)]
pub struct LoadedQueries<P: HeaderPredicate> {
    /// Every atom, by name.
    pub atoms: BTreeMap<String, PathExpr<P>>,
    /// Every finalized query, in file order.
    pub queries: Vec<(String, QueryId)>,
}

impl<P: HeaderPredicate> LoadedQueries<P> {
    /// Id of the query called `name`.
    #[must_use]
    pub fn query(&self, name: &str) -> Option<QueryId> {
        self.queries.iter().find(|(n, _)| n == name).map(|(_, id)| *id)
    }
}

struct AtomResolver<'c, M, P> {
    atoms: &'c BTreeMap<String, AtomConfig<M>>,
    done: BTreeMap<String, P>,
    visiting: BTreeSet<String>,
}

impl<M, P> AtomResolver<'_, M, P>
where
    M: IntoPredicate<P>,
    P: HeaderPredicate,
{
    fn fold(&mut self, names: &[String], op: &str, join: fn(&P, &P) -> P, of: &str) -> Result<P> {
        let Some((first, rest)) = names.split_first() else {
            return Err(PathError::InvalidConfig(format!(
                "atom `{of}`: `{op}` needs at least one operand"
            )));
        };
        let mut acc = self.predicate(first)?;
        for name in rest {
            acc = join(&acc, &self.predicate(name)?);
        }
        Ok(acc)
    }

    fn predicate(&mut self, name: &str) -> Result<P> {
        if let Some(p) = self.done.get(name) {
            return Ok(p.clone());
        }
        let config = self
            .atoms
            .get(name)
            .ok_or_else(|| PathError::InvalidConfig(format!("unknown atom `{name}`")))?;
        if !self.visiting.insert(name.to_owned()) {
            return Err(PathError::InvalidConfig(format!("atom `{name}` refers to itself")));
        }
        let predicate = match config {
            AtomConfig::Match(m) => m.into_predicate()?,
            AtomConfig::And(names) => self.fold(names, "and", P::and, name)?,
            AtomConfig::Or(names) => self.fold(names, "or", P::or, name)?,
            AtomConfig::Minus(keep, without) => {
                let keep = self.predicate(keep)?;
                keep.and(&self.predicate(without)?.not())
            }
            AtomConfig::Not(inner) => self.predicate(inner)?.not(),
        };
        self.visiting.remove(name);
        self.done.insert(name.to_owned(), predicate.clone());
        Ok(predicate)
    }
}

type PathJoin<P> = fn(&PathExpr<P>, &PathExpr<P>) -> PathExpr<P>;

fn build_path<P: HeaderPredicate>(
    config: &PathConfig,
    atoms: &BTreeMap<String, PathExpr<P>>,
) -> Result<PathExpr<P>> {
    match config {
        PathConfig::Atom(name) => atoms
            .get(name)
            .cloned()
            .ok_or_else(|| PathError::InvalidConfig(format!("unknown atom `{name}`"))),
        PathConfig::Concat(parts) => fold_path(parts, "concat", PathExpr::concat, atoms),
        PathConfig::Alt(parts) => fold_path(parts, "alt", PathExpr::alternate, atoms),
        PathConfig::Star(inner) => Ok(build_path(inner, atoms)?.star()),
    }
}

fn fold_path<P: HeaderPredicate>(
    parts: &[PathConfig],
    op: &str,
    join: PathJoin<P>,
    atoms: &BTreeMap<String, PathExpr<P>>,
) -> Result<PathExpr<P>> {
    let Some((first, rest)) = parts.split_first() else {
        return Err(PathError::InvalidConfig(format!("`{op}` needs at least one part")));
    };
    let mut acc = build_path(first, atoms)?;
    for part in rest {
        acc = join(&acc, &build_path(part, atoms)?);
    }
    Ok(acc)
}

impl<P: HeaderPredicate> Compiler<P> {
    /// A fresh compiler configured and populated from `config`.
    ///
    /// # Errors
    ///
    /// Returns [`PathError::InvalidConfig`] for invalid tunables or references,
    /// and any error from atom registration or finalization.
    pub fn from_query_set<M: IntoPredicate<P>>(
        config: &QuerySetConfig<M>,
    ) -> Result<(Self, LoadedQueries<P>)> {
        let mut compiler = Self::with_config(config.compiler.clone())?;
        let loaded = compiler.load(config)?;
        Ok((compiler, loaded))
    }

    /// Register the atoms of `config` and finalize its queries.
    ///
    /// `config.compiler` is ignored; see [`from_query_set`](Self::from_query_set).
    ///
    /// # Errors
    ///
    /// Returns [`PathError::InvalidConfig`] for unknown or cyclic atom
    /// references, empty compositions and duplicate query names, and any
    /// error from atom registration or finalization.
    pub fn load<M: IntoPredicate<P>>(
        &mut self,
        config: &QuerySetConfig<M>,
    ) -> Result<LoadedQueries<P>> {
        let mut resolver = AtomResolver {
            atoms: &config.atoms,
            done: BTreeMap::new(),
            visiting: BTreeSet::new(),
        };
        let mut predicates = Vec::with_capacity(config.atoms.len());
        for name in config.atoms.keys() {
            predicates.push((name.clone(), resolver.predicate(name)?));
        }

        let mut seen = BTreeSet::new();
        for query in &config.queries {
            if !seen.insert(query.name.as_str()) {
                return Err(PathError::InvalidConfig(format!(
                    "duplicate query name `{}`",
                    query.name
                )));
            }
        }

        let mut atoms = BTreeMap::new();
        for (name, predicate) in predicates {
            let atom = self.atom(predicate)?;
            debug!(atom = %name, token = %atom, "registered atom");
            atoms.insert(name, atom);
        }

        let paths = config
            .queries
            .iter()
            .map(|q| build_path(&q.path, &atoms).map(|p| (q.name.as_str(), p)))
            .collect::<Result<Vec<_>>>()?;

        let mut queries = Vec::with_capacity(paths.len());
        for (name, path) in paths {
            let id = self.finalize_named(name, &path)?;
            queries.push((name.to_owned(), id));
        }
        Ok(LoadedQueries { atoms, queries })
    }
}
