//! Conformance test fixture runner
//!
//! Loads YAML fixtures and runs them against the pathq compiler. A fixture is
//! a query set, an optional expected automaton shape, and replay cases: each
//! case pushes one packet along a list of hops and names the queries that
//! must report it.

use crate::{Packet, QuerySet, TagField};
use pathq::Compiler;
use serde::Deserialize;
use std::collections::{BTreeMap, BTreeSet};

/// A complete test fixture
#[derive(Debug, Deserialize)]
pub struct Fixture {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub query_set: QuerySet,
    #[serde(default)]
    pub expect: Shape,
    #[serde(default)]
    pub cases: Vec<TestCase>,
}

/// Expected automaton shape; absent fields are not checked
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Shape {
    pub states: Option<usize>,
    pub accepting: Option<usize>,
    pub entries: Option<usize>,
}

/// Test case
#[derive(Debug, Deserialize)]
pub struct TestCase {
    pub name: String,
    pub hops: Vec<BTreeMap<String, u64>>,
    #[serde(default)]
    pub reports: Vec<String>,
}

impl TestCase {
    /// Build the packet observed at each hop. The last hop is marked as egress.
    pub fn build_hops(&self, tags: &TagField) -> Vec<Packet> {
        let last = self.hops.len().saturating_sub(1);
        self.hops
            .iter()
            .enumerate()
            .map(|(i, fields)| {
                let mut pkt = fields
                    .iter()
                    .fold(Packet::new(), |p, (k, v)| p.with(k.clone(), *v));
                if i == last && !pkt.has(&tags.egress_field) {
                    pkt.set(tags.egress_field.as_str(), tags.egress_value);
                }
                pkt
            })
            .collect()
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Runner
// ═══════════════════════════════════════════════════════════════════════════════

/// Result of running a single test case
#[derive(Debug)]
pub struct CaseResult {
    pub case_name: String,
    pub passed: bool,
    pub expected: BTreeSet<String>,
    pub actual: BTreeSet<String>,
}

impl Fixture {
    /// Parse a fixture from YAML
    pub fn from_yaml(yaml: &str) -> Result<Self, serde_yaml::Error> {
        serde_yaml::from_str(yaml)
    }

    /// Parse multiple fixtures from a YAML file with `---` separators
    pub fn from_yaml_multi(yaml: &str) -> Result<Vec<Self>, serde_yaml::Error> {
        let mut fixtures = Vec::new();
        for doc in serde_yaml::Deserializer::from_str(yaml) {
            fixtures.push(Self::deserialize(doc)?);
        }
        Ok(fixtures)
    }

    /// Compile the query set, check the shape, and replay every case
    pub fn run(&self) -> pathq::Result<Vec<CaseResult>> {
        let tags = TagField::default();
        let (compiler, _) = Compiler::from_query_set(&self.query_set)?;
        let compiled = compiler.compile(&tags)?;

        let automaton = &compiled.automaton;
        let shape = [
            ("states", self.expect.states, automaton.len()),
            ("accepting", self.expect.accepting, automaton.accepting_count()),
            ("entries", self.expect.entries, compiler.registry().entries().len()),
        ];
        for (what, want, got) in shape {
            if let Some(want) = want {
                assert_eq!(want, got, "Fixture '{}': expected {want} {what}, got {got}", self.name);
            }
        }

        let names: BTreeMap<_, _> = compiler
            .registry()
            .queries()
            .iter()
            .map(|q| (q.sink, q.name.clone()))
            .collect();

        Ok(self
            .cases
            .iter()
            .map(|case| {
                let replay = compiler.replay(&compiled, &tags, &case.build_hops(&tags));
                let actual: BTreeSet<String> = replay
                    .reached()
                    .into_iter()
                    .filter_map(|sink| names.get(&sink).cloned())
                    .collect();
                let expected: BTreeSet<String> = case.reports.iter().cloned().collect();
                CaseResult {
                    case_name: case.name.clone(),
                    passed: actual == expected,
                    expected,
                    actual,
                }
            })
            .collect())
    }

    /// Run all test cases and panic on first failure
    pub fn run_and_assert(&self) {
        let results = self
            .run()
            .unwrap_or_else(|e| panic!("Fixture '{}' failed to compile: {e}", self.name));
        for result in results {
            assert!(
                result.passed,
                "Fixture '{}' case '{}' failed: expected {:?}, got {:?}",
                self.name, result.case_name, result.expected, result.actual
            );
        }
    }
}

/// Parse a bare query-set document (no cases)
pub fn query_set_from_yaml(yaml: &str) -> Result<QuerySet, serde_yaml::Error> {
    serde_yaml::from_str(yaml)
}

/// Parse a bare query-set document from JSON
pub fn query_set_from_json(json: &str) -> Result<QuerySet, serde_json::Error> {
    serde_json::from_str(json)
}
