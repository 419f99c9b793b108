//! pathq CLI — driving adapter for the path-query compiler.
//!
//! Subcommands:
//! - `compile <queries> [--dot] [--lexer] [--policies]` — build and print the automaton
//! - `check <queries>` — validate the query set compiles
//! - `replay <queries> --hop k=v,k=v ... [--trace]` — push one packet along a path

use std::collections::BTreeMap;
use std::path::Path;
use std::process;

use clap::{Parser, Subcommand};
use pathq::{lexer_spec, CompiledPolicies, Compiler, StateId, TagEncoding};
use pathq_test::{HeaderSpace, Packet, QuerySet, TagField};
use tracing::debug;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// pathq - compile path queries into tagging and counting policies
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Log level when RUST_LOG is unset
    #[arg(long, default_value = "warn", global = true)]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Compile a query set and print the automaton
    Compile {
        /// Query-set file (.json, otherwise YAML)
        queries: String,
        /// Print Graphviz dot instead of the state listing
        #[arg(long)]
        dot: bool,
        /// Also print the lexer-definition text of the regex set
        #[arg(long)]
        lexer: bool,
        /// Also print the tagging, untagging and counting policies
        #[arg(long)]
        policies: bool,
    },
    /// Validate that a query set loads and compiles
    Check {
        /// Query-set file (.json, otherwise YAML)
        queries: String,
    },
    /// Push one packet along a path and report matching queries
    Replay {
        /// Query-set file (.json, otherwise YAML)
        queries: String,
        /// Header fields observed at one hop, e.g. `switch=1,port=80`; repeat per hop
        #[arg(long = "hop", required = true)]
        hops: Vec<String>,
        /// Print the tagging trace of every hop
        #[arg(long)]
        trace: bool,
    },
}

fn main() {
    let args = Args::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("pathq={}", args.log_level).into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let result = match args.command {
        Command::Compile {
            queries,
            dot,
            lexer,
            policies,
        } => cmd_compile(&queries, dot, lexer, policies),
        Command::Check { queries } => cmd_check(&queries),
        Command::Replay { queries, hops, trace } => cmd_replay(&queries, &hops, trace),
    };

    if let Err(e) = result {
        eprintln!("error: {e}");
        process::exit(1);
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Commands
// ═══════════════════════════════════════════════════════════════════════════════

fn cmd_compile(path: &str, dot: bool, lexer: bool, policies: bool) -> Result<(), String> {
    let (compiler, compiled) = build(path)?;

    if dot {
        print!("{}", compiled.automaton.to_dot());
    } else {
        print!("{}", compiled.automaton);
    }

    println!("\nQueries:");
    for q in compiler.registry().queries() {
        println!("  {} -> {}  {}", q.name, q.sink, q.terminal);
    }

    if lexer {
        println!("\nRegex set:");
        print!("{}", lexer_spec(&compiler.registry().patterns()));
    }

    if policies {
        println!("\nTagging:\n  {}", compiled.tagging);
        println!("Untagging:\n  {}", compiled.untagging);
        println!("Counting:\n  {}", compiled.counting);
    }
    Ok(())
}

fn cmd_check(path: &str) -> Result<(), String> {
    let (compiler, compiled) = build(path)?;
    println!(
        "Query set valid: {} queries, {} entries, {} states, {} tag rules",
        compiler.registry().queries().len(),
        compiler.registry().entries().len(),
        compiled.automaton.len(),
        compiled.tag_rules.len()
    );
    Ok(())
}

fn cmd_replay(path: &str, hops: &[String], trace: bool) -> Result<(), String> {
    let (compiler, compiled) = build(path)?;
    let tags = TagField::default();
    let packets = hops
        .iter()
        .enumerate()
        .map(|(i, hop)| parse_hop(hop, i + 1 == hops.len(), &tags))
        .collect::<Result<Vec<_>, _>>()?;

    let replay = compiler.replay(&compiled, &tags, &packets);
    let names = sink_names(&compiler);

    let mut state = StateId::START;
    for (i, (pkt, next)) in packets.iter().zip(&replay.states).enumerate() {
        println!("hop {i}: {pkt}  state {state} -> {next}");
        if trace {
            print_trace(&compiled, &tags, pkt, state);
        }
        for (_, sink) in replay.deliveries.iter().filter(|(h, _)| *h == i) {
            println!("  reported: {}", names.get(sink).map_or("?", String::as_str));
        }
        state = *next;
    }
    if let Some(out) = &replay.egress {
        println!("egress: {out}");
    }
    if replay.reached().is_empty() {
        println!("(no match)");
    }
    Ok(())
}

fn print_trace(
    compiled: &CompiledPolicies<HeaderSpace>,
    tags: &TagField,
    hop: &Packet,
    state: StateId,
) {
    let mut pkt = hop.clone();
    tags.set_state(&mut pkt, state);
    let (_, trace) = compiled.tagging.evaluate_with_trace(&pkt, tags);
    for line in trace.to_string().lines() {
        println!("    {line}");
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Compilation (composition root)
// ═══════════════════════════════════════════════════════════════════════════════

fn build(path: &str) -> Result<(Compiler<HeaderSpace>, CompiledPolicies<HeaderSpace>), String> {
    let set = load_query_set(path)?;
    let (compiler, loaded) =
        Compiler::from_query_set(&set).map_err(|e| format!("query set invalid: {e}"))?;
    debug!(queries = loaded.queries.len(), atoms = loaded.atoms.len(), "loaded query set");
    let compiled = compiler
        .compile(&TagField::default())
        .map_err(|e| format!("compilation failed: {e}"))?;
    Ok((compiler, compiled))
}

fn sink_names(compiler: &Compiler<HeaderSpace>) -> BTreeMap<pathq::SinkId, String> {
    compiler
        .registry()
        .queries()
        .iter()
        .map(|q| (q.sink, q.name.clone()))
        .collect()
}

// ═══════════════════════════════════════════════════════════════════════════════
// Config loading
// ═══════════════════════════════════════════════════════════════════════════════

fn load_query_set(path: &str) -> Result<QuerySet, String> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| format!("failed to read \"{path}\": {e}"))?;

    let is_json = Path::new(path)
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));

    parse_query_set(&content, is_json)
}

fn parse_query_set(content: &str, is_json: bool) -> Result<QuerySet, String> {
    if is_json {
        serde_json::from_str(content).map_err(|e| format!("JSON parse error: {e}"))
    } else {
        // Default to YAML (handles .yaml and .yml)
        serde_yaml::from_str(content).map_err(|e| format!("YAML parse error: {e}"))
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Argument parsing
// ═══════════════════════════════════════════════════════════════════════════════

/// `switch=1,port=80` → packet. The last hop is marked as egress unless the
/// pairs set the egress field themselves.
fn parse_hop(hop: &str, last: bool, tags: &TagField) -> Result<Packet, String> {
    let mut pkt = Packet::new();
    for pair in hop.split(',').map(str::trim).filter(|p| !p.is_empty()) {
        let (key, value) = pair
            .split_once('=')
            .ok_or_else(|| format!("invalid hop field \"{pair}\", expected key=value"))?;
        let value: u64 = value
            .trim()
            .parse()
            .map_err(|e| format!("invalid value in \"{pair}\": {e}"))?;
        pkt.set(key.trim(), value);
    }
    if last && !pkt.has(&tags.egress_field) {
        pkt.set(tags.egress_field.as_str(), tags.egress_value);
    }
    Ok(pkt)
}
