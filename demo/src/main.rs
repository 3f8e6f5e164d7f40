//! TACTUS Demo CLI
//!
//! Runs a decision batch through the full TACTUS pipeline: the TOML action
//! policy, the gating engine, humanized timing and motion, bounded retries,
//! and the hash-chained audit log. Perception is replayed from a scripted
//! snapshot file and input goes to a logging sink, so nothing touches a real
//! client.
//!
//! Usage:
//!   cargo run -p demo -- run
//!   cargo run -p demo -- run --profile tired --seed 7 --json
//!   cargo run -p demo -- run --intents batch.json --snapshots perception.json
//!   cargo run -p demo -- run --require-approval --approve
//!   cargo run -p demo -- profiles
//!   cargo run -p demo -- validate --intents batch.json

mod scripted;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Args, Parser, Subcommand};
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

use tactus_audit::{read_events, verify_chain, InMemoryAuditWriter, JsonlAuditWriter};
use tactus_contracts::{
    error::{TactusError, TactusResult},
    execution::ExecutionSummary,
    intent::ActionIntent,
};
use tactus_core::{
    sink::LoggingSink,
    traits::{AuditWriter, Clock},
    ActionExecutor, ExecutionLoop, ManualClock, Session, StaticApprover, SystemClock,
};
use tactus_gate::decode_batch_str;
use tactus_humanize::ProfileRegistry;
use tactus_policy::{PolicyConfig, TomlPolicyEngine};

use scripted::ScriptedSnapshots;

const DEFAULT_PROFILES: &str = include_str!("../config/profiles.toml");
const DEFAULT_POLICY: &str = include_str!("../config/policy.toml");
const DEFAULT_INTENTS: &str = include_str!("../config/intents.json");
const DEFAULT_SNAPSHOTS: &str = include_str!("../config/snapshots.json");

// ── CLI definition ────────────────────────────────────────────────────────────

/// TACTUS — humanized, policy-bound action execution demo.
///
/// Every file argument is optional; the bundled demo configuration is used
/// for anything not given.
#[derive(Parser)]
#[command(
    name = "demo",
    about = "TACTUS humanized action engine demo",
    long_about = "Runs a decision batch through policy evaluation, gating, humanized\n\
                  input planning, retries, and the SHA-256 audit chain, against\n\
                  scripted perception and a logging input sink."
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Execute a decision batch and print the run summary.
    Run(RunArgs),
    /// List the humanization profiles available.
    Profiles(ProfileArgs),
    /// Validate a decision batch without executing it.
    Validate {
        /// Decision batch JSON (`{"actions": [...]}`).
        #[arg(long)]
        intents: Option<PathBuf>,
    },
}

#[derive(Args)]
struct ProfileArgs {
    /// Profile TOML file.
    #[arg(long)]
    profiles: Option<PathBuf>,
    /// Local overrides merged on top of `--profiles`.
    #[arg(long)]
    profile_overrides: Option<PathBuf>,
}

#[derive(Args)]
struct RunArgs {
    #[command(flatten)]
    profiles: ProfileArgs,
    /// Profile to run with.
    #[arg(long, default_value = "default")]
    profile: String,
    /// Action policy TOML file.
    #[arg(long)]
    policy: Option<PathBuf>,
    /// Decision batch JSON file.
    #[arg(long)]
    intents: Option<PathBuf>,
    /// Scripted snapshots JSON file (an array, replayed in order).
    #[arg(long)]
    snapshots: Option<PathBuf>,
    /// Seed overriding the profile's own.
    #[arg(long)]
    seed: Option<u64>,
    /// Execute at most this many intents.
    #[arg(long)]
    max_actions: Option<usize>,
    /// Deliver events to the logging sink instead of suppressing them.
    #[arg(long)]
    live: bool,
    /// Append the audit chain to this JSON-lines file.
    #[arg(long)]
    audit_file: Option<PathBuf>,
    /// Wait in real time instead of on a virtual clock.
    #[arg(long)]
    wall_clock: bool,
    /// Print the full summary as JSON.
    #[arg(long)]
    json: bool,
    /// Hold unsafe action types for approval, whatever the policy file says.
    #[arg(long)]
    require_approval: bool,
    /// Grant every approval request. Without it, a request suspends the run.
    #[arg(long)]
    approve: bool,
}

// ── Entry point ───────────────────────────────────────────────────────────────

fn main() {
    // Initialize structured logging.  Set RUST_LOG=debug for verbose output.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_target(false)
        .compact()
        .init();

    let cli = Cli::parse();

    print_banner();

    let result = match cli.command {
        Command::Run(args) => run(args),
        Command::Profiles(args) => list_profiles(&args),
        Command::Validate { intents } => validate(intents.as_deref()),
    };

    if let Err(e) = result {
        eprintln!("Demo error: {}", e);
        std::process::exit(1);
    }
}

// ── Configuration loading ─────────────────────────────────────────────────────

fn read(path: &Path, what: &str) -> TactusResult<String> {
    std::fs::read_to_string(path).map_err(|e| TactusError::ConfigError {
        reason: format!("failed to read {} '{}': {}", what, path.display(), e),
    })
}

fn load_registry(args: &ProfileArgs) -> TactusResult<ProfileRegistry> {
    let registry = match &args.profiles {
        Some(path) => ProfileRegistry::from_file(path)?,
        None => ProfileRegistry::from_toml_str(DEFAULT_PROFILES)?,
    };
    match &args.profile_overrides {
        Some(path) => Ok(registry.with_overrides(ProfileRegistry::from_file(path)?)),
        None => Ok(registry),
    }
}

fn load_intents(path: Option<&Path>) -> TactusResult<Vec<ActionIntent>> {
    match path {
        Some(path) => decode_batch_str(&read(path, "decision batch")?),
        None => decode_batch_str(DEFAULT_INTENTS),
    }
}

// ── Commands ──────────────────────────────────────────────────────────────────

fn run(args: RunArgs) -> TactusResult<()> {
    let registry = load_registry(&args.profiles)?;
    let profile = registry.select(&args.profile)?;
    let policy = match &args.policy {
        Some(path) => TomlPolicyEngine::from_file(path)?,
        None => TomlPolicyEngine::from_toml_str(DEFAULT_POLICY)?,
    };
    let policy = if args.require_approval {
        let mut config: PolicyConfig = policy.config().clone();
        config.approval.require_approval = true;
        TomlPolicyEngine::new(config)
    } else {
        policy
    };
    let intents = load_intents(args.intents.as_deref())?;
    let snapshots = match &args.snapshots {
        Some(path) => ScriptedSnapshots::from_file(path)?,
        None => ScriptedSnapshots::from_json_str(DEFAULT_SNAPSHOTS)?,
    };

    let run_id = Uuid::new_v4().to_string();
    let memory = InMemoryAuditWriter::new(run_id.clone());
    let audit: Box<dyn AuditWriter> = match &args.audit_file {
        Some(path) => Box::new(JsonlAuditWriter::open(path.clone(), run_id.clone())?),
        None => Box::new(memory.clone()),
    };

    let mut executor = ActionExecutor::new(Box::new(LoggingSink), Box::new(snapshots), Box::new(policy), audit);
    if args.approve {
        executor = executor.with_approver(Box::new(StaticApprover::granting()));
    }
    let clock: Arc<dyn Clock> = if args.wall_clock {
        Arc::new(SystemClock)
    } else {
        Arc::new(ManualClock::default())
    };
    let mut session = Session::new(profile, clock).with_dry_run(!args.live);
    if let Some(seed) = args.seed {
        session = session.with_seed(seed);
    }

    println!("=== Run {} ===", run_id);
    println!(
        "  Profile: {} (v{}), seed {}, {}",
        session.profile().profile_id,
        session.profile().version,
        session.seed(),
        if session.is_dry_run() { "dry run" } else { "live (logging sink)" }
    );
    println!("  Intents: {}", intents.len());
    println!();

    let summary = ExecutionLoop::new(&executor)
        .with_run_id(run_id.as_str())
        .run(&mut session, &intents, args.max_actions)?;

    print_summary(&summary);

    let intact = match &args.audit_file {
        Some(path) => verify_chain(&read_events(path)?),
        None => memory.verify_integrity(),
    };
    println!("  Audit chain integrity: {}", if intact { "VERIFIED" } else { "BROKEN" });
    if args.audit_file.is_none() {
        let log = memory.export_log()?;
        println!("  Trace records: {}", log.trace_count());
        println!("  Failed attempts: {}", log.failures().len());
        println!("  Terminal hash: {}", log.terminal_hash);
    }
    println!();

    if args.json {
        let json = serde_json::to_string_pretty(&summary).map_err(|e| TactusError::ConfigError {
            reason: format!("summary is not serializable: {}", e),
        })?;
        println!("{}", json);
    }
    Ok(())
}

fn list_profiles(args: &ProfileArgs) -> TactusResult<()> {
    let registry = load_registry(args)?;
    println!("Profiles (file version {}):", registry.version());
    for name in registry.names() {
        if let Some(p) = registry.get(name) {
            let seed = p.seed.map_or_else(|| "random".to_string(), |s| s.to_string());
            println!(
                "  {:<12} v{}  seed {:<10} reaction {:.0}ms  misclick {:.1}%  fatigue +{:.1}%/action",
                name,
                p.version,
                seed,
                p.timing.reaction.mean,
                p.errors.misclick_rate * 100.0,
                p.session.fatigue_drift_rate * 100.0
            );
        }
    }
    println!();
    Ok(())
}

fn validate(path: Option<&Path>) -> TactusResult<()> {
    let intents = load_intents(path)?;
    println!("Decision batch valid: {} intent(s)", intents.len());
    for intent in &intents {
        println!("  {:<16} {:<7} confidence {:.2}", intent.intent_id, intent.action_type.as_str(), intent.confidence);
    }
    println!();
    Ok(())
}

// ── Output ────────────────────────────────────────────────────────────────────

fn print_summary(summary: &ExecutionSummary) {
    for result in &summary.results {
        let attempts = result.details.get("attempts").and_then(|v| v.as_u64()).unwrap_or(0);
        match result.failure_reason {
            None => println!("  [OK]   {:<16} attempts {}", result.intent_id, attempts),
            Some(reason) => println!(
                "  [{}] {:<16} {}: {}",
                if result.is_skipped() { "SKIP" } else { "FAIL" },
                result.intent_id,
                reason,
                result.message
            ),
        }
    }
    println!();
    println!(
        "  Submitted {}, attempted {}: {} succeeded, {} skipped, {} failed",
        summary.submitted, summary.attempted, summary.succeeded, summary.skipped, summary.failed
    );
    if summary.idle_actions > 0 {
        println!("  Idle actions between intents: {}", summary.idle_actions);
    }
    if let Some(reason) = &summary.abort_reason {
        println!(
            "  Aborted early{}: {}",
            if summary.hard_stop { " (hard stop)" } else { "" },
            reason
        );
    }
}

// ── Banner ────────────────────────────────────────────────────────────────────

fn print_banner() {
    println!();
    println!("TACTUS — Humanized Action Execution Engine");
    println!("Scripted Perception Demo");
    println!("==========================================");
    println!();
    println!("TACTUS pipeline per intent:");
    println!("  [1] Intent validated, then the action policy evaluates → Allow / Deny / RequireApproval");
    println!("  [2] Pre-action gates: focus, panic triggers, cues, confidence, irreversibility");
    println!("  [3] Humanized input planned: reaction, curved path, overshoot, near-miss, typing rhythm");
    println!("  [4] Fresh snapshot, post-action gate, bounded retry on a miss");
    println!("  [5] One trace per attempt appended to the SHA-256 audit chain");
    println!();
}
