//! CEO - agent orchestration CLI
//!
//! The `ceo` command loads an orchestrator settings file and drives the
//! autonomy loop against the simulated adapter.
//!
//! ## Commands
//!
//! - `agents`: List registered agents and their scores
//! - `decide`: Preview the decision for a task without executing it
//! - `run`: Execute a task (optionally many times, concurrently)
//! - `check-config`: Validate a settings file

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use serde::Serialize;
use tracing::{info, Level};

use ceo_core::fakes::SimulatedAdapter;
use ceo_core::{
    AgentAdapter, AgentCategory, AutonomyLoop, AutonomyStats, ExecutionContext, MetricsSnapshot,
    OperationResult, OrchestratorSettings, RiskTolerance,
};

#[derive(Parser)]
#[command(name = "ceo")]
#[command(version = ceo_core::VERSION)]
#[command(about = "Autonomous agent orchestration core", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long, global = true)]
    json: bool,

    /// Orchestrator settings file (TOML)
    #[arg(short, long, global = true, env = "CEO_SETTINGS")]
    settings: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List registered agents
    Agents {
        /// Only show agents of this category
        #[arg(short, long, value_enum)]
        category: Option<CategoryArg>,
    },

    /// Show which agent would handle a task, without running it
    Decide {
        #[command(flatten)]
        task: TaskArgs,
    },

    /// Execute a task through the autonomy loop
    Run {
        #[command(flatten)]
        task: TaskArgs,

        /// Number of concurrent executions of the same task
        #[arg(long, default_value = "1")]
        repeat: usize,

        /// Simulated adapter latency in milliseconds
        #[arg(long, default_value = "100")]
        latency_ms: u64,

        /// Make every Nth simulated call fail
        #[arg(long)]
        fail_every: Option<u64>,
    },

    /// Validate a settings file and print a summary
    CheckConfig,
}

#[derive(Args, Debug, Clone)]
struct TaskArgs {
    /// Task identifier
    #[arg(long, default_value = "cli-task")]
    task_id: String,

    /// Task description
    #[arg(short, long)]
    task: String,

    /// Required specialization tag (repeatable)
    #[arg(long = "tag", required = true)]
    tags: Vec<String>,

    /// Per-request cost cap
    #[arg(long)]
    cost_cap: Option<f64>,

    /// Per-attempt time budget in milliseconds
    #[arg(long)]
    time_budget_ms: Option<u64>,

    /// Minimum expected success rate (0-100)
    #[arg(long, default_value = "0")]
    quality: f64,

    #[arg(long, value_enum, default_value = "medium")]
    risk: RiskArg,

    /// Force human oversight
    #[arg(long)]
    oversight: bool,

    /// Request constraint as key=value (repeatable)
    #[arg(long = "constraint", value_parser = parse_constraint)]
    constraints: Vec<(String, String)>,
}

impl TaskArgs {
    fn to_context(&self) -> ExecutionContext {
        let mut ctx = ExecutionContext::new(&self.task_id, &self.task)
            .with_tags(&self.tags)
            .with_required_quality(self.quality)
            .with_risk_tolerance(self.risk.into());
        if let Some(cap) = self.cost_cap {
            ctx = ctx.with_cost_cap(cap);
        }
        if let Some(budget) = self.time_budget_ms {
            ctx = ctx.with_time_budget_ms(budget);
        }
        if self.oversight {
            ctx = ctx.requiring_oversight();
        }
        for (key, value) in &self.constraints {
            ctx = ctx.with_constraint(key.clone(), value.clone());
        }
        ctx
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
enum RiskArg {
    Low,
    Medium,
    High,
}

impl From<RiskArg> for RiskTolerance {
    fn from(risk: RiskArg) -> Self {
        match risk {
            RiskArg::Low => RiskTolerance::Low,
            RiskArg::Medium => RiskTolerance::Medium,
            RiskArg::High => RiskTolerance::High,
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
enum CategoryArg {
    Code,
    Content,
    Data,
    Analysis,
    Automation,
    Reasoning,
}

impl From<CategoryArg> for AgentCategory {
    fn from(category: CategoryArg) -> Self {
        match category {
            CategoryArg::Code => AgentCategory::Code,
            CategoryArg::Content => AgentCategory::Content,
            CategoryArg::Data => AgentCategory::Data,
            CategoryArg::Analysis => AgentCategory::Analysis,
            CategoryArg::Automation => AgentCategory::Automation,
            CategoryArg::Reasoning => AgentCategory::Reasoning,
        }
    }
}

fn parse_constraint(raw: &str) -> Result<(String, String), String> {
    let (key, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected key=value, got '{raw}'"))?;
    let key = key.trim();
    if key.is_empty() {
        return Err(format!("constraint key is empty in '{raw}'"));
    }
    Ok((key.to_string(), value.trim().to_string()))
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    ceo_core::init_tracing(cli.json, level);

    let settings = load_settings(cli.settings.as_deref())?;

    match cli.command {
        Commands::Agents { category } => cmd_agents(&settings, category.map(Into::into)),
        Commands::Decide { task } => cmd_decide(&settings, &task),
        Commands::Run {
            task,
            repeat,
            latency_ms,
            fail_every,
        } => cmd_run(&settings, &task, repeat, latency_ms, fail_every).await,
        Commands::CheckConfig => cmd_check_config(&settings, cli.settings.as_deref()),
    }
}

fn load_settings(path: Option<&Path>) -> Result<OrchestratorSettings> {
    match path {
        Some(path) => OrchestratorSettings::load(path)
            .with_context(|| format!("Failed to load settings from {}", path.display())),
        None => {
            info!("no settings file given, using defaults with an empty registry");
            Ok(OrchestratorSettings::default())
        }
    }
}

fn build_loop(
    settings: &OrchestratorSettings,
    latency_ms: u64,
    fail_every: Option<u64>,
) -> Result<AutonomyLoop> {
    let registry = settings
        .build_registry()
        .context("Failed to register agents")?;
    let mut simulated = SimulatedAdapter::new(Arc::clone(&registry))
        .with_latency(Duration::from_millis(latency_ms));
    if let Some(n) = fail_every {
        simulated = simulated.with_fail_every(n);
    }
    let adapter: Arc<dyn AgentAdapter> = Arc::new(simulated);
    AutonomyLoop::from_settings_with_registry(settings, registry, adapter)
        .context("Failed to build autonomy loop")
}

fn cmd_agents(settings: &OrchestratorSettings, category: Option<AgentCategory>) -> Result<()> {
    let registry = settings
        .build_registry()
        .context("Failed to register agents")?;
    let agents = match category {
        Some(category) => registry.agents_by_category(category),
        None => registry.agents(),
    };

    if agents.is_empty() {
        println!("No agents registered.");
        return Ok(());
    }

    println!(
        "{:<16} {:<12} {:>10} {:>8} {:>8}  SPECIALIZATIONS",
        "ID", "CATEGORY", "COST", "TRUST", "SUCCESS"
    );
    for agent in agents {
        let tags: Vec<&str> = agent.specializations.iter().map(String::as_str).collect();
        println!(
            "{:<16} {:<12} {:>10.2} {:>8.1} {:>8.1}  {}",
            agent.id,
            agent.category,
            agent.cost_per_call,
            agent.trust_score,
            agent.success_rate,
            tags.join(",")
        );
    }
    Ok(())
}

fn cmd_decide(settings: &OrchestratorSettings, task: &TaskArgs) -> Result<()> {
    let lp = build_loop(settings, 0, None)?;
    let decision = lp.make_decision(&task.to_context());
    println!("{}", serde_json::to_string_pretty(&decision)?);
    Ok(())
}

async fn cmd_run(
    settings: &OrchestratorSettings,
    task: &TaskArgs,
    repeat: usize,
    latency_ms: u64,
    fail_every: Option<u64>,
) -> Result<()> {
    let lp = Arc::new(build_loop(settings, latency_ms, fail_every)?);
    let ctx = task.to_context();

    let runs = (0..repeat.max(1)).map(|_| {
        let lp = Arc::clone(&lp);
        let ctx = ctx.clone();
        async move { lp.execute_operation(&ctx).await }
    });
    let results = futures::future::join_all(runs).await;

    for result in &results {
        print_result(result);
    }

    let summary = RunSummary {
        stats: lp.get_stats(),
        metrics: lp.metrics_snapshot(),
    };
    lp.metrics().flush();
    println!();
    println!("Stats: {}", summary.stats);
    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}

#[derive(Serialize)]
struct RunSummary {
    stats: AutonomyStats,
    metrics: MetricsSnapshot,
}

fn print_result(result: &OperationResult) {
    let status = if result.success { "ok" } else { "failed" };
    println!(
        "[{status}] {} task={} agent={} state={} attempts={} cost={:.2} time={}ms cache_hit={}",
        result.operation_id,
        result.task_id,
        result.selected_agent_id().unwrap_or("-"),
        result.final_state,
        result.attempts,
        result.cost,
        result.execution_time_ms,
        result.cache_hit
    );
    for error in &result.errors {
        println!("    {error}");
    }
}

fn cmd_check_config(settings: &OrchestratorSettings, path: Option<&Path>) -> Result<()> {
    settings.validate().context("Settings failed validation")?;
    let source = path.map_or_else(|| "<defaults>".to_string(), |p| p.display().to_string());
    println!("Settings OK: {source}");
    println!(
        "  autonomy: max_retries={} retry_delay_ms={} enforcement={} cost_cap={:.2} learning={}",
        settings.autonomy.max_retries,
        settings.autonomy.retry_delay_ms,
        settings.autonomy.policy_enforcement_level,
        settings.autonomy.cost_cap,
        settings.autonomy.learning_enabled
    );
    println!(
        "  cache: enabled={} capacity={}",
        settings.cache.enabled, settings.cache.capacity
    );
    println!("  agents: {}", settings.agents.len());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use ceo_core::AgentCapability;

    const SETTINGS: &str = r#"
[autonomy]
retry_delay_ms = 1

[[agents]]
id = "writer"
name = "Writer"
category = "content"
cost_per_call = 4.0
trust_score = 88.0
success_rate = 92.0
specializations = ["blog"]
"#;

    #[test]
    fn test_parse_run_command() {
        let cli = Cli::try_parse_from([
            "ceo",
            "run",
            "--task",
            "write a post",
            "--tag",
            "blog",
            "--tag",
            "seo",
            "--risk",
            "high",
            "--constraint",
            "tone=casual",
            "--repeat",
            "4",
        ])
        .unwrap();

        match cli.command {
            Commands::Run { task, repeat, .. } => {
                assert_eq!(repeat, 4);
                let ctx = task.to_context();
                assert_eq!(ctx.required_tags.len(), 2);
                assert_eq!(ctx.risk_tolerance, RiskTolerance::High);
                assert_eq!(ctx.constraints["tone"], serde_json::json!("casual"));
            }
            _ => panic!("expected run command"),
        }
    }

    #[test]
    fn test_version_comes_from_core() {
        let err = Cli::try_parse_from(["ceo", "--version"]).err().unwrap();
        assert_eq!(err.kind(), clap::error::ErrorKind::DisplayVersion);
        assert!(err.to_string().contains(ceo_core::VERSION));
    }

    #[test]
    fn test_decide_requires_a_tag() {
        assert!(Cli::try_parse_from(["ceo", "decide", "--task", "x"]).is_err());
    }

    #[test]
    fn test_constraint_parser() {
        assert_eq!(
            parse_constraint("lang = rust").unwrap(),
            ("lang".to_string(), "rust".to_string())
        );
        assert!(parse_constraint("no-equals").is_err());
        assert!(parse_constraint("=value").is_err());
    }

    #[test]
    fn test_settings_flag_is_global() {
        let cli = Cli::try_parse_from(["ceo", "check-config", "--settings", "demo.toml"]).unwrap();
        assert_eq!(cli.settings, Some(PathBuf::from("demo.toml")));
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_against_settings_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ceo.toml");
        std::fs::write(&path, SETTINGS).unwrap();

        let settings = load_settings(Some(&path)).unwrap();
        cmd_check_config(&settings, Some(&path)).unwrap();
        cmd_agents(&settings, Some(AgentCategory::Content)).unwrap();

        let task = TaskArgs {
            task_id: "t-1".into(),
            task: "draft a launch post".into(),
            tags: vec!["blog".into()],
            cost_cap: None,
            time_budget_ms: None,
            quality: 0.0,
            risk: RiskArg::Medium,
            oversight: false,
            constraints: Vec::new(),
        };
        cmd_decide(&settings, &task).unwrap();
        cmd_run(&settings, &task, 3, 10, None).await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_agent_registered_on_loop_is_routable() {
        let settings = OrchestratorSettings::from_toml_str(SETTINGS).unwrap();
        let lp = build_loop(&settings, 0, None).unwrap();
        lp.register_agent(
            AgentCapability::new("late", "Late Joiner", AgentCategory::Content)
                .with_cost(2.0)
                .with_scores(90.0, 90.0)
                .with_specializations(["news"]),
        )
        .unwrap();

        let ctx = ExecutionContext::new("t-late", "summarise the morning headlines")
            .with_tags(["news"]);
        let result = lp.execute_operation(&ctx).await;

        assert!(result.success, "{:?}", result.errors);
        assert_eq!(result.selected_agent_id(), Some("late"));
        assert_eq!(result.attempts, 1);
    }

    #[test]
    fn test_missing_settings_file_errors() {
        let err = load_settings(Some(Path::new("/nonexistent/ceo.toml"))).unwrap_err();
        assert!(format!("{err:#}").contains("Failed to load settings"));
    }
}
