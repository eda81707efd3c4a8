//! Agentic TDD command line.
//!
//! `agentic-tdd run KATA.md` drives Red-Green-Refactor cycles on a kata in a
//! work directory; `agentic-tdd init` only prepares the directory.

use std::path::{Path, PathBuf};

use agentic_tdd::controller::{Collaborators, ControllerConfig, CycleController, RunReport};
use agentic_tdd::core::types::TerminalOutcome;
use agentic_tdd::exit_codes;
use agentic_tdd::io::attempt_log::AttemptLog;
use agentic_tdd::io::config::{TddConfig, default_config_path, load_config, write_config};
use agentic_tdd::io::git::Git;
use agentic_tdd::io::llm::OpenAiCompatClient;
use agentic_tdd::io::project::{Language, RunnerOptions};
use agentic_tdd::io::prompt::PromptBuilder;
use agentic_tdd::io::workspace::Workspace;
use agentic_tdd::kata::KataSpec;
use agentic_tdd::logging;
use agentic_tdd::settings::{DEFAULT_MODEL, Provider, RunRequest, Settings};
use agentic_tdd::setup::prepare_work_dir;
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::info;

const DEFAULT_WORK_DIR: &str = "./agentic-tdd-kata";

#[derive(Parser)]
#[command(
    name = "agentic-tdd",
    version,
    about = "Drive Red-Green-Refactor cycles on a kata with LLM agents"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run TDD cycles for the kata described in KATA_MD.
    Run {
        /// Markdown file with the kata rules.
        kata_md: PathBuf,

        /// Model name sent to the provider.
        #[arg(short, long, default_value = DEFAULT_MODEL)]
        model: String,

        #[arg(short, long, value_enum, default_value_t = Provider::Openai)]
        provider: Provider,

        /// API key; defaults to <PROVIDER>_API_KEY, then AGENTIC_TDD_API_KEY.
        #[arg(short = 'k', long)]
        api_key: Option<String>,

        /// Override the provider's base URL.
        #[arg(long)]
        base_url: Option<String>,

        /// Directory holding the kata project and its git repository.
        #[arg(short, long, default_value = DEFAULT_WORK_DIR)]
        work_dir: PathBuf,

        #[arg(short, long, value_enum, default_value_t = Language::Rust)]
        language: Language,

        /// Full Red-Green-Refactor cycles to run [default: from config, 5].
        #[arg(long)]
        max_cycles: Option<u32>,

        /// Attempts per phase before aborting [default: from config, 5].
        #[arg(long)]
        max_attempts: Option<u32>,

        /// TOML config file [default: <work-dir>/.agentic-tdd/config.toml].
        #[arg(long)]
        config: Option<PathBuf>,
    },
    /// Create the project skeleton, git repository and default config.
    Init {
        #[arg(short, long, default_value = DEFAULT_WORK_DIR)]
        work_dir: PathBuf,

        #[arg(short, long, value_enum, default_value_t = Language::Rust)]
        language: Language,
    },
}

fn main() {
    match run() {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("{:#}", err);
            std::process::exit(exit_codes::INVALID);
        }
    }
}

fn run() -> Result<i32> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    logging::init();
    match cli.command {
        Command::Run {
            kata_md,
            model,
            provider,
            api_key,
            base_url,
            work_dir,
            language,
            max_cycles,
            max_attempts,
            config,
        } => {
            let request = RunRequest {
                kata_path: kata_md,
                work_dir,
                language,
                provider,
                model,
                api_key,
                base_url,
                max_cycles,
                max_attempts,
            };
            cmd_run(request, config.as_deref())
        }
        Command::Init { work_dir, language } => cmd_init(&work_dir, language),
    }
}

fn cmd_run(request: RunRequest, config_path: Option<&Path>) -> Result<i32> {
    let kata = KataSpec::load(&request.kata_path, request.language)?;
    let config_path = config_path
        .map(Path::to_path_buf)
        .unwrap_or_else(|| default_config_path(&request.work_dir));
    let config = load_config(&config_path)?;
    let settings = Settings::resolve(request, &config, |key| std::env::var(key).ok())?;
    info!(
        kata = %settings.kata_path.display(),
        work_dir = %settings.work_dir.display(),
        provider = %settings.llm.provider,
        model = %settings.llm.model,
        "settings resolved"
    );

    let mut runner = settings.language.runner(
        &settings.work_dir,
        RunnerOptions {
            test_timeout: settings.test_timeout,
            output_limit_bytes: settings.output_limit_bytes,
        },
    );
    prepare_work_dir(&settings.work_dir, &mut runner)?;

    let llm = OpenAiCompatClient::new(settings.llm.clone()).context("build LLM client")?;
    let mut git = Git::new(&settings.work_dir);
    let prompts = PromptBuilder::new(settings.prompt_budget_bytes)?;

    let report = CycleController::new(
        &kata,
        Collaborators {
            llm: &llm,
            runner: &mut runner,
            vcs: &mut git,
        },
        Workspace::new(&settings.work_dir),
        prompts,
        ControllerConfig {
            max_cycles: settings.max_cycles,
            max_attempts: settings.max_attempts,
        },
    )
    .with_attempt_log(AttemptLog::new(&settings.work_dir))
    .run();

    print_report(&report);
    Ok(exit_codes::for_outcome(&report.outcome))
}

fn cmd_init(work_dir: &Path, language: Language) -> Result<i32> {
    let mut runner = language.runner(work_dir, RunnerOptions::default());
    let outcome = prepare_work_dir(work_dir, &mut runner)?;

    let config_path = default_config_path(work_dir);
    if !config_path.exists() {
        write_config(&config_path, &TddConfig::default())?;
    }

    match outcome.skeleton_commit {
        Some(commit) => println!("initialized {} ({commit})", work_dir.display()),
        None => println!("{} already initialized", work_dir.display()),
    }
    Ok(exit_codes::OK)
}

fn print_report(report: &RunReport) {
    let commits = report.commits();
    match &report.outcome {
        TerminalOutcome::Completed => println!(
            "completed {} cycle(s), {} commit(s)",
            report.state.cycle_index,
            commits.len()
        ),
        TerminalOutcome::Exhausted => println!(
            "kata covered after {} cycle(s), {} commit(s)",
            report.state.cycle_index,
            commits.len()
        ),
        TerminalOutcome::Aborted(reason) => {
            println!("aborted: {reason}");
            println!("{} commit(s) kept", commits.len());
        }
    }
    for commit in &commits {
        println!("  {commit}");
    }
}
