//! judgebox CLI
//!
//! A command-line tool for judging submissions in sandboxed containers.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use judgebox::{
    BatchPolicy, Config, DockerRunner, EXAMPLE_CONFIG, ExecutionRequest, Judge, LanguageId,
    RemoteConfig, RemoteRunner, ResourceLimits, Runner, SubmissionResult, TestCase, Verdict,
    classify_outcome, load_battery,
};
use tracing::{Level, debug, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "judgebox")]
#[command(about = "A tool for judging untrusted code in sandboxed containers")]
#[command(version)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Delegate execution to a Judge0-compatible service at this URL
    #[arg(long, global = true, env = "JUDGEBOX_REMOTE_URL")]
    remote: Option<String>,

    /// API key for the remote service
    #[arg(long, global = true, env = "JUDGE0_API_KEY", hide_env_values = true)]
    api_key: Option<String>,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize a new configuration file
    Init {
        /// Output path (default: judgebox.toml)
        #[arg(short, long, default_value = "judgebox.toml")]
        output: PathBuf,

        /// Overwrite existing file
        #[arg(short, long)]
        force: bool,
    },

    /// Judge a submission against a test battery
    Judge {
        /// Source file to judge
        #[arg(value_name = "FILE")]
        source: PathBuf,

        /// Language ID (c, cpp, java, python)
        #[arg(short, long)]
        language: LanguageId,

        /// TOML file with [[cases]] entries
        #[arg(short, long, value_name = "FILE")]
        tests: PathBuf,

        /// Time limit in seconds
        #[arg(long)]
        time_limit: Option<f64>,

        /// Memory limit in MB
        #[arg(long)]
        memory_limit: Option<u64>,

        /// Keep going after a failing case (compile errors still stop the batch)
        #[arg(long)]
        run_all: bool,

        /// Print a human-readable summary instead of JSON
        #[arg(long)]
        text: bool,
    },

    /// Run a program once (compile if needed, then execute)
    Run {
        /// Source file to run
        #[arg(value_name = "FILE")]
        source: PathBuf,

        /// Language ID (c, cpp, java, python)
        #[arg(short, long)]
        language: LanguageId,

        /// Input file (default: empty stdin)
        #[arg(short, long)]
        input: Option<PathBuf>,

        /// Expected output file; judges the run as a single test case
        #[arg(short, long)]
        expected: Option<PathBuf>,

        /// Time limit in seconds
        #[arg(long)]
        time_limit: Option<f64>,

        /// Memory limit in MB
        #[arg(long)]
        memory_limit: Option<u64>,
    },

    /// List available languages
    Languages,

    /// Show effective configuration
    ShowConfig,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::from_default_env().add_directive(Level::DEBUG.into())
    } else {
        EnvFilter::from_default_env().add_directive(Level::INFO.into())
    };

    // stdout carries results only
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let config = if let Some(ref path) = cli.config {
        info!(?path, "loading configuration");
        Config::from_file(path).context("failed to load configuration")?
    } else {
        debug!("using default configuration");
        Config::default()
    };

    match cli.command {
        Commands::Init { ref output, force } => init_config(output, force).await,
        Commands::Judge {
            ref source,
            language,
            ref tests,
            time_limit,
            memory_limit,
            run_all,
            text,
        } => {
            let runner = build_runner(&cli, &config)?;
            let limits = user_limits(time_limit, memory_limit);
            let mut judge = Judge::new(runner, &config);
            if run_all {
                judge = judge.with_policy(BatchPolicy::RunAll);
            }
            run_judge(&judge, source, language, tests, limits.as_ref(), text).await
        }
        Commands::Run {
            ref source,
            language,
            ref input,
            ref expected,
            time_limit,
            memory_limit,
        } => {
            let runner = build_runner(&cli, &config)?;
            let limits = user_limits(time_limit, memory_limit);
            run_execute(
                runner,
                &config,
                source,
                language,
                input.as_deref(),
                expected.as_deref(),
                limits.as_ref(),
            )
            .await
        }
        Commands::Languages => {
            list_languages(&config);
            Ok(())
        }
        Commands::ShowConfig => {
            show_config(&config, &cli);
            Ok(())
        }
    }
}

/// Pick the local container runner or the remote service
fn build_runner(cli: &Cli, config: &Config) -> Result<Box<dyn Runner>> {
    let remote = match (&cli.remote, &config.remote) {
        (Some(url), configured) => {
            let base = configured
                .clone()
                .map(|mut c| {
                    c.url = url.clone();
                    c
                })
                .unwrap_or_else(|| RemoteConfig::new(url));
            Some(base)
        }
        (None, configured) => configured.clone(),
    };

    match remote {
        Some(mut remote) => {
            if let Some(ref key) = cli.api_key {
                remote = remote.with_api_key(key);
            }
            info!(url = %remote.url, "using remote runner");
            let runner = RemoteRunner::new(remote).context("failed to create remote runner")?;
            Ok(Box::new(runner))
        }
        None => {
            debug!(docker = %config.docker_binary().display(), "using local container runner");
            Ok(Box::new(DockerRunner::new(config.clone())))
        }
    }
}

/// Only explicitly-specified values, so they don't override configured defaults
fn user_limits(time_limit: Option<f64>, memory_limit: Option<u64>) -> Option<ResourceLimits> {
    if time_limit.is_none() && memory_limit.is_none() {
        return None;
    }
    Some(ResourceLimits {
        time_limit,
        memory_limit,
    })
}

async fn read_source(source: &Path) -> Result<String> {
    tokio::fs::read_to_string(source)
        .await
        .with_context(|| format!("failed to read source file '{}'", source.display()))
}

async fn run_judge(
    judge: &Judge<Box<dyn Runner>>,
    source: &Path,
    language: LanguageId,
    tests: &Path,
    limits: Option<&ResourceLimits>,
    text: bool,
) -> Result<()> {
    let code = read_source(source).await?;
    let cases = load_battery(tests).context("failed to load test battery")?;

    info!(%language, cases = cases.len(), "judging submission");
    let result = judge
        .judge(&code, language, &cases, limits)
        .await
        .context("judging failed")?;

    if text {
        print_submission(&result);
    } else {
        println!(
            "{}",
            serde_json::to_string_pretty(&result).context("failed to serialize result")?
        );
    }

    if result.verdict != Verdict::Accepted {
        std::process::exit(1);
    }
    Ok(())
}

fn print_submission(result: &SubmissionResult) {
    println!("{}: {}", result.verdict, result.message);
    for case in &result.test_results {
        let status = if case.passed { "ok" } else { "FAILED" };
        let hidden = if case.hidden { " (hidden)" } else { "" };
        println!(
            "  case {}{}: {} [{}] {}ms",
            case.index + 1,
            hidden,
            status,
            case.verdict,
            case.wall_time_ms
        );
        if let Some(ref error) = case.error {
            for line in error.message.lines() {
                println!("    {line}");
            }
        } else if !case.passed
            && let (Some(expected), Some(actual)) = (&case.expected_output, &case.actual_output)
        {
            println!("    expected: {:?}", expected.trim_end());
            println!("    actual:   {:?}", actual.trim_end());
        }
    }
}

async fn run_execute(
    runner: Box<dyn Runner>,
    config: &Config,
    source: &Path,
    language: LanguageId,
    input: Option<&Path>,
    expected: Option<&Path>,
    limits: Option<&ResourceLimits>,
) -> Result<()> {
    let code = read_source(source).await?;

    let stdin = if let Some(input_path) = input {
        tokio::fs::read_to_string(input_path)
            .await
            .context("failed to read input file")?
    } else {
        String::new()
    };

    // With an expected output, this is a single-case judge
    if let Some(expected_path) = expected {
        let expected_output = tokio::fs::read_to_string(expected_path)
            .await
            .context("failed to read expected output file")?;
        let judge = Judge::new(runner, config);
        let single = judge
            .run_one(&code, language, &TestCase::new(stdin, expected_output), limits)
            .await
            .context("judging failed")?;
        println!(
            "{}",
            serde_json::to_string_pretty(&single).context("failed to serialize result")?
        );
        if single.verdict != Verdict::Accepted {
            std::process::exit(1);
        }
        return Ok(());
    }

    let profile = config.profile(language)?;
    let limits = config.effective_limits(limits);
    let request = ExecutionRequest::new(code, profile, stdin, &limits)
        .context("invalid resource limits")?;

    info!(%language, "executing program");
    let outcome = runner
        .execute(&request)
        .await
        .context("execution failed")?;

    // Program output on stdout, keeping it clean for piping
    print!("{}", outcome.stdout);
    if !outcome.stderr.is_empty() {
        eprint!("{}", outcome.stderr);
    }

    info!(
        phase = ?outcome.phase,
        exit_code = outcome.exit_code,
        killed = ?outcome.killed_reason,
        wall_time = format_args!("{}ms", outcome.wall_time_ms),
        "execution result"
    );

    match classify_outcome(&outcome, &request) {
        None => Ok(()),
        Some(error) => {
            eprintln!("{}", error.message);
            std::process::exit(if outcome.exit_code != 0 {
                outcome.exit_code
            } else {
                1
            });
        }
    }
}

fn list_languages(config: &Config) {
    println!("Available languages:\n");

    for (id, lang) in &config.languages {
        let lang_type = if lang.is_compiled() {
            "compiled"
        } else {
            "interpreted"
        };
        println!("  {:<10} {} ({}, {})", id, lang.name, lang_type, lang.image);
    }
}

fn show_config(config: &Config, cli: &Cli) {
    println!("Default resource limits:");
    println!("  Time limit: {:?} s", config.default_limits.time_limit);
    println!("  Memory limit: {:?} MB", config.default_limits.memory_limit);
    println!("  Compile time limit: {} s", config.compile_time_limit);
    println!();
    println!("Container engine: {}", config.docker_binary().display());
    println!("  CPUs: {}", config.cpus);
    println!("  Max processes: {}", config.max_processes);
    println!(
        "  Scratch: {} ({} MB tmpfs)",
        config.scratch_dir, config.scratch_size_mb
    );
    match config.max_concurrent {
        Some(n) => println!("  Max concurrent containers: {n}"),
        None => println!("  Max concurrent containers: unlimited"),
    }
    println!();
    println!("Batch policy: {:?}", config.policy);
    match cli.remote.as_ref().or(config.remote.as_ref().map(|r| &r.url)) {
        Some(url) => println!("Remote service: {url}"),
        None => println!("Remote service: none"),
    }
    println!();
    println!("Languages configured: {}", config.languages.len());
}

async fn init_config(output: &Path, force: bool) -> Result<()> {
    if output.exists() && !force {
        anyhow::bail!(
            "Configuration file already exists at '{}'. Use --force to overwrite.",
            output.display()
        );
    }

    tokio::fs::write(output, EXAMPLE_CONFIG)
        .await
        .context("failed to write configuration file")?;

    println!("Created configuration file at '{}'", output.display());
    Ok(())
}
