//! launchpad: build and release Flutter apps from a git reference.

use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};

use launchpad::core::artifact::{ArtifactKind, MatchResult, resolve_match};
use launchpad::core::retry::ThreadSleeper;
use launchpad::core::types::{CheckoutTarget, Lane, Platform, Strategy};
use launchpad::exit_codes;
use launchpad::io::config::{DEFAULT_CONFIG_FILE, PipelineConfig, load_config, write_config};
use launchpad::io::entry_point::{EntryPointLocator, best};
use launchpad::io::fs::StdFilesystem;
use launchpad::io::process::SystemProcessRunner;
use launchpad::io::store::{AppStoreOptions, PlayStoreOptions, ReleaseNotes};
use launchpad::logging;
use launchpad::pipeline::{BuildSpec, DeploySpec, Pipeline, SourceSpec};

#[derive(Parser)]
#[command(
    name = "launchpad",
    version,
    about = "Build and release Flutter apps from a git reference"
)]
struct Cli {
    /// Path to the pipeline configuration.
    #[arg(long, global = true, default_value = DEFAULT_CONFIG_FILE)]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Write a default configuration file.
    Init {
        /// Overwrite an existing file.
        #[arg(short, long)]
        force: bool,
    },
    /// Reconcile the working copy for a reference without building.
    Checkout(SourceArgs),
    /// Report the state of a repository's working copy.
    Status {
        /// Git remote URL.
        #[arg(long = "git")]
        remote: String,
    },
    /// Check out, bootstrap, and build the app. Prints the artifact path.
    Build(BuildArgs),
    /// Upload an artifact to its store, building it first if needed.
    Deploy(Box<DeployArgs>),
    /// Extract an artifact path or identifier from tool output.
    Resolve {
        #[arg(long, value_enum)]
        kind: ArtifactKind,
        /// Read output from this file instead of stdin.
        #[arg(long)]
        input: Option<PathBuf>,
    },
    /// List Flutter entry points under a directory.
    Locate {
        root: PathBuf,
    },
}

#[derive(Args)]
struct SourceArgs {
    /// Git remote URL.
    #[arg(long = "git")]
    remote: String,

    #[command(flatten)]
    target: TargetArgs,

    #[arg(long, value_enum, default_value_t = Strategy::Preserve)]
    strategy: Strategy,
}

#[derive(Args)]
#[group(multiple = false)]
struct TargetArgs {
    /// Branch to check out (default: main).
    #[arg(long)]
    branch: Option<String>,
    #[arg(long)]
    commit: Option<String>,
    #[arg(long)]
    tag: Option<String>,
}

impl TargetArgs {
    fn target(&self) -> CheckoutTarget {
        match (&self.commit, &self.tag, &self.branch) {
            (Some(commit), _, _) => CheckoutTarget::Commit(commit.clone()),
            (_, Some(tag), _) => CheckoutTarget::Tag(tag.clone()),
            (_, _, branch) => {
                CheckoutTarget::Branch(branch.clone().unwrap_or_else(|| "main".into()))
            }
        }
    }
}

impl SourceArgs {
    fn spec(&self) -> SourceSpec {
        SourceSpec {
            remote: self.remote.clone(),
            target: self.target.target(),
            strategy: self.strategy,
        }
    }
}

#[derive(Args)]
struct BuildArgs {
    #[command(flatten)]
    source: SourceArgs,

    #[arg(long, value_enum)]
    platform: Platform,

    #[arg(long)]
    flavor: Option<String>,

    /// Provisioning profile for iOS export.
    #[arg(long)]
    provisioning_profile: Option<String>,
}

impl BuildArgs {
    fn spec(&self) -> BuildSpec {
        BuildSpec {
            source: self.source.spec(),
            platform: self.platform,
            flavor: self.flavor.clone(),
            provisioning_profile: self.provisioning_profile.clone(),
        }
    }
}

#[derive(Args)]
struct DeployArgs {
    #[command(flatten)]
    build: BuildArgs,

    /// Prebuilt `.ipa` or `.aab`. Built from source when absent.
    #[arg(long)]
    build_file_path: Option<PathBuf>,

    #[arg(long, value_enum)]
    lane: Lane,

    /// JSON object of locale to text, e.g. '{"en-US":"Fixes"}'.
    #[arg(long)]
    release_notes: Option<String>,

    #[arg(long)]
    ios_api_key_id: Option<String>,
    #[arg(long)]
    ios_api_key_issuer_id: Option<String>,
    #[arg(long)]
    ios_api_key_path: Option<PathBuf>,
    #[arg(long)]
    ios_skip_binary_upload: bool,
    /// TestFlight groups.
    #[arg(long)]
    ios_groups: Option<String>,

    #[arg(long)]
    android_json_key_path: Option<PathBuf>,
    #[arg(long)]
    android_package_name: Option<String>,
    #[arg(long)]
    android_skip_upload_apk: bool,
    #[arg(long)]
    android_skip_upload_aab: bool,
    #[arg(long)]
    android_validate_only: bool,
}

impl DeployArgs {
    fn spec(&self) -> Result<DeploySpec> {
        let release_notes = match &self.release_notes {
            Some(json) => ReleaseNotes::parse(json)?,
            None => ReleaseNotes::default(),
        };
        Ok(DeploySpec {
            build: self.build.spec(),
            artifact: self.build_file_path.clone(),
            lane: self.lane,
            release_notes,
            app_store: AppStoreOptions {
                api_key_id: self.ios_api_key_id.clone(),
                api_key_issuer_id: self.ios_api_key_issuer_id.clone(),
                api_key_path: self.ios_api_key_path.clone(),
                skip_binary_upload: self.ios_skip_binary_upload,
                groups: self.ios_groups.clone(),
            },
            play_store: PlayStoreOptions {
                json_key_path: self.android_json_key_path.clone(),
                package_name: self.android_package_name.clone(),
                skip_upload_apk: self.android_skip_upload_apk,
                skip_upload_aab: self.android_skip_upload_aab,
                validate_only: self.android_validate_only,
            },
        })
    }
}

fn main() {
    logging::init();
    match run() {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("{err:#}");
            std::process::exit(exit_codes::FAILED);
        }
    }
}

type SystemPipeline<'a> = Pipeline<'a, SystemProcessRunner, StdFilesystem, ThreadSleeper>;

fn run() -> Result<i32> {
    let cli = Cli::parse();
    match &cli.command {
        Command::Init { force } => cmd_init(&cli.config, *force),
        Command::Resolve { kind, input } => cmd_resolve(*kind, input.as_deref()),
        Command::Locate { root } => cmd_locate(root),
        Command::Checkout(args) => with_pipeline(&cli.config, |pipeline| {
            let outcome = pipeline.checkout(&args.spec())?;
            println!("{}", outcome.path.display());
            Ok(())
        }),
        Command::Status { remote } => with_pipeline(&cli.config, |pipeline| {
            let (path, status) = pipeline.status(remote)?;
            println!("path: {}", path.display());
            println!("exists: {}", status.exists);
            println!("repository: {}", status.is_repo);
            println!("branch: {}", status.current_branch.as_deref().unwrap_or("-"));
            println!("remote: {}", status.remote_url.as_deref().unwrap_or("-"));
            Ok(())
        }),
        Command::Build(args) => with_pipeline(&cli.config, |pipeline| {
            let report = pipeline.build(&args.spec())?;
            println!("{}", report.artifact.display());
            Ok(())
        }),
        Command::Deploy(args) => {
            let spec = args.spec()?;
            with_pipeline(&cli.config, |pipeline| {
                let report = pipeline.deploy(&spec)?;
                println!("{} -> {}", report.artifact.display(), report.store);
                Ok(())
            })
        }
    }
}

/// Load config and run `f` against real processes and the real filesystem.
fn with_pipeline(
    config_path: &Path,
    f: impl FnOnce(&SystemPipeline<'_>) -> Result<()>,
) -> Result<i32> {
    let config = load_config(config_path)?;
    let runner = SystemProcessRunner::new(config.output_limit_bytes);
    let pipeline = Pipeline {
        runner: &runner,
        fs: &StdFilesystem,
        sleeper: &ThreadSleeper,
        config: &config,
    };
    f(&pipeline)?;
    Ok(exit_codes::OK)
}

fn cmd_init(path: &Path, force: bool) -> Result<i32> {
    if path.exists() && !force {
        println!("{} already exists (use --force to overwrite)", path.display());
        return Ok(exit_codes::OK);
    }
    write_config(path, &PipelineConfig::default())?;
    println!("wrote {}", path.display());
    Ok(exit_codes::OK)
}

fn cmd_resolve(kind: ArtifactKind, input: Option<&Path>) -> Result<i32> {
    let output = match input {
        Some(path) => fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?,
        None => {
            let mut buf = String::new();
            std::io::stdin()
                .read_to_string(&mut buf)
                .context("read stdin")?;
            buf
        }
    };
    match resolve_match(&output, kind) {
        MatchResult::Found { rule, value } => {
            tracing::debug!(rule, "matched");
            println!("{value}");
            Ok(exit_codes::OK)
        }
        MatchResult::NotFound => {
            eprintln!("no {kind} found");
            Ok(exit_codes::NOT_FOUND)
        }
    }
}

fn cmd_locate(root: &Path) -> Result<i32> {
    let candidates = EntryPointLocator.locate(root);
    if candidates.is_empty() {
        eprintln!("no entry points under {}", root.display());
        return Ok(exit_codes::NOT_FOUND);
    }
    let chosen = best(&candidates);
    for candidate in &candidates {
        let marker = if Some(candidate) == chosen { "*" } else { " " };
        println!(
            "{marker} {} ({}{})",
            candidate.file.display(),
            candidate.pattern,
            if candidate.has_launch_call { ", runApp" } else { "" }
        );
    }
    Ok(exit_codes::OK)
}
