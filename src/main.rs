//! Attest Build CLI
//!
//! Entry point for the `attest-build` command-line tool.

use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::process;

use attest_build::build::config::{BackendKind, BuildVariant, CompilerFamily};
use attest_build::config::{CliOverrides, Settings};
use attest_build::decision::TerminalDecisions;
use attest_build::pipeline::{self, BuildPipeline, PipelineError, PipelineResult, VerifyGate};
use attest_build::process::SystemLauncher;
use attest_build::session::SessionContext;
use attest_build::signal::SignalHandler;
use attest_build::trust::SignatureLayout;
use clap::{Parser, Subcommand};
use tracing::{debug, warn};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

/// Log filter variable
const LOG_ENV: &str = "ATTEST_LOG";

#[derive(Parser)]
#[command(name = "attest-build")]
#[command(about = "Interactive native build driver with signed-manifest verification", version)]
struct Cli {
    /// Debug-level logging
    #[arg(long, short = 'v', global = true)]
    verbose: bool,

    /// Repo config file (default: <source>/.attest/build.toml)
    #[arg(long, short = 'c', global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Resolve tools, build with operator-driven retries, then verify the artifact
    Build {
        /// Source directory
        #[arg(long, default_value = ".")]
        source: PathBuf,

        #[arg(long)]
        variant: Option<BuildVariant>,

        #[arg(long)]
        compiler: Option<CompilerFamily>,

        #[arg(long)]
        backend: Option<BackendKind>,

        /// Parallel jobs passed to the backend
        #[arg(long, short = 'j')]
        jobs: Option<u32>,

        /// Artifact file name inside the build directory
        #[arg(long)]
        artifact: Option<String>,

        #[arg(long)]
        trust_anchor: Option<PathBuf>,

        /// Verify without asking
        #[arg(long, conflicts_with = "no_verify")]
        yes_verify: bool,

        /// Skip verification without asking
        #[arg(long)]
        no_verify: bool,

        /// Use the configured variant, compiler and backend without prompting
        #[arg(long)]
        non_interactive_config: bool,
    },

    /// Verify an artifact against the signed manifests
    Verify {
        #[arg(long)]
        artifact: PathBuf,

        #[arg(long)]
        signature_dir: Option<PathBuf>,

        #[arg(long)]
        trust_anchor: Option<PathBuf>,
    },

    /// Check both manifest signatures without an artifact
    Authenticate {
        #[arg(long)]
        signature_dir: Option<PathBuf>,

        #[arg(long)]
        trust_anchor: Option<PathBuf>,
    },

    /// Generate SHA256SUMS and BLAKE2BSUMS for a source tree
    Manifest {
        #[arg(long)]
        source: PathBuf,

        /// Signature directory to write into (default: <source>/signature)
        #[arg(long)]
        out: Option<PathBuf>,

        /// File extensions to include, case-insensitive (repeatable)
        #[arg(long = "ext")]
        extensions: Vec<String>,
    },

    /// Generate a release signing key and its trust anchor
    Keygen {
        #[arg(long)]
        out: PathBuf,
    },

    /// Write detached signatures for both manifests
    Sign {
        /// Armored secret key from `keygen`
        #[arg(long)]
        key: PathBuf,

        #[arg(long)]
        signature_dir: Option<PathBuf>,
    },

    /// Print both digests of a file
    Hash { file: PathBuf },
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let code = match run(cli) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("error: {}", e);
            e.exit_code()
        }
    };
    process::exit(code);
}

fn init_logging(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("info"))
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(io::stderr)
                .with_target(false)
                .without_time(),
        )
        .init();
}

/// Relative CLI paths are taken from the current directory
fn absolute(path: PathBuf) -> io::Result<PathBuf> {
    if path.is_absolute() {
        Ok(path)
    } else {
        Ok(std::env::current_dir()?.join(path))
    }
}

fn absolute_opt(path: Option<PathBuf>) -> io::Result<Option<PathBuf>> {
    path.map(absolute).transpose()
}

fn run(cli: Cli) -> PipelineResult<i32> {
    let config = absolute_opt(cli.config)?;
    let mut stdout = io::stdout().lock();

    match cli.command {
        Commands::Build {
            source,
            variant,
            compiler,
            backend,
            jobs,
            artifact,
            trust_anchor,
            yes_verify,
            no_verify,
            non_interactive_config,
        } => {
            let source = absolute(source)?;
            let overrides = CliOverrides {
                variant,
                compiler,
                backend,
                parallel: jobs,
                interactive_config: non_interactive_config.then_some(false),
                artifact_name: artifact,
                signature_dir: None,
                trust_anchor: absolute_opt(trust_anchor)?,
            };
            let (effective, settings) = Settings::load(&source, config.as_deref(), &overrides)?;
            debug!(?settings, "resolved settings");

            let gate = match (yes_verify, no_verify) {
                (true, _) => VerifyGate::Always,
                (_, true) => VerifyGate::Never,
                _ => VerifyGate::Ask,
            };

            let handler = SignalHandler::new();
            if let Err(e) = handler.install() {
                warn!(error = %e, "could not install interrupt handler");
            }

            let probe = settings.probe();
            let ctx = SessionContext::from_process(&source);
            let pipeline = BuildPipeline::new(settings, &source)
                .with_verify_gate(gate)
                .with_interrupt(handler.state())
                .with_effective_config(effective);

            let mut decisions = TerminalDecisions::new(io::stdin().lock(), io::stderr());
            let outcome = pipeline.run(ctx, Box::new(probe), &mut decisions, &mut SystemLauncher, &mut stdout)?;
            Ok(outcome.exit_code())
        }

        Commands::Verify {
            artifact,
            signature_dir,
            trust_anchor,
        } => {
            let (settings, ctx) = verification_settings(config.as_deref(), signature_dir, trust_anchor)?;
            let layout = SignatureLayout::new(&settings.signature_dir).with_trust_anchor(&settings.trust_anchor);
            let mut keyring = pipeline::open_keyring(&settings, &ctx)?;
            let report = pipeline::verify_artifact(&absolute(artifact)?, layout, keyring.as_mut(), &mut stdout)?;
            Ok(if report.passed() { 0 } else { 1 })
        }

        Commands::Authenticate {
            signature_dir,
            trust_anchor,
        } => {
            let (settings, ctx) = verification_settings(config.as_deref(), signature_dir, trust_anchor)?;
            let layout = SignatureLayout::new(&settings.signature_dir).with_trust_anchor(&settings.trust_anchor);
            let mut keyring = pipeline::open_keyring(&settings, &ctx)?;
            let report = pipeline::authenticate(layout, keyring.as_mut(), &mut stdout)?;
            Ok(if report.passed() { 0 } else { 1 })
        }

        Commands::Manifest {
            source,
            out,
            extensions,
        } => {
            let source = absolute(source)?;
            let out = match out {
                Some(dir) => absolute(dir)?,
                None => source.join(attest_build::config::DEFAULT_SIGNATURE_DIR),
            };
            let generated = pipeline::write_manifests(&source, &out, &extensions)?;
            writeln!(
                stdout,
                "Wrote manifests for {} files to {}",
                generated.file_count(),
                out.display()
            )?;
            Ok(0)
        }

        Commands::Keygen { out } => {
            let (secret, public, fingerprint) = pipeline::generate_keypair(&absolute(out)?)?;
            writeln!(stdout, "Secret key:   {}", secret.display())?;
            writeln!(stdout, "Trust anchor: {}", public.display())?;
            writeln!(stdout, "Fingerprint:  {}", fingerprint)?;
            Ok(0)
        }

        Commands::Sign { key, signature_dir } => {
            let dir = match signature_dir {
                Some(dir) => absolute(dir)?,
                None => absolute(PathBuf::from(attest_build::config::DEFAULT_SIGNATURE_DIR))?,
            };
            for path in pipeline::sign_manifests(&absolute(key)?, &dir)? {
                writeln!(stdout, "Signed {}", path.display())?;
            }
            Ok(0)
        }

        Commands::Hash { file } => {
            pipeline::hash_file(&file, &mut stdout)?;
            Ok(0)
        }
    }
}

/// Settings for `verify` and `authenticate`, with the current directory as source
fn verification_settings(
    config: Option<&Path>,
    signature_dir: Option<PathBuf>,
    trust_anchor: Option<PathBuf>,
) -> Result<(Settings, SessionContext), PipelineError> {
    let source = std::env::current_dir()?;
    let overrides = CliOverrides {
        signature_dir: absolute_opt(signature_dir)?,
        trust_anchor: absolute_opt(trust_anchor)?,
        ..Default::default()
    };
    let (_, settings) = Settings::load(&source, config, &overrides)?;
    let ctx = SessionContext::from_process(&source);
    Ok((settings, ctx))
}
