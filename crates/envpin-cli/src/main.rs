mod commands;

use clap::{Parser, Subcommand, ValueEnum};
use clap_complete::Shell;
use commands::{
    Context, EXIT_FAILURE, EXIT_LOCK_CONFLICT, EXIT_MANIFEST_ERROR, EXIT_STORE_ERROR,
};
use envpin_core::{install_signal_handler, EnvpinConfig, ResolveOptions, ShellFormat};
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Debug, Parser)]
#[command(
    name = "envpin",
    version,
    about = "Reproducible toolchain environments pinned by manifest content"
)]
struct Cli {
    /// Path to the envpin store directory (overrides the config file).
    #[arg(long, global = true)]
    store: Option<PathBuf>,

    /// Path to the provider catalog snapshot (overrides the config file).
    #[arg(long, global = true)]
    catalog: Option<PathBuf>,

    /// Path to the config file.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Output results as structured JSON.
    #[arg(long, default_value_t = false, global = true)]
    json: bool,

    /// Enable verbose (debug) logging output.
    #[arg(short, long, default_value_t = false, global = true)]
    verbose: bool,

    /// Enable trace-level logging (more detailed than --verbose).
    #[arg(long, default_value_t = false, global = true)]
    trace: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Print the content hash of a manifest.
    Hash {
        /// Path to manifest TOML file.
        #[arg(default_value = "envpin.toml")]
        manifest: PathBuf,
    },
    /// Resolve a manifest, reusing its lock entry when one exists.
    Resolve {
        /// Path to manifest TOML file.
        #[arg(default_value = "envpin.toml")]
        manifest: PathBuf,
        /// Query the provider even when a lock entry exists and fail if it drifted.
        #[arg(long, default_value_t = false)]
        force_refresh: bool,
        /// Never query the provider; fail unless a lock entry exists.
        #[arg(long, default_value_t = false, conflicts_with = "force_refresh")]
        offline: bool,
    },
    /// Print the activation script for a manifest's environment.
    Activate {
        /// Path to manifest TOML file.
        #[arg(default_value = "envpin.toml")]
        manifest: PathBuf,
        /// Output format.
        #[arg(long, value_enum, default_value_t = FormatArg::Posix)]
        format: FormatArg,
        /// Never query the provider; fail unless a lock entry exists.
        #[arg(long, default_value_t = false)]
        offline: bool,
    },
    /// Run a command inside a manifest's environment.
    Run {
        /// Path to manifest TOML file.
        #[arg(long, short, default_value = "envpin.toml")]
        manifest: PathBuf,
        /// Never query the provider; fail unless a lock entry exists.
        #[arg(long, default_value_t = false)]
        offline: bool,
        /// Command and arguments to run.
        #[arg(required = true, last = true)]
        command: Vec<String>,
    },
    /// Show a lock entry.
    Inspect {
        /// Manifest hash (full or unique prefix).
        hash: String,
    },
    /// List all lock entries.
    List,
    /// Evict a lock entry so the next resolve queries the provider again.
    Forget {
        /// Manifest hash (full or unique prefix).
        hash: String,
    },
    /// Verify the checksum of every lock entry.
    VerifyStore,
    /// Generate shell completions for bash, zsh, fish, elvish, or powershell.
    Completions {
        /// Shell to generate completions for.
        shell: Shell,
    },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum FormatArg {
    Posix,
    Fish,
    Dotenv,
    Json,
}

impl From<FormatArg> for ShellFormat {
    fn from(value: FormatArg) -> Self {
        match value {
            FormatArg::Posix => ShellFormat::Posix,
            FormatArg::Fish => ShellFormat::Fish,
            FormatArg::Dotenv => ShellFormat::Dotenv,
            FormatArg::Json => ShellFormat::Json,
        }
    }
}

fn main() -> ExitCode {
    let default_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        let msg = info.to_string();
        if msg.contains("Broken pipe")
            || msg.contains("broken pipe")
            || msg.contains("os error 32")
            || msg.contains("failed printing to stdout")
        {
            std::process::exit(0);
        }
        default_hook(info);
    }));

    let cli = Cli::parse();

    let default_level = if cli.trace {
        "trace"
    } else if cli.verbose {
        "debug"
    } else {
        "warn"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_env("ENVPIN_LOG")
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level)),
        )
        .with_target(false)
        .without_time()
        .with_writer(std::io::stderr)
        .init();

    install_signal_handler();

    let result = run(cli);

    match result {
        Ok(code) => ExitCode::from(code),
        Err(msg) => {
            eprintln!("error: {msg}");
            ExitCode::from(exit_code_for(&msg))
        }
    }
}

fn run(cli: Cli) -> Result<u8, String> {
    let json = cli.json;
    if let Commands::Completions { shell } = cli.command {
        return commands::completions::run::<Cli>(shell);
    }
    if let Commands::Hash { manifest } = &cli.command {
        return commands::hash::run(manifest, json);
    }

    let config = match &cli.config {
        Some(path) => EnvpinConfig::load(path),
        None => EnvpinConfig::load_default(),
    }
    .map_err(|e| e.to_string())?;
    let ctx = Context::new(&config, cli.store.as_deref(), cli.catalog.as_deref(), json)?;

    match cli.command {
        Commands::Resolve {
            manifest,
            force_refresh,
            offline,
        } => commands::resolve::run(
            &ctx,
            &manifest,
            ResolveOptions {
                force_refresh,
                offline,
            },
        ),
        Commands::Activate {
            manifest,
            format,
            offline,
        } => commands::activate::run(&ctx, &manifest, format.into(), offline),
        Commands::Run {
            manifest,
            offline,
            command,
        } => commands::run::run(&ctx, &manifest, offline, &command),
        Commands::Inspect { hash } => commands::inspect::run(&ctx, &hash),
        Commands::List => commands::list::run(&ctx),
        Commands::Forget { hash } => commands::forget::run(&ctx, &hash),
        Commands::VerifyStore => commands::verify_store::run(&ctx),
        Commands::Hash { .. } | Commands::Completions { .. } => Ok(commands::EXIT_SUCCESS),
    }
}

fn exit_code_for(msg: &str) -> u8 {
    if msg.starts_with("manifest error:")
        || msg.starts_with("failed to parse manifest")
        || msg.starts_with("failed to read manifest")
    {
        EXIT_MANIFEST_ERROR
    } else if msg.starts_with("lock conflict") {
        EXIT_LOCK_CONFLICT
    } else if msg.starts_with("store error:") || msg.starts_with("store lock:") {
        EXIT_STORE_ERROR
    } else {
        EXIT_FAILURE
    }
}
