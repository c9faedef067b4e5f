//! envseal - Encrypted credentials for env files
//!
//! Usage:
//!   envseal encrypt --key <NAME> --value <SECRET>  - Print an encrypted KEY=VALUE line
//!   envseal decrypt --encrypted <ENVELOPE>         - Print the plaintext of an envelope
//!   envseal batch --file <.env>                    - Encrypt known credentials in a file
//!   envseal generate                               - Generate a master password
//!   envseal resolve --name <NAME>                  - Resolve a credential like the application does

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use envseal::{
    batch::{self, BatchOptions},
    config::Config,
    crypto,
    passphrase::generate_passphrase,
    source::{parse_line, CredentialSource, EnvFileSource, EnvSource, LayeredSource},
    store::CredentialStore,
};
use std::io::IsTerminal;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, error, info, warn, Level};
use tracing_subscriber::{EnvFilter, FmtSubscriber};
use zeroize::Zeroizing;

#[derive(Parser)]
#[command(name = "envseal")]
#[command(author = "envseal Contributors")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Password-based encryption for credentials in env files")]
struct Cli {
    /// Configuration file path (YAML or JSON)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Encrypt one credential value
    Encrypt {
        /// Credential name, printed with the configured prefix
        #[arg(short, long)]
        key: String,

        /// Plaintext value
        #[arg(long)]
        value: String,

        /// Override the name prefix
        #[arg(long)]
        prefix: Option<String>,

        #[command(flatten)]
        password: PasswordArgs,
    },

    /// Decrypt an envelope (bare JSON or KEY=JSON)
    Decrypt {
        /// Encrypted value
        #[arg(short, long)]
        encrypted: String,

        #[command(flatten)]
        password: PasswordArgs,
    },

    /// Encrypt every known credential in an env file
    Batch {
        /// Source env file
        #[arg(short, long)]
        file: PathBuf,

        /// Destination (defaults to the source name with .env.encrypted)
        #[arg(short, long)]
        output: Option<PathBuf>,

        #[command(flatten)]
        password: PasswordArgs,
    },

    /// Generate a random master password
    Generate,

    /// Resolve a credential from the environment and an optional env file
    Resolve {
        /// Credential name
        #[arg(short, long)]
        name: String,

        /// Env file consulted after the process environment
        #[arg(long)]
        env_file: Option<PathBuf>,
    },
}

#[derive(Args)]
struct PasswordArgs {
    /// Master password
    #[arg(short, long)]
    password: Option<String>,

    /// Read the master password from a file
    #[arg(long, conflicts_with = "password")]
    password_file: Option<PathBuf>,
}

fn main() {
    let cli = Cli::parse();

    let config_path = cli
        .config
        .as_deref()
        .map(expand_tilde)
        .unwrap_or_else(Config::default_path);
    let config = load_config(&config_path);

    // Setup logging
    let log_level = if cli.verbose {
        "debug".to_string()
    } else {
        config
            .as_ref()
            .map(|c| c.logging.level.clone())
            .unwrap_or_else(|_| "info".to_string())
    };
    init_logging(&log_level);

    let result = config.and_then(|config| run_command(cli.command, &config));
    if let Err(e) = result {
        error!("Error: {:#}", e);
        if !tracing::enabled!(Level::ERROR) {
            eprintln!("Error: {:#}", e);
        }
        std::process::exit(1);
    }
}

fn init_logging(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .with_ansi(std::io::stderr().is_terminal())
        .finish();

    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to set subscriber: {}", e);
    }
}

/// The config file when it exists, otherwise defaults plus environment
fn load_config(path: &Path) -> anyhow::Result<Config> {
    let config = if path.exists() {
        Config::load(path).with_context(|| format!("Failed to load config {:?}", path))?
    } else {
        Config::from_env()?
    };
    Ok(config)
}

fn run_command(command: Commands, config: &Config) -> anyhow::Result<()> {
    match command {
        Commands::Encrypt {
            key,
            value,
            prefix,
            password,
        } => cmd_encrypt(config, &key, &value, prefix, &password),
        Commands::Decrypt {
            encrypted,
            password,
        } => cmd_decrypt(config, &encrypted, &password),
        Commands::Batch {
            file,
            output,
            password,
        } => cmd_batch(config, &file, output, &password),
        Commands::Generate => cmd_generate(config),
        Commands::Resolve { name, env_file } => cmd_resolve(config, &name, env_file),
    }
}

fn cmd_encrypt(
    config: &Config,
    key: &str,
    value: &str,
    prefix: Option<String>,
    password: &PasswordArgs,
) -> anyhow::Result<()> {
    let passphrase = read_passphrase(password, config)?;
    let envelope = crypto::encrypt(value, &passphrase)?;

    let prefix = prefix.unwrap_or_else(|| config.batch.key_prefix.clone());
    let name = if key.starts_with(&prefix) {
        key.to_string()
    } else {
        format!("{}{}", prefix, key)
    };

    println!("{}={}", name, envelope.encode()?);
    Ok(())
}

fn cmd_decrypt(config: &Config, encrypted: &str, password: &PasswordArgs) -> anyhow::Result<()> {
    let text = envelope_text(encrypted);
    let passphrase = read_passphrase(password, config)?;

    let plaintext = crypto::decrypt_text(text, &passphrase).context("Failed to decrypt value")?;
    println!("{}", plaintext.as_str());
    Ok(())
}

/// Strip a `KEY=` prefix from a line printed by `encrypt`
fn envelope_text(input: &str) -> &str {
    let trimmed = input.trim();
    if trimmed.starts_with('{') {
        return trimmed;
    }
    parse_line(trimmed)
        .map(|(_, value)| value.trim())
        .unwrap_or(trimmed)
}

fn cmd_batch(
    config: &Config,
    file: &Path,
    output: Option<PathBuf>,
    password: &PasswordArgs,
) -> anyhow::Result<()> {
    let passphrase = read_passphrase(password, config)?;
    let options = BatchOptions::from_config(&config.batch);

    info!("Encrypting credentials in {:?}", file);
    let outcome = batch::batch_encrypt(file, &passphrase, output.as_deref(), &options)
        .with_context(|| format!("Batch encryption of {:?} failed", file))?;

    println!(
        "Encrypted {} credential(s) into {}",
        outcome.report.encrypted.len(),
        outcome.output_path.display()
    );
    for key in &outcome.report.encrypted {
        println!("  {}", key);
    }

    if outcome.report.has_failures() {
        warn!(
            "{} credential(s) left unencrypted",
            outcome.report.failed.len()
        );
        for failure in &outcome.report.failed {
            eprintln!(
                "  line {}: {} ({})",
                failure.line, failure.key, failure.reason
            );
        }
    }

    Ok(())
}

fn cmd_generate(config: &Config) -> anyhow::Result<()> {
    let passphrase = Zeroizing::new(generate_passphrase());

    println!("Generated master password:");
    println!("{}", passphrase.as_str());
    println!();
    println!("Add it to your deployment environment (never commit it):");
    println!("{}={}", config.passphrase.master_var, passphrase.as_str());
    Ok(())
}

fn cmd_resolve(config: &Config, name: &str, env_file: Option<PathBuf>) -> anyhow::Result<()> {
    let mut source = LayeredSource::new().with(EnvSource);
    if let Some(path) = env_file {
        let path = expand_tilde(&path);
        let file = EnvFileSource::load(&path)
            .with_context(|| format!("Failed to read env file {:?}", path))?;
        debug!("Loaded {} entries from {:?}", file.len(), path);
        source = source.with(file);
    }

    let store = CredentialStore::new(config.clone(), Arc::new(source))?;

    let runtime = tokio::runtime::Runtime::new()?;
    let value = runtime.block_on(store.get_credential(name))?;

    println!("{}", value.as_str());
    Ok(())
}

/// Passphrase from the flag, the file, the environment, or a prompt
fn read_passphrase(args: &PasswordArgs, config: &Config) -> anyhow::Result<Zeroizing<String>> {
    let passphrase = if let Some(password) = &args.password {
        Zeroizing::new(password.clone())
    } else if let Some(path) = &args.password_file {
        let path = expand_tilde(path);
        let content = Zeroizing::new(
            std::fs::read_to_string(&path)
                .with_context(|| format!("Failed to read password file {:?}", path))?,
        );
        Zeroizing::new(content.trim().to_string())
    } else if let Some(password) = EnvSource.lookup(&config.passphrase.master_var) {
        debug!("Using master password from {}", config.passphrase.master_var);
        Zeroizing::new(password)
    } else {
        Zeroizing::new(
            rpassword::prompt_password("Enter master password: ")
                .context("Failed to read master password")?,
        )
    };

    if passphrase.is_empty() {
        warn!("Empty master password; anyone can decrypt these values");
    }
    Ok(passphrase)
}

/// Expand ~ to home directory
fn expand_tilde(path: &Path) -> PathBuf {
    if let Ok(rest) = path.strip_prefix("~") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    path.to_path_buf()
}
