use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::crypto::{DEFAULT_ITERATIONS, DEFAULT_KEY_LENGTH};

pub const PASSWORD_ENV: &str = "ASSETPORT_PASSWORD";

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Clone, Debug)]
pub enum Commands {
    /// Decrypt a counter-mode encrypted bundle.
    #[command(alias = "d")]
    Decrypt {
        /// The encrypted bundle file.
        #[arg(required = true)]
        input: PathBuf,

        /// Where to write the decrypted bundle.
        #[arg(short, long)]
        output: PathBuf,

        /// Password for key derivation. If not provided, read from ASSETPORT_PASSWORD.
        #[arg(long)]
        password: Option<String>,

        /// Salt for key derivation (used as raw UTF-8 bytes).
        #[arg(long)]
        salt: String,

        /// Derived key length in bytes (16, 24 or 32).
        #[arg(long, default_value_t = DEFAULT_KEY_LENGTH)]
        key_length: usize,

        /// Key schedule iteration count (at least 2).
        #[arg(long, default_value_t = DEFAULT_ITERATIONS)]
        iterations: u32,

        /// Write the output even if it does not look like a bundle.
        #[arg(long)]
        force: bool,
    },

    /// Print the derived key as lowercase hex.
    DeriveKey {
        /// Password for key derivation. If not provided, read from ASSETPORT_PASSWORD.
        #[arg(long)]
        password: Option<String>,

        /// Salt for key derivation (used as raw UTF-8 bytes).
        #[arg(long)]
        salt: String,

        /// Derived key length in bytes.
        #[arg(long, default_value_t = DEFAULT_KEY_LENGTH)]
        key_length: usize,

        /// Key schedule iteration count (at least 2).
        #[arg(long, default_value_t = DEFAULT_ITERATIONS)]
        iterations: u32,
    },

    /// Report the content id of each file and whether it is stored in the clear.
    #[command(alias = "p")]
    Probe {
        /// One or more bundle files.
        #[arg(required = true)]
        inputs: Vec<PathBuf>,
    },
}

/// Gets the password from the command-line option or the `ASSETPORT_PASSWORD` environment variable.
///
/// Priority:
/// 1. `--password` command-line argument.
/// 2. `ASSETPORT_PASSWORD` environment variable.
/// 3. Returns `None` if neither is present.
pub fn get_password_from_opt_or_env(password_opt: Option<String>) -> Option<String> {
    password_opt.or_else(|| std::env::var(PASSWORD_ENV).ok())
}

/// Parses command-line arguments using `clap` and returns the command to execute.
pub fn run() -> Result<Commands, Box<dyn std::error::Error>> {
    let args = Args::try_parse()?;
    Ok(args.command)
}
