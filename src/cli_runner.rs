//! CLI command execution, shared by the binary and the integration tests.

use std::fs;
use std::io::{self, Write};

use tracing::info;

use crate::cli::{self, Commands};
use crate::common::BundleId;
use crate::crypto::{self, CipherOptions};
use crate::error::AssetError;

fn require_password(password: Option<String>) -> Result<String, AssetError> {
    cli::get_password_from_opt_or_env(password).ok_or_else(|| {
        AssetError::InvalidOptions(format!("a password is required (--password or {})", cli::PASSWORD_ENV))
    })
}

/// Public entry for running CLI logic.
pub fn run_cli_app() -> Result<(), Box<dyn std::error::Error>> {
    let command = cli::run()?;
    run_command(command, &mut io::stdout().lock())
}

/// Executes one parsed command, writing user-facing output to `out`.
pub fn run_command(command: Commands, out: &mut dyn Write) -> Result<(), Box<dyn std::error::Error>> {
    match command {
        Commands::Decrypt {
            input,
            output,
            password,
            salt,
            key_length,
            iterations,
            force,
        } => {
            let password = require_password(password)?;
            let ciphertext = fs::read(&input)?;
            let options = CipherOptions { key_length, iterations };
            let plaintext = crypto::decrypt(&ciphertext, &password, salt.as_bytes(), options)?;

            if !crypto::is_plain_bundle(&plaintext) && !force {
                return Err(AssetError::Decryption(format!(
                    "{} did not decrypt to a known bundle signature (wrong password or salt?); \
                     use --force to write anyway",
                    input.display()
                ))
                .into());
            }
            fs::write(&output, &plaintext)?;
            info!(input = %input.display(), output = %output.display(), bytes = plaintext.len(), "decrypted");
            writeln!(out, "{} -> {} ({} bytes)", input.display(), output.display(), plaintext.len())?;
        }
        Commands::DeriveKey {
            password,
            salt,
            key_length,
            iterations,
        } => {
            let password = require_password(password)?;
            let key = crypto::derive_key(&password, salt.as_bytes(), key_length, iterations)?;
            let hex: String = key.iter().map(|b| format!("{b:02x}")).collect();
            writeln!(out, "{hex}")?;
        }
        Commands::Probe { inputs } => {
            for path in inputs {
                let bytes = fs::read(&path)?;
                let state = if crypto::is_plain_bundle(&bytes) { "plain" } else { "encrypted" };
                writeln!(out, "{}\t{}\t{}\t{}", path.display(), BundleId::of(&bytes), state, bytes.len())?;
            }
        }
    }

    Ok(())
}
