use assert_cmd::prelude::*;
use predicates::prelude::*;
use std::fs;
use std::process::Command;
use tempfile::tempdir;

use assetport::crypto::{self, CipherOptions};

const PLAIN: &[u8] = b"UnityFS\x00\x00\x00\x00\x06golden bundle payload 0123456789";

#[test]
fn test_cli_decrypt_cycle() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempdir()?;
    let sealed_path = dir.path().join("sealed.bundle");
    let out_path = dir.path().join("plain.bundle");
    let sealed = crypto::encrypt(PLAIN, "password", b"salt", CipherOptions::default())?;
    fs::write(&sealed_path, &sealed)?;

    let mut cmd = Command::cargo_bin("assetport")?;
    cmd.arg("decrypt")
        .arg(&sealed_path)
        .arg("--output")
        .arg(&out_path)
        .arg("--password")
        .arg("password")
        .arg("--salt")
        .arg("salt");
    cmd.assert()
        .success()
        .stdout(predicate::str::contains(format!("({} bytes)", PLAIN.len())));

    assert_eq!(fs::read(&out_path)?, PLAIN);
    Ok(())
}

#[test]
fn test_cli_decrypt_password_from_env() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempdir()?;
    let sealed_path = dir.path().join("sealed.bundle");
    let out_path = dir.path().join("plain.bundle");
    let options = CipherOptions {
        key_length: 16,
        iterations: 5,
    };
    fs::write(&sealed_path, crypto::encrypt(PLAIN, "from-env", b"pepper", options)?)?;

    let mut cmd = Command::cargo_bin("assetport")?;
    cmd.env("ASSETPORT_PASSWORD", "from-env")
        .arg("decrypt")
        .arg(&sealed_path)
        .arg("-o")
        .arg(&out_path)
        .args(["--salt", "pepper", "--key-length", "16", "--iterations", "5"]);
    cmd.assert().success();

    assert_eq!(fs::read(&out_path)?, PLAIN);
    Ok(())
}

#[test]
fn test_cli_decrypt_wrong_password_refuses_to_write() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempdir()?;
    let sealed_path = dir.path().join("sealed.bundle");
    let out_path = dir.path().join("plain.bundle");
    fs::write(
        &sealed_path,
        crypto::encrypt(PLAIN, "password", b"salt", CipherOptions::default())?,
    )?;

    let mut cmd = Command::cargo_bin("assetport")?;
    cmd.env_remove("ASSETPORT_PASSWORD")
        .arg("decrypt")
        .arg(&sealed_path)
        .arg("-o")
        .arg(&out_path)
        .args(["--password", "nope", "--salt", "salt"]);
    cmd.assert()
        .failure()
        .stderr(predicate::str::contains("--force"));
    assert!(!out_path.exists());

    // --force writes the garbage anyway.
    let mut cmd = Command::cargo_bin("assetport")?;
    cmd.arg("decrypt")
        .arg(&sealed_path)
        .arg("-o")
        .arg(&out_path)
        .args(["--password", "nope", "--salt", "salt", "--force"]);
    cmd.assert().success();
    assert_eq!(fs::read(&out_path)?.len(), PLAIN.len());
    Ok(())
}

#[test]
fn test_cli_missing_password_fails() -> Result<(), Box<dyn std::error::Error>> {
    let mut cmd = Command::cargo_bin("assetport")?;
    cmd.env_remove("ASSETPORT_PASSWORD")
        .args(["derive-key", "--salt", "salt"]);
    cmd.assert()
        .failure()
        .stderr(predicate::str::contains("ASSETPORT_PASSWORD"));
    Ok(())
}

#[test]
fn test_cli_derive_key_prints_hex() -> Result<(), Box<dyn std::error::Error>> {
    let mut cmd = Command::cargo_bin("assetport")?;
    cmd.args(["derive-key", "--password", "password", "--salt", "salt", "--key-length", "16", "--iterations", "2"]);
    cmd.assert()
        .success()
        .stdout("47e97e39e2b32b15eb9278e53f7bfca5\n");
    Ok(())
}

#[test]
fn test_cli_rejects_single_iteration() -> Result<(), Box<dyn std::error::Error>> {
    let mut cmd = Command::cargo_bin("assetport")?;
    cmd.args(["derive-key", "--password", "pw", "--salt", "salt", "--iterations", "1"]);
    cmd.assert()
        .failure()
        .stderr(predicate::str::contains("Invalid options"));
    Ok(())
}

#[test]
fn test_cli_probe_reports_plain_and_encrypted() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempdir()?;
    let plain_path = dir.path().join("plain.bundle");
    let sealed_path = dir.path().join("sealed.bundle");
    fs::write(&plain_path, PLAIN)?;
    fs::write(
        &sealed_path,
        crypto::encrypt(PLAIN, "password", b"salt", CipherOptions::default())?,
    )?;

    let mut cmd = Command::cargo_bin("assetport")?;
    cmd.arg("probe").arg(&plain_path).arg(&sealed_path);
    let expected_id = blake3::hash(PLAIN).to_hex().to_string();
    cmd.assert().success().stdout(
        predicate::str::contains(format!("{expected_id}\tplain\t{}", PLAIN.len()))
            .and(predicate::str::contains("\tencrypted\t")),
    );
    Ok(())
}

#[test]
fn test_cli_help_succeeds() -> Result<(), Box<dyn std::error::Error>> {
    let mut cmd = Command::cargo_bin("assetport")?;
    cmd.arg("--help");
    cmd.assert()
        .success()
        .stdout(predicate::str::contains("decrypt").and(predicate::str::contains("probe")));
    Ok(())
}
