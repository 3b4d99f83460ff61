use std::error::Error;
use std::process::Command;

use assert_cmd::prelude::*;
use predicates::prelude::*;

#[test]
fn test_file_missing() -> Result<(), Box<dyn Error>> {
    let mut cmd = Command::cargo_bin("mzmultiplexer")?;
    cmd.arg("not_real.mzML").arg("-o").arg("-");
    cmd.assert().failure();
    Ok(())
}

#[test]
fn test_unknown_label() -> Result<(), Box<dyn Error>> {
    let mut cmd = Command::cargo_bin("mzmultiplexer")?;
    cmd.arg("not_real.mzML")
        .arg("--labels")
        .arg("[][Lys9]")
        .env("RUST_LOG", "error");
    cmd.assert()
        .failure()
        .stderr(predicate::str::contains("Lys9"));
    Ok(())
}

#[test]
fn test_mixed_labelling_rejected() -> Result<(), Box<dyn Error>> {
    let mut cmd = Command::cargo_bin("mzmultiplexer")?;
    cmd.arg("not_real.mzML")
        .arg("--labels")
        .arg("[Lys8][ICPL6]")
        .env("RUST_LOG", "error");
    cmd.assert()
        .failure()
        .stderr(predicate::str::contains("labelling"));
    Ok(())
}

#[test]
fn test_malformed_charge_range() -> Result<(), Box<dyn Error>> {
    let mut cmd = Command::cargo_bin("mzmultiplexer")?;
    cmd.arg("not_real.mzML")
        .arg("--charge")
        .arg("abc")
        .env("RUST_LOG", "error");
    cmd.assert()
        .failure()
        .stderr(predicate::str::contains("min:max"));
    Ok(())
}
