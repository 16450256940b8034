use std::process::Command;

use assert_cmd::prelude::*;

fn espefuse() -> Command {
    let mut cmd = Command::cargo_bin("espefuse").unwrap();
    cmd.env_remove("ESPTOOL_CHIP")
        .env_remove("ESPTOOL_PORT")
        .env_remove("ESPTOOL_BAUD");
    cmd
}

#[test]
fn summary_of_emulated_chip() -> Result<(), Box<dyn std::error::Error>> {
    let output = espefuse()
        .args(["--chip", "esp32c3", "--virt", "summary"])
        .output()?;

    assert!(output.status.success());
    let stdout = String::from_utf8(output.stdout)?;
    assert!(stdout.contains("DIS_PAD_JTAG (BLOCK0)"));
    assert!(stdout.contains("Security fuses:"));

    Ok(())
}

#[test]
fn help_exits_successfully() {
    espefuse().arg("--help").assert().success();
    espefuse()
        .args(["--chip", "esp32", "burn-key", "--help"])
        .assert()
        .success();
}

#[test]
fn missing_operation_exits_with_one() {
    espefuse().args(["--chip", "esp32s2"]).assert().code(1);
}

#[test]
fn fatal_errors_exit_with_two() -> Result<(), Box<dyn std::error::Error>> {
    let output = espefuse().args(["--virt", "summary"]).output()?;

    assert_eq!(output.status.code(), Some(2));
    assert!(String::from_utf8(output.stderr)?.contains("A fatal error occurred"));

    espefuse()
        .args(["--chip", "esp32", "--virt", "frobnicate"])
        .assert()
        .code(2);

    Ok(())
}

#[test]
fn burned_values_survive_in_the_efuse_file() -> Result<(), Box<dyn std::error::Error>> {
    let dir = std::env::temp_dir().join(format!("espefuse-cli-{}", std::process::id()));
    std::fs::create_dir_all(&dir)?;
    let path = dir.join("esp32s3.bin");
    let _ = std::fs::remove_file(&path);

    espefuse()
        .args(["--chip", "esp32s3", "--virt", "--path-efuse-file"])
        .arg(&path)
        .args(["--do-not-confirm", "burn-efuse", "SECURE_VERSION", "0x5"])
        .assert()
        .success();

    let output = espefuse()
        .args(["--chip", "esp32s3", "--virt", "--path-efuse-file"])
        .arg(&path)
        .args(["summary", "SECURE_VERSION"])
        .output()?;

    assert!(output.status.success());
    assert!(String::from_utf8(output.stdout)?.contains("5 (0x5)"));

    std::fs::remove_dir_all(dir)?;
    Ok(())
}
