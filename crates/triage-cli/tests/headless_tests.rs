// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use anyhow::Result;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};
use triage_testkit::{CannedResponse, MockService, seed_scenario_body, service_error_body};

const KEY_ENV: &str = "TRIAGE_HEADLESS_TEST_KEY";

fn write_config(dir: &Path, base_url: &str) -> Result<PathBuf> {
    let path = dir.join("config.toml");
    let log_file = dir.join("triage.log");
    std::fs::write(
        &path,
        format!(
            "version = 1\n[llm]\nbase_url = \"{base_url}\"\nmodel = \"gemini-test\"\napi_key_env = \"{KEY_ENV}\"\ntimeout = \"5s\"\n[log]\nfilter = \"debug\"\nfile = \"{}\"\n",
            log_file.display()
        ),
    )?;
    Ok(path)
}

fn run_triage(args: &[&str]) -> Result<Output> {
    Ok(Command::new(env!("CARGO_BIN_EXE_triage"))
        .args(args)
        .env(KEY_ENV, "headless-key")
        .env_remove("RUST_LOG")
        .env_remove("TRIAGE_CONFIG_PATH")
        .output()?)
}

#[test]
fn headless_prints_briefing_in_priority_order() -> Result<()> {
    let temp = tempfile::tempdir()?;
    let service = MockService::start(vec![CannedResponse::ok(seed_scenario_body())])?;
    let config = write_config(temp.path(), service.base_url())?;

    let output = run_triage(&["--config", &config.to_string_lossy(), "--headless"])?;
    let stdout = String::from_utf8(output.stdout)?;
    assert!(
        output.status.success(),
        "stderr: {}",
        String::from_utf8_lossy(&output.stderr)
    );

    let urgent = stdout.find("[Urgent (5)] ID: 3");
    let high = stdout.find("[High (4)] ID: 1");
    let low = stdout.find("[Low (1)] ID: 2");
    assert!(
        urgent.is_some() && high.is_some() && low.is_some(),
        "{stdout}"
    );
    assert!(urgent < high && high < low, "{stdout}");
    assert!(stdout.contains("from: Security Alerts  ·  subject: Unauthorized Login Attempt Detected"));

    let requests = service.finish()?;
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].api_key.as_deref(), Some("headless-key"));

    let log = std::fs::read_to_string(temp.path().join("triage.log"))?;
    assert!(log.contains("starting triage"));
    Ok(())
}

#[test]
fn headless_failure_reports_fixed_message_and_exits_nonzero() -> Result<()> {
    let temp = tempfile::tempdir()?;
    let service = MockService::start(vec![CannedResponse::status(
        400,
        service_error_body(400, "API key not valid. Please pass a valid API key."),
    )])?;
    let config = write_config(temp.path(), service.base_url())?;

    let output = run_triage(&["--config", &config.to_string_lossy(), "--headless"])?;
    let stderr = String::from_utf8(output.stderr)?;
    assert!(!output.status.success());
    assert!(stderr.contains("Failed to analyze emails. Please check your API configuration."));
    assert!(stderr.contains("API key not valid"));
    assert!(output.stdout.is_empty());

    service.finish()?;
    let log = std::fs::read_to_string(temp.path().join("triage.log"))?;
    assert!(log.contains("headless analysis failed"));
    Ok(())
}

#[test]
fn check_accepts_valid_config_without_calling_service() -> Result<()> {
    let temp = tempfile::tempdir()?;
    let config = write_config(temp.path(), "http://127.0.0.1:1/v1beta")?;

    let output = run_triage(&["--config", &config.to_string_lossy(), "--check"])?;
    assert!(
        output.status.success(),
        "stderr: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    Ok(())
}

#[test]
fn check_rejects_invalid_config() -> Result<()> {
    let temp = tempfile::tempdir()?;
    let path = temp.path().join("config.toml");
    std::fs::write(&path, "version = 1\n[llm]\ntimeout = \"fast\"\n")?;

    let output = run_triage(&["--config", &path.to_string_lossy(), "--check"])?;
    let stderr = String::from_utf8(output.stderr)?;
    assert!(!output.status.success());
    assert!(stderr.contains("llm.timeout"), "{stderr}");
    Ok(())
}

#[test]
fn print_example_config_emits_versioned_template() -> Result<()> {
    let output = run_triage(&["--print-example-config"])?;
    let stdout = String::from_utf8(output.stdout)?;
    assert!(output.status.success());
    assert!(stdout.contains("version = 1"));
    assert!(stdout.contains("api_key_env = \"API_KEY\""));
    Ok(())
}

#[test]
fn unknown_argument_points_to_help() -> Result<()> {
    let output = run_triage(&["--bogus"])?;
    let stderr = String::from_utf8(output.stderr)?;
    assert!(!output.status.success());
    assert!(stderr.contains("--help"));
    Ok(())
}
