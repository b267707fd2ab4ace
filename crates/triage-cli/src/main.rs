// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

mod config;
mod runtime;

use anyhow::{Context, Result};
use config::Config;
use runtime::LlmRuntime;
use std::env;
use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::PathBuf;
use time::OffsetDateTime;
use time::macros::format_description;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};
use triage_app::{ANALYSIS_FAILED_MESSAGE, AppState, DisplayResult, RecordStore, merge_results};

fn main() {
    if let Err(error) = run() {
        eprintln!("{error:#}");
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let options = parse_cli_args(env::args().skip(1), Config::default_path()?)?;
    if options.show_help {
        print_help();
        return Ok(());
    }

    if options.print_config_path {
        println!("{}", options.config_path.display());
        return Ok(());
    }

    if options.print_example {
        print!("{}", Config::example_config(&options.config_path));
        return Ok(());
    }

    let config = Config::load(&options.config_path).with_context(|| {
        format!(
            "load config {}; run `triage --print-example-config` to generate a template",
            options.config_path.display()
        )
    })?;

    let client = triage_llm::Client::new(config.client_config()?).with_context(|| {
        format!(
            "invalid [llm] config in {}; fix base_url/model/timeout values",
            options.config_path.display()
        )
    })?;
    if options.check_only {
        if !client.has_api_key() {
            eprintln!(
                "warning: ${} is not set; the service will reject requests",
                config.llm_api_key_env()
            );
        }
        return Ok(());
    }

    setup_logging(&config);
    tracing::info!(
        base_url = client.base_url(),
        model = client.model(),
        has_api_key = client.has_api_key(),
        "starting triage"
    );

    if options.headless {
        return run_headless(&client, &mut io::stdout().lock());
    }

    let mut state = AppState::default();
    let mut runtime = LlmRuntime::new(client);
    triage_tui::run_app(&mut state, &mut runtime)
}

fn setup_logging(config: &Config) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(config.log_filter()))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let log_file = config.log_file().ok().and_then(|path| {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).ok()?;
        }
        OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .ok()
    });

    let result = if let Some(file) = log_file {
        tracing_subscriber::registry()
            .with(filter)
            .with(
                tracing_subscriber::fmt::layer()
                    .with_writer(std::sync::Mutex::new(file))
                    .with_ansi(false),
            )
            .try_init()
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
            .try_init()
    };
    if let Err(error) = result {
        eprintln!("warning: logging disabled: {error}");
    }
}

/// Analyzes the seed emails once and writes the sorted briefing.
fn run_headless(client: &triage_llm::Client, out: &mut impl Write) -> Result<()> {
    let records = RecordStore::seeded().snapshot();
    let outcomes = client
        .analyze(&records)
        .inspect_err(|error| tracing::error!(%error, "headless analysis failed"))
        .context(ANALYSIS_FAILED_MESSAGE)?;
    let results = merge_results(&records, outcomes).context(ANALYSIS_FAILED_MESSAGE)?;
    write_briefing(out, &results, OffsetDateTime::now_utc())
}

fn write_briefing(out: &mut impl Write, results: &[DisplayResult], at: OffsetDateTime) -> Result<()> {
    let stamp = at
        .format(format_description!("[hour]:[minute]:[second]"))
        .context("format analysis time")?;
    writeln!(out, "executive briefing · analyzed {stamp} UTC")?;
    for result in results {
        let priority = result.priority();
        writeln!(out)?;
        writeln!(
            out,
            "[{} ({})] ID: {}",
            priority.label(),
            priority.get(),
            result.record.id
        )?;
        writeln!(out, "  {}", result.outcome.summary)?;
        writeln!(
            out,
            "  from: {}  ·  subject: {}",
            result.record.sender, result.record.subject
        )?;
    }
    out.flush()?;
    Ok(())
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct CliOptions {
    config_path: PathBuf,
    print_config_path: bool,
    print_example: bool,
    check_only: bool,
    headless: bool,
    show_help: bool,
}

fn parse_cli_args<I, S>(args: I, default_config_path: PathBuf) -> Result<CliOptions>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut options = CliOptions {
        config_path: default_config_path,
        print_config_path: false,
        print_example: false,
        check_only: false,
        headless: false,
        show_help: false,
    };

    let mut iter = args.into_iter();
    while let Some(arg) = iter.next() {
        match arg.as_ref() {
            "--config" => {
                let value = iter
                    .next()
                    .ok_or_else(|| anyhow::anyhow!("--config requires a file path"))?;
                options.config_path = PathBuf::from(value.as_ref());
            }
            "--print-config-path" => {
                options.print_config_path = true;
            }
            "--print-example-config" => {
                options.print_example = true;
            }
            "--check" => {
                options.check_only = true;
            }
            "--headless" => {
                options.headless = true;
            }
            "--help" | "-h" => {
                options.show_help = true;
            }
            unknown => {
                return Err(anyhow::anyhow!(
                    "unknown argument {unknown:?}; run with --help to see supported options"
                ));
            }
        }
    }

    Ok(options)
}

fn print_help() {
    println!("triage: summarize and prioritize emails");
    println!("  --config <path>          Use a specific config path");
    println!("  --print-config-path      Print resolved config path");
    println!("  --print-example-config   Print a config template");
    println!("  --check                  Validate config and client settings");
    println!("  --headless               Analyze the seed emails and print the briefing");
    println!("  --help                   Show this help");
}
