mod cli;
mod config;
mod identity;
mod report;
mod ui;

use anyhow::Result;
use clap::Parser;
use quotakit::cache::CacheStore;
use quotakit::summary::{CollectOptions, collect_summary};

use cli::Cli;
use config::{ReportFormat, RunConfig};
use report::ReportContext;

fn main() {
    let cli = Cli::parse();

    let log_level = if cli.debug {
        log::LevelFilter::Debug
    } else {
        match cli.verbose {
            0 => log::LevelFilter::Warn,
            1 => log::LevelFilter::Info,
            2 => log::LevelFilter::Debug,
            _ => log::LevelFilter::Trace,
        }
    };

    env_logger::Builder::new()
        .filter_level(if cli.quiet {
            log::LevelFilter::Error
        } else {
            log_level
        })
        .format_timestamp(None)
        .init();

    if let Err(err) = run(&cli) {
        ui::error(&format!("{err:#}"));
        std::process::exit(1);
    }
}

fn run(cli: &Cli) -> Result<()> {
    let config = RunConfig::resolve(cli)?;

    if config.debug {
        println!("**Debug Output Enabled**");
    }

    let target = identity::resolve_target(cli, &config)?;

    let usage = quotakit::aggregate::collect_usage_with_denylist(
        &config.mounts,
        &target,
        &config.denylist,
    );
    for notice in &usage.notices {
        ui::warn(notice);
    }

    let opts = CollectOptions {
        prefer_live: config.is_me || config.debug,
        debug: config.debug,
        include_home: config.user_home_quota,
        ..CollectOptions::default()
    };
    let cache = CacheStore::new();
    let summary = collect_summary(&config.mounts, &usage.relevant, &target, &opts, &cache);

    // The first mount's snapshot dates the details table
    let details_as_of = config
        .mounts
        .first()
        .and_then(quotakit::adapter::Mount::snapshot_mtime)
        .map_or_else(
            || "unknown".to_string(),
            |mtime| mtime.format("%b %d %Y %H:%M").to_string(),
        );

    let ctx = ReportContext {
        cluster: &config.cluster,
        group: target.group_name(),
        details_as_of: &details_as_of,
        backup_all: config.backup_all,
    };

    let text = match config.format {
        ReportFormat::Cli => report::render_cli(&ctx, &usage, &target, &summary),
        ReportFormat::Email => report::render_email(&ctx, &usage, &target, &summary),
    };
    print!("{text}");

    Ok(())
}
