//! mexdump CLI: validate a request, then download bars, quotes and trades.
//!
//! ```text
//! mexdump --symbols XBTUSD ETHUSD --channels bars trades --bars 1m 1h \
//!         --start 2021-03-01 --end 2021-03-10 [--save-to PATH] [--config FILE]
//! ```

use anyhow::{bail, Context, Result};
use chrono::NaiveDate;
use clap::Parser;
use mexdump_core::data::{
    prepare_destination, run_download, validate_channels, validate_dates, BarResolution,
    Channel, Clock, FetchRequest, HttpTransport, InstrumentCatalog, RunReport, SystemClock,
};
use mexdump_core::FetchConfig;
use std::collections::BTreeSet;
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "mexdump",
    version,
    about = "Download historical BitMEX bars, quotes and trades into daily CSV files",
    after_help = "Exit status: 0 once every channel completed or stopped at a day the \
                  archive has not published yet; 1 on invalid arguments or if any channel failed."
)]
struct Cli {
    /// Instrument symbols (e.g., XBTUSD ETHUSD).
    #[arg(long, required = true, num_args = 1..)]
    symbols: Vec<String>,

    /// Channels to download: bars, quotes, trades.
    #[arg(long, required = true, num_args = 1..)]
    channels: Vec<Channel>,

    /// Bar time frames (1m, 5m, 1h, 1d). Required with the bars channel.
    #[arg(long, num_args = 1..)]
    bars: Vec<BarResolution>,

    /// First day to download (YYYY-MM-DD).
    #[arg(long)]
    start: NaiveDate,

    /// Last day to download (YYYY-MM-DD), inclusive. Clamped to today.
    #[arg(long)]
    end: NaiveDate,

    /// Existing directory under which the data root is created. Defaults to
    /// the working directory.
    #[arg(long)]
    save_to: Option<PathBuf>,

    /// TOML file overriding endpoints and pacing.
    #[arg(long)]
    config: Option<PathBuf>,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => FetchConfig::from_file(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => FetchConfig::default(),
    };

    // flag checks first: nothing below may run on a malformed request
    let channels: BTreeSet<Channel> = cli.channels.into_iter().collect();
    let resolutions: BTreeSet<BarResolution> = cli.bars.into_iter().collect();
    validate_channels(&channels, &resolutions)?;

    let clock = SystemClock;
    let range = validate_dates(cli.start, cli.end, clock.today(), config.earliest_date)?;
    let transport = HttpTransport::new(&config)?;

    let catalog = InstrumentCatalog::fetch(&transport, &config.instrument_endpoint)
        .context("fetching the instrument list")?;
    if catalog.is_empty() {
        bail!("the instrument list from {} is empty", config.instrument_endpoint);
    }
    let symbols: BTreeSet<String> = cli.symbols.into_iter().collect();
    catalog.validate_symbols(&symbols)?;

    let root = prepare_destination(cli.save_to.as_deref(), &config.base_dir)?;
    let request = FetchRequest::new(symbols, channels, resolutions, range, root)?;

    info!(
        symbols = request.symbols.len(),
        start = %request.range.start,
        end = %request.range.end,
        root = %request.root.display(),
        "starting download"
    );
    let report = run_download(&request, &transport, &clock, &config);
    print_report(&report);

    if !report.all_succeeded() {
        std::process::exit(1);
    }
    Ok(())
}

fn print_report(report: &RunReport) {
    println!();
    println!("Report");
    println!("------");
    for (channel, status) in &report.entries {
        println!("{channel}: {status}");
    }
}
