//! CLI command definitions, routing, and tracing setup.

use std::path::{Path, PathBuf};

use clap::{Args, Parser, Subcommand};
use color_eyre::eyre::{Result, eyre};
use harvester_core::{Artifact, Harvester, RunSummary};
use harvester_shared::{
    AppConfig, HarvestConfig, HarvestError, ProductSource, init_config, load_config,
    load_config_from,
};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::progress::CliProgress;

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// harvester: collect every published version of a bulletin into one file.
#[derive(Parser)]
#[command(
    name = "harvester",
    version,
    about = "Download all versions of a forecast office product into one ordered text file.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Config file to use instead of ~/.harvester/harvester.toml.
    #[arg(long, global = true, env = "HARVESTER_CONFIG")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

/// Log output format.
#[derive(Clone, Debug, clap::ValueEnum)]
pub(crate) enum LogFormat {
    Text,
    Json,
}

/// Top-level CLI subcommands.
#[derive(Subcommand)]
pub(crate) enum Command {
    /// Discover, download, and assemble all versions of a product.
    Fetch(FetchArgs),

    /// List configured location presets.
    Locations,

    /// Configuration management.
    Config {
        /// Config subcommand.
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Arguments for `fetch`.
#[derive(Args, Debug, Default)]
pub(crate) struct FetchArgs {
    /// Location preset name (see `harvester locations`).
    #[arg(short, long, conflicts_with_all = ["site", "all"])]
    pub location: Option<String>,

    /// Issuing site code for an ad-hoc product (e.g. OKX).
    #[arg(long, requires = "issued_by", conflicts_with = "all")]
    pub site: Option<String>,

    /// Issuing office for an ad-hoc product (e.g. NYC).
    #[arg(long, requires = "site")]
    pub issued_by: Option<String>,

    /// Product category for an ad-hoc product.
    #[arg(long, default_value = "CLI")]
    pub product: String,

    /// Fetch every configured location, one after another.
    #[arg(long)]
    pub all: bool,

    /// Output file (or directory with --all).
    #[arg(short, long)]
    pub out: Option<PathBuf>,

    /// Also print a copy enclosed in the <clip> container to stdout.
    #[arg(long, conflicts_with = "all")]
    pub stdout: bool,

    /// Skip the file and only print the stdout copy.
    #[arg(long, requires = "stdout")]
    pub no_file: bool,

    /// Enclose the written file in the <clip> container as well.
    #[arg(long)]
    pub wrap: bool,

    /// Concurrent workers (1-32). Derived from CPU count when omitted.
    #[arg(short, long)]
    pub workers: Option<usize>,

    /// Abort the run after this many seconds, keeping what was fetched.
    #[arg(long)]
    pub deadline: Option<u64>,

    /// Print the run summary as JSON.
    #[arg(long)]
    pub summary_json: bool,
}

/// Config subcommands.
#[derive(Subcommand)]
pub(crate) enum ConfigAction {
    /// Initialize config file with defaults.
    Init,
    /// Show resolved configuration.
    Show,
}

// ---------------------------------------------------------------------------
// Tracing setup
// ---------------------------------------------------------------------------

/// Crates whose events the default filter lets through.
const LOG_TARGETS: &[&str] = &[
    "harvester",
    "harvester_core",
    "harvester_discovery",
    "harvester_fetcher",
    "harvester_layout",
    "harvester_shared",
];

/// Initialize tracing based on CLI flags.
pub(crate) fn init_tracing(cli: &Cli) {
    use tracing_subscriber::{EnvFilter, fmt};

    let level = match cli.verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let filter = LOG_TARGETS
        .iter()
        .map(|target| format!("{target}={level}"))
        .collect::<Vec<_>>()
        .join(",");

    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    // Logs go to stderr so `--stdout` output stays clean.
    match cli.log_format {
        LogFormat::Text => {
            fmt()
                .with_env_filter(env_filter)
                .with_target(false)
                .with_writer(std::io::stderr)
                .init();
        }
        LogFormat::Json => {
            fmt()
                .json()
                .with_env_filter(env_filter)
                .with_writer(std::io::stderr)
                .init();
        }
    }
}

// ---------------------------------------------------------------------------
// Command dispatch
// ---------------------------------------------------------------------------

/// Run the CLI command.
pub(crate) async fn run(cli: Cli) -> Result<()> {
    let config = match &cli.config {
        Some(path) => load_config_from(path)?,
        None => load_config()?,
    };

    match cli.command {
        Command::Fetch(args) => cmd_fetch(&config, &args).await,
        Command::Locations => cmd_locations(&config),
        Command::Config { action } => match action {
            ConfigAction::Init => cmd_config_init(),
            ConfigAction::Show => cmd_config_show(&config),
        },
    }
}

// ---------------------------------------------------------------------------
// fetch
// ---------------------------------------------------------------------------

/// One product to harvest and where its artifact goes.
#[derive(Debug, Clone, PartialEq)]
struct Target {
    source: ProductSource,
    out: PathBuf,
}

/// Merge config file values with CLI overrides.
fn harvest_config(config: &AppConfig, args: &FetchArgs) -> Result<HarvestConfig> {
    let mut harvest = HarvestConfig::from(config);
    if let Some(workers) = args.workers {
        harvest.workers = Some(workers);
    }
    if let Some(secs) = args.deadline {
        harvest.deadline = Some(std::time::Duration::from_secs(secs));
    }
    if args.wrap {
        harvest.wrap = Some(config.defaults.wrap_tag.clone());
    }
    harvest.validate()?;
    Ok(harvest)
}

/// Resolve which products to harvest and their output paths.
fn resolve_targets(config: &AppConfig, args: &FetchArgs) -> Result<Vec<Target>> {
    let output_dir = PathBuf::from(&config.defaults.output_dir);

    if args.all {
        let dir = args.out.clone().unwrap_or(output_dir);
        return config
            .locations
            .iter()
            .map(|preset| {
                Ok(Target {
                    source: config.source_for(preset)?,
                    out: dir.join(&preset.file_name),
                })
            })
            .collect();
    }

    if let Some(name) = &args.location {
        let preset = config.location(name).ok_or_else(|| {
            eyre!("unknown location '{name}'; run `harvester locations` to list presets")
        })?;
        return Ok(vec![Target {
            source: config.source_for(preset)?,
            out: args
                .out
                .clone()
                .unwrap_or_else(|| output_dir.join(&preset.file_name)),
        }]);
    }

    if let (Some(site), Some(issued_by)) = (&args.site, &args.issued_by) {
        let source = ProductSource::new(config.base_url()?, site, issued_by, &args.product);
        let default_name = format!("weather_reports_{site}_{issued_by}.txt");
        return Ok(vec![Target {
            source,
            out: args
                .out
                .clone()
                .unwrap_or_else(|| output_dir.join(default_name)),
        }]);
    }

    Err(eyre!("specify --location, --site/--issued-by, or --all"))
}

async fn cmd_fetch(config: &AppConfig, args: &FetchArgs) -> Result<()> {
    let harvest = harvest_config(config, args)?;
    let targets = resolve_targets(config, args)?;

    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received, stopping");
            on_signal.cancel();
        }
    });

    let mut failures = Vec::new();
    for target in &targets {
        if cancel.is_cancelled() {
            break;
        }
        let clip_tag = &config.defaults.wrap_tag;
        if let Err(e) = fetch_one(target, &harvest, clip_tag, args, cancel.clone()).await {
            error!(source = %target.source.label(), error = %e, "harvest failed");
            failures.push(target.source.label());
        }
    }

    if failures.is_empty() {
        Ok(())
    } else {
        Err(eyre!("{} of {} harvests failed: {}", failures.len(), targets.len(), failures.join(", ")))
    }
}

async fn fetch_one(
    target: &Target,
    harvest: &HarvestConfig,
    clip_tag: &str,
    args: &FetchArgs,
    cancel: CancellationToken,
) -> Result<()> {
    let harvester = Harvester::from_config(target.source.clone(), harvest)?;

    info!(
        source = %target.source.label(),
        out = %target.out.display(),
        "harvesting"
    );

    let progress = if args.stdout {
        CliProgress::hidden()
    } else {
        CliProgress::new()
    };

    let output = match harvester.run(cancel, &progress).await {
        Ok(output) => output,
        Err(e @ HarvestError::DiscoveryFailed { .. }) => {
            return Err(eyre!("failed to determine the number of versions: {e}"));
        }
        Err(e) => return Err(e.into()),
    };

    if output.summary.discovered == 0 {
        return Err(eyre!(
            "no versions published for {}; nothing written",
            target.source.label()
        ));
    }

    if !args.no_file {
        write_file(&output.artifact, &target.out)?;
    }
    if args.stdout {
        println!("{}", stdout_copy(&output.artifact, harvest, clip_tag));
    }
    print_summary(&output.summary, &target.out, args)?;

    match &output.summary.interrupted {
        Some(reason) => Err(eyre!("run {reason}; wrote partial artifact")),
        None => Ok(()),
    }
}

/// Write the artifact to `out`, creating parent directories.
fn write_file(artifact: &Artifact, out: &Path) -> Result<()> {
    if let Some(parent) = out.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|e| HarvestError::io(parent, e))?;
    }
    std::fs::write(out, artifact.as_str()).map_err(|e| HarvestError::io(out, e))?;

    info!(path = %out.display(), bytes = artifact.as_str().len(), "artifact written");
    Ok(())
}

/// The pasteable copy: always enclosed in `clip_tag`, never twice.
fn stdout_copy(artifact: &Artifact, harvest: &HarvestConfig, clip_tag: &str) -> String {
    match harvest.wrap {
        Some(_) => artifact.as_str().to_string(),
        None => artifact.wrapped(clip_tag),
    }
}

fn print_summary(summary: &RunSummary, out: &Path, args: &FetchArgs) -> Result<()> {
    if args.summary_json {
        let json = serde_json::to_string_pretty(summary)?;
        if args.stdout {
            eprintln!("{json}");
        } else {
            println!("{json}");
        }
        return Ok(());
    }

    let lines = [
        String::new(),
        format!("  Source:     {}", summary.source),
        format!("  Versions:   {}", summary.discovered),
        format!("  Saved:      {}", summary.succeeded),
        format!("  Missing:    {}", summary.missing.len()),
        format!("  Failed:     {}", summary.failed.len() + summary.absent.len()),
        format!("  Output:     {}", if args.no_file { "stdout".into() } else { out.display().to_string() }),
        format!("  Time:       {:.2}s", summary.elapsed_ms as f64 / 1000.0),
        String::new(),
    ];
    for line in lines {
        // Keep stdout reserved for the artifact when it is the sink.
        if args.stdout {
            eprintln!("{line}");
        } else {
            println!("{line}");
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// locations / config
// ---------------------------------------------------------------------------

fn cmd_locations(config: &AppConfig) -> Result<()> {
    println!("{:<12} {:<5} {:<9} {:<8} FILE", "NAME", "SITE", "ISSUEDBY", "PRODUCT");
    for preset in &config.locations {
        println!(
            "{:<12} {:<5} {:<9} {:<8} {}",
            preset.name, preset.site, preset.issued_by, preset.product, preset.file_name
        );
    }
    Ok(())
}

fn cmd_config_init() -> Result<()> {
    let path = init_config()?;
    println!("Config initialized at: {}", path.display());
    Ok(())
}

fn cmd_config_show(config: &AppConfig) -> Result<()> {
    let toml_str = toml::to_string_pretty(config)?;
    println!("{toml_str}");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use harvester_core::{AggregateOptions, ResultAggregator};
    use harvester_shared::{FetchOutcome, FetchResults, Index};

    fn args() -> FetchArgs {
        FetchArgs {
            product: "CLI".into(),
            ..FetchArgs::default()
        }
    }

    #[test]
    fn cli_parses_fetch_flags() {
        let cli = Cli::try_parse_from([
            "harvester", "fetch", "--location", "Miami", "--workers", "8", "--wrap", "-v",
        ])
        .unwrap();
        assert_eq!(cli.verbose, 1);
        match cli.command {
            Command::Fetch(args) => {
                assert_eq!(args.location.as_deref(), Some("Miami"));
                assert_eq!(args.workers, Some(8));
                assert!(args.wrap);
            }
            _ => panic!("expected fetch"),
        }
    }

    #[test]
    fn cli_rejects_location_with_all() {
        assert!(Cli::try_parse_from(["harvester", "fetch", "--location", "Miami", "--all"]).is_err());
    }

    #[test]
    fn cli_requires_site_and_office_together() {
        assert!(Cli::try_parse_from(["harvester", "fetch", "--site", "OKX"]).is_err());
    }

    #[test]
    fn location_target_uses_preset_file_name() {
        let config = AppConfig::default();
        let mut a = args();
        a.location = Some("new york".into());

        let targets = resolve_targets(&config, &a).unwrap();
        assert_eq!(targets.len(), 1);
        assert_eq!(targets[0].source.label(), "OKX/NYC/CLI");
        assert_eq!(targets[0].out, PathBuf::from("./weather_reports_OKX_NewYork.txt"));
    }

    #[test]
    fn all_targets_share_output_dir() {
        let config = AppConfig::default();
        let dir = tempfile::tempdir().unwrap();
        let mut a = args();
        a.all = true;
        a.out = Some(dir.path().to_path_buf());

        let targets = resolve_targets(&config, &a).unwrap();
        assert_eq!(targets.len(), 4);
        assert!(targets.iter().all(|t| t.out.starts_with(dir.path())));
    }

    #[test]
    fn adhoc_target_builds_default_name() {
        let config = AppConfig::default();
        let mut a = args();
        a.site = Some("BOU".into());
        a.issued_by = Some("DEN".into());

        let targets = resolve_targets(&config, &a).unwrap();
        assert_eq!(targets[0].source.label(), "BOU/DEN/CLI");
        assert!(targets[0].out.ends_with("weather_reports_BOU_DEN.txt"));
    }

    #[test]
    fn unknown_location_is_an_error() {
        let mut a = args();
        a.location = Some("Atlantis".into());
        assert!(resolve_targets(&AppConfig::default(), &a).is_err());
        assert!(resolve_targets(&AppConfig::default(), &args()).is_err());
    }

    #[test]
    fn cli_no_file_requires_stdout() {
        assert!(Cli::try_parse_from(["harvester", "fetch", "-l", "Miami", "--no-file"]).is_err());
        assert!(
            Cli::try_parse_from(["harvester", "fetch", "-l", "Miami", "--stdout", "--no-file"])
                .is_ok()
        );
    }

    fn artifact() -> Artifact {
        let results: FetchResults = [(Index::new(1).unwrap(), FetchOutcome::Success("alpha".into()))]
            .into_iter()
            .collect();
        ResultAggregator::default().aggregate(&results)
    }

    #[test]
    fn file_is_plain_and_stdout_copy_is_clipped() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("reports").join("miami.txt");
        let artifact = artifact();
        let harvest = HarvestConfig::from(&AppConfig::default());

        write_file(&artifact, &out).unwrap();
        let written = std::fs::read_to_string(&out).unwrap();
        assert_eq!(written, "<version_1>\nalpha\n</version_1>");

        let copy = stdout_copy(&artifact, &harvest, "clip");
        assert_eq!(copy, format!("<clip>\n\n{written}\n\n</clip>"));
    }

    #[test]
    fn stdout_copy_is_not_wrapped_twice() {
        let mut harvest = HarvestConfig::from(&AppConfig::default());
        harvest.wrap = Some("clip".into());
        let wrapped = ResultAggregator::new(AggregateOptions {
            wrap: Some("clip".into()),
            ..AggregateOptions::default()
        })
        .aggregate(
            &[(Index::new(1).unwrap(), FetchOutcome::Success("alpha".into()))]
                .into_iter()
                .collect(),
        );

        let copy = stdout_copy(&wrapped, &harvest, "clip");
        assert_eq!(copy.matches("<clip>").count(), 1);
    }

    #[test]
    fn cli_overrides_config() {
        let mut a = args();
        a.workers = Some(3);
        a.deadline = Some(60);
        a.wrap = true;

        let harvest = harvest_config(&AppConfig::default(), &a).unwrap();
        assert_eq!(harvest.workers, Some(3));
        assert_eq!(harvest.deadline, Some(std::time::Duration::from_secs(60)));
        assert_eq!(harvest.wrap.as_deref(), Some("clip"));

        a.workers = Some(99);
        assert!(harvest_config(&AppConfig::default(), &a).is_err());
    }
}
