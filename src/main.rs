use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use regex::Regex;
use tracing::{debug, info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use dist_surveyor::config::{SurveyConfig, db_path};
use dist_surveyor::index::cache::MemoCache;
use dist_surveyor::index::cached::CachedIndex;
use dist_surveyor::index::metacpan::MetaCpanIndex;
use dist_surveyor::index::registry::ReleaseIndex;
use dist_surveyor::inventory::install_log::InstallLog;
use dist_surveyor::inventory::scan::scan_lib_dirs;
use dist_surveyor::output::{DEFAULT_TEMPLATE, Formatter, OutputMode, warn_unresolved, write_report};
use dist_surveyor::survey::context::{SurveyContext, SurveyOptions};
use dist_surveyor::survey::survey;

#[derive(Parser, Debug)]
#[command(name = "dist-surveyor")]
#[command(version, about = "Infer which CPAN releases produced a local Perl library tree")]
struct Cli {
    /// Library directories, in search-path order
    #[arg(required = true, value_name = "LIB_DIRS")]
    lib_dirs: Vec<PathBuf>,

    /// Also list superseded releases whose files are still installed
    #[arg(long)]
    remnants: bool,

    /// Only survey modules whose name matches this regex
    #[arg(long = "match", value_name = "REGEX")]
    module_match: Option<String>,

    /// Output template, e.g. "{name}\t{dist_data.percent_installed}"
    #[arg(long, value_name = "TEMPLATE", conflicts_with = "json")]
    format: Option<String>,

    /// Print one JSON object per release
    #[arg(long)]
    json: bool,

    /// perllocal.pod to use instead of searching the library directories
    #[arg(long, value_name = "FILE")]
    install_log: Option<PathBuf>,

    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Query the index directly, bypassing the memo cache
    #[arg(long)]
    uncached: bool,

    /// Modules resolved concurrently
    #[arg(long, value_name = "N")]
    concurrency: Option<usize>,

    /// Result count at which a query is considered too broad
    #[arg(long, value_name = "N")]
    max_results: Option<usize>,

    /// Weight of a version match whose file size differs (0.0 to 1.0)
    #[arg(long, value_name = "WEIGHT")]
    size_mismatch_weight: Option<f64>,

    #[arg(long, value_name = "URL")]
    index_url: Option<String>,

    #[arg(short, long)]
    verbose: bool,

    #[arg(long)]
    debug: bool,

    /// Write JSON logs to this file instead of stderr
    #[arg(long, value_name = "FILE")]
    log_file: Option<PathBuf>,
}

impl Cli {
    fn config(&self) -> anyhow::Result<SurveyConfig> {
        let mut config = match &self.config {
            Some(path) => SurveyConfig::load(path)?,
            None => SurveyConfig::default(),
        };

        if let Some(url) = &self.index_url {
            config.index.base_url = url.clone();
        }
        if let Some(max_results) = self.max_results {
            config.index.max_results = max_results;
        }
        if let Some(weight) = self.size_mismatch_weight {
            config.scoring.size_mismatch_weight = weight;
        }
        if let Some(concurrency) = self.concurrency {
            config.concurrency = concurrency;
        }
        if self.uncached {
            config.cache.enabled = false;
        }

        config.validate()?;
        Ok(config)
    }
}

/// Log level comes from `--debug`, then `--verbose`, then `RUST_LOG`, then warn
fn init_tracing(cli: &Cli) -> anyhow::Result<Option<WorkerGuard>> {
    let filter = if cli.debug {
        EnvFilter::new("dist_surveyor=debug")
    } else if cli.verbose {
        EnvFilter::new("dist_surveyor=info")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("dist_surveyor=warn"))
    };

    let Some(log_file) = &cli.log_file else {
        tracing_subscriber::registry()
            .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
            .with(filter)
            .init();
        return Ok(None);
    };

    let dir = log_file
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or(Path::new("."));
    let file_name = log_file
        .file_name()
        .with_context(|| format!("Log file path has no file name: {:?}", log_file))?;
    std::fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create log directory {:?}", dir))?;

    let (writer, guard) = tracing_appender::non_blocking(tracing_appender::rolling::never(dir, file_name));
    tracing_subscriber::registry()
        .with(fmt::layer().json().with_writer(writer))
        .with(filter)
        .init();

    Ok(Some(guard))
}

fn build_index(config: &SurveyConfig) -> anyhow::Result<Arc<dyn ReleaseIndex>> {
    let remote: Arc<dyn ReleaseIndex> = Arc::new(MetaCpanIndex::new(
        &config.index.base_url,
        config.index.max_results,
    )?);

    if !config.cache.enabled {
        info!("Memo cache disabled");
        return Ok(remote);
    }

    let path = config.cache.path.clone().unwrap_or_else(db_path);
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create cache directory {:?}", parent))?;
    }

    let cached = CachedIndex::new(remote, Arc::new(MemoCache::new(&path)?));
    let pruned = cached.prune_stale()?;
    if pruned > 0 {
        info!("Pruned {} stale memo entries", pruned);
    }

    Ok(Arc::new(cached))
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let config = cli.config()?;
    debug!("Using configuration: {:?}", config);

    let mut inventory = scan_lib_dirs(&cli.lib_dirs)?;
    if let Some(pattern) = &cli.module_match {
        let pattern =
            Regex::new(pattern).with_context(|| format!("Invalid --match pattern {:?}", pattern))?;
        inventory.retain_matching(&pattern);
    }
    if inventory.is_empty() {
        warn!("No modules found in {:?}", cli.lib_dirs);
    }

    let install_log = match cli
        .install_log
        .clone()
        .or_else(|| InstallLog::discover(&cli.lib_dirs))
    {
        Some(path) => InstallLog::load(&path)?,
        None => {
            info!("No perllocal.pod found; ties will not use the install log");
            InstallLog::default()
        }
    };

    let ctx = SurveyContext::new(
        build_index(&config)?,
        install_log,
        SurveyOptions {
            include_remnants: cli.remnants,
            concurrency: config.concurrency,
            size_mismatch_weight: config.scoring.size_mismatch_weight,
        },
    );

    let report = survey(&ctx, &inventory).await?;
    warn_unresolved(&report);

    let mode = if cli.json {
        OutputMode::Json
    } else {
        OutputMode::Template(Formatter::new(
            cli.format.as_deref().unwrap_or(DEFAULT_TEMPLATE),
        ))
    };
    write_report(&mut std::io::stdout().lock(), &report, &mode)?;

    Ok(())
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let _guard = init_tracing(&cli)?;

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?
        .block_on(run(cli))
}
