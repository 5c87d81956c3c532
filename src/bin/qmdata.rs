use std::process::ExitCode;

use clap::{Args, Parser, Subcommand};
use miette::IntoDiagnostic;
use tracing_subscriber::EnvFilter;

use qmdata::config::{ConfigLoader, ResolvedConfig};
use qmdata::dataset::{DatasetView, TableArchiveSource};
use qmdata::error::QmDataError;
use qmdata::fetch::HttpArchiveClient;
use qmdata::layout::CacheLayout;
use qmdata::output::{ClearReport, DownloadProgress, FetchReport, InfoReport, JsonOutput, SampleReport};

#[derive(Parser)]
#[command(name = "qmdata")]
#[command(about = "Download, cache, and serve quantum-chemistry datasets as padded numeric arrays")]
#[command(version, author)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    #[command(about = "Materialize the dataset cache (download, extract, parse, pad)")]
    Fetch(CommonArgs),
    #[command(about = "Print manifest and shape summary for a cached dataset")]
    Info(CommonArgs),
    #[command(about = "Print one record from the dataset")]
    Show(ShowArgs),
    #[command(about = "Remove cached artifacts for a dataset")]
    Clear(CommonArgs),
}

#[derive(Args)]
struct CommonArgs {
    #[arg(long)]
    name: Option<String>,

    #[arg(long)]
    cache_dir: Option<String>,

    #[arg(long)]
    url: Option<String>,

    #[arg(long)]
    test_subset: bool,

    #[arg(long)]
    force: bool,

    #[arg(long)]
    config: Option<String>,
}

#[derive(Args)]
struct ShowArgs {
    #[arg(long)]
    index: usize,

    #[command(flatten)]
    common: CommonArgs,
}

fn main() -> ExitCode {
    if let Err(report) = run() {
        eprintln!("{report:?}");
        if let Some(err) = report.downcast_ref::<QmDataError>() {
            return ExitCode::from(map_exit_code(err));
        }
        return ExitCode::from(1);
    }
    ExitCode::SUCCESS
}

fn map_exit_code(error: &QmDataError) -> u8 {
    match error {
        QmDataError::MissingConfig
        | QmDataError::ConfigRead(_)
        | QmDataError::ConfigParse(_)
        | QmDataError::InvalidDatasetName(_) => 2,
        QmDataError::Http { .. } | QmDataError::HttpStatus { .. } => 3,
        _ => 1,
    }
}

fn run() -> miette::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Fetch(args) => run_fetch(args),
        Commands::Info(args) => run_info(args),
        Commands::Show(args) => run_show(args),
        Commands::Clear(args) => run_clear(args),
    }
}

fn resolve(args: &CommonArgs) -> miette::Result<ResolvedConfig> {
    let mut resolved = if args.config.is_some() || std::path::Path::new("qmdata.json").exists() {
        ConfigLoader::resolve(args.config.as_deref()).into_diagnostic()?
    } else {
        ConfigLoader::resolve_config(Default::default()).into_diagnostic()?
    };

    if args.test_subset {
        resolved.test_subset = true;
        if args.name.is_none() {
            resolved.name = "qm9-mini".parse().into_diagnostic()?;
        }
    }
    if let Some(name) = &args.name {
        resolved.name = name.parse().into_diagnostic()?;
    }
    if let Some(cache_dir) = &args.cache_dir {
        resolved.cache_dir = Some(cache_dir.as_str().into());
    }
    if let Some(url) = &args.url {
        resolved.url = Some(url.clone());
    }
    Ok(resolved)
}

fn layout_for(resolved: &ResolvedConfig) -> miette::Result<CacheLayout> {
    match &resolved.cache_dir {
        Some(dir) => Ok(CacheLayout::with_root(dir.clone())),
        None => CacheLayout::new().into_diagnostic(),
    }
}

fn source_for(resolved: &ResolvedConfig) -> miette::Result<TableArchiveSource> {
    let base = if resolved.test_subset {
        TableArchiveSource::qm9_subset().into_diagnostic()?
    } else {
        TableArchiveSource::qm9().into_diagnostic()?
    };
    let mut source = base.with_id(resolved.name.clone());
    if let Some(url) = &resolved.url {
        source = source.with_url(url.clone());
    }
    Ok(source)
}

fn run_fetch(args: CommonArgs) -> miette::Result<()> {
    let resolved = resolve(&args)?;
    let layout = layout_for(&resolved)?;
    let source = source_for(&resolved)?;
    let cache_path = layout.dataset_cache_path(&resolved.name);
    let cached_before = cache_path.as_std_path().exists() && !args.force;

    let client = HttpArchiveClient::new().into_diagnostic()?;
    let view = DatasetView::new(source, client, layout)
        .with_progress(Box::new(DownloadProgress::new()))
        .with_force_rebuild(args.force);
    let data = view.materialize().into_diagnostic()?;

    let action = if cached_before { "cache" } else { "download" };
    JsonOutput::print(&FetchReport {
        name: resolved.name.to_string(),
        action: action.to_string(),
        records: data.len(),
        max_atoms: data.max_atoms(),
        cache_path: cache_path.to_string(),
    })
    .into_diagnostic()?;
    Ok(())
}

fn run_info(args: CommonArgs) -> miette::Result<()> {
    let resolved = resolve(&args)?;
    let layout = layout_for(&resolved)?;
    let manifest =
        CacheLayout::read_manifest(&layout.manifest_path(&resolved.name)).into_diagnostic()?;

    JsonOutput::print(&InfoReport {
        name: manifest.name,
        source_url: manifest.source_url,
        records: manifest.records,
        max_atoms: manifest.max_atoms,
        created_at: manifest.created_at,
        cache_path: layout.dataset_cache_path(&resolved.name).to_string(),
    })
    .into_diagnostic()?;
    Ok(())
}

fn run_show(args: ShowArgs) -> miette::Result<()> {
    let resolved = resolve(&args.common)?;
    let layout = layout_for(&resolved)?;
    let source = source_for(&resolved)?;

    let client = HttpArchiveClient::new().into_diagnostic()?;
    let view = DatasetView::new(source, client, layout)
        .with_progress(Box::new(DownloadProgress::new()));
    let sample = view.get(args.index).into_diagnostic()?;

    JsonOutput::print(&SampleReport {
        index: args.index,
        num_atoms: sample.num_atoms,
        atomic_numbers: sample.atomic_numbers.to_vec(),
        coordinates: sample
            .coordinates
            .chunks_exact(3)
            .map(|row| [row[0], row[1], row[2]])
            .collect(),
        property_value: sample.property_value,
    })
    .into_diagnostic()?;
    Ok(())
}

fn run_clear(args: CommonArgs) -> miette::Result<()> {
    let resolved = resolve(&args)?;
    let layout = layout_for(&resolved)?;
    layout.clear_dataset(&resolved.name).into_diagnostic()?;

    JsonOutput::print(&ClearReport {
        name: resolved.name.to_string(),
        cleared: true,
    })
    .into_diagnostic()?;
    Ok(())
}
