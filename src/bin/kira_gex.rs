use std::path::PathBuf;
use std::process::ExitCode;

use camino::Utf8PathBuf;
use clap::{Args, Parser, Subcommand};
use miette::IntoDiagnostic;
use tracing_subscriber::EnvFilter;

use kira_gex_store::catalog::ManifestCatalog;
use kira_gex_store::config::{ConfigLoader, ResolvedConfig};
use kira_gex_store::domain::PermissionContext;
use kira_gex_store::error::KiraError;
use kira_gex_store::format::FormatVersion;
use kira_gex_store::output::{InspectResult, JsonOutput};
use kira_gex_store::reader::{ShardFile, scan_shard};
use kira_gex_store::resolver::BatchResolver;

#[derive(Parser)]
#[command(name = "kira-gex")]
#[command(about = "Random-access reader for per-gene single-cell expression shards")]
#[command(version, author)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    #[command(about = "Fetch expression vectors for genes of one dataset")]
    Query(QueryArgs),
    #[command(about = "Decode a single record at a byte offset")]
    Decode(DecodeArgs),
    #[command(about = "Show a shard file's header and record locations")]
    Inspect(InspectArgs),
}

#[derive(Args)]
struct QueryArgs {
    dataset: String,

    #[arg(required = true)]
    genes: Vec<String>,

    #[arg(long)]
    config: Option<String>,

    #[arg(long)]
    catalog: Option<PathBuf>,

    #[arg(long = "permission")]
    permissions: Vec<String>,

    #[arg(long)]
    admin: bool,
}

#[derive(Args)]
struct DecodeArgs {
    file: Utf8PathBuf,

    #[arg(long)]
    offset: u64,

    #[arg(long)]
    length: Option<u32>,

    #[arg(long, value_enum)]
    format: Option<FormatVersion>,
}

#[derive(Args)]
struct InspectArgs {
    file: Utf8PathBuf,
}

fn main() -> ExitCode {
    if let Err(report) = run() {
        eprintln!("{report:?}");
        if let Some(kira) = report.downcast_ref::<KiraError>() {
            return ExitCode::from(map_exit_code(kira));
        }
        return ExitCode::from(1);
    }
    ExitCode::SUCCESS
}

fn map_exit_code(error: &KiraError) -> u8 {
    match error {
        KiraError::DatasetNotFound(_) | KiraError::MissingConfig => 2,
        KiraError::Io { .. } | KiraError::Corrupt { .. } | KiraError::InvalidShardHeader { .. } => {
            3
        }
        KiraError::PermissionDenied(_) => 4,
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
        Commands::Query(args) => run_query(args),
        Commands::Decode(args) => run_decode(args),
        Commands::Inspect(args) => run_inspect(args),
    }
}

fn run_query(args: QueryArgs) -> miette::Result<()> {
    let config = match (&args.config, &args.catalog) {
        (None, Some(_)) => ConfigLoader::resolve_optional(None)?,
        (path, _) => Some(ConfigLoader::resolve(path.as_deref())?),
    };

    let catalog_path = args
        .catalog
        .clone()
        .or_else(|| config.as_ref().and_then(|config| config.catalog.clone()))
        .ok_or_else(|| miette::Report::msg("no catalog given (use --catalog or kira-gex.json)"))?;
    let ctx = permission_context(&args, config.as_ref());

    let catalog = ManifestCatalog::load(&catalog_path)?;
    let resolver = BatchResolver::new(catalog);
    let result = resolver.resolve(&args.dataset, &args.genes, &ctx)?;
    JsonOutput::print_query(&result).into_diagnostic()
}

fn permission_context(args: &QueryArgs, config: Option<&ResolvedConfig>) -> PermissionContext {
    if args.admin || config.is_some_and(|config| config.admin) {
        return PermissionContext::admin();
    }
    let mut permissions = args.permissions.clone();
    if let Some(config) = config {
        permissions.extend(config.permissions.iter().cloned());
    }
    PermissionContext::new(permissions)
}

fn run_decode(args: DecodeArgs) -> miette::Result<()> {
    let mut file = ShardFile::open(&args.file)?;
    let format = match args.format {
        Some(format) => format,
        None => file.header()?.version,
    };
    let locator = kira_gex_store::domain::GeneLocator {
        gene_id: String::new(),
        gene_symbol: String::new(),
        file: args.file.clone(),
        offset: args.offset,
        length: args.length,
        format,
    };
    let record = file.read_record(&locator)?;
    JsonOutput::print_record(&record).into_diagnostic()
}

fn run_inspect(args: InspectArgs) -> miette::Result<()> {
    let (header, records) = scan_shard(&args.file)?;
    let result = InspectResult {
        file: args.file.to_string(),
        header,
        records,
    };
    JsonOutput::print_inspect(&result).into_diagnostic()
}
