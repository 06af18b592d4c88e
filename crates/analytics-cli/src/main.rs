//! DHIS2 analytics CLI

use dhis_analytics_cli::cli::{Args, Command, GenerateArgs, OptimizeArgs, OutliersArgs, OutputFormat};
use dhis_analytics_cli::config::AppConfig;
use dhis_analytics_cli::db::{self, DatabaseType, DryRunExecutor};
use dhis_analytics_cli::input::{read_input, read_json};
use dhis_analytics_cli::logging::setup_logging;
use dhis_analytics_cli::output::{
    format_generation, format_job_run, format_json, format_optimized, format_outliers,
    format_replication, OptimizedQuery, OutlierReport,
};
use dhis_analytics_cli::watermark::FileWatermarkStore;

use anyhow::{anyhow, Context, Result};
use chrono::{Datelike, Utc};
use clap::Parser;
use dhis_analytics_core::outlier::{
    InMemoryCatalog, OutlierDetectionQuery, OutlierQueryParser, OutlierSqlGenerator,
};
use dhis_analytics_core::sql::SqlBuilder;
use dhis_analytics_core::table::SqlTableManager;
use dhis_analytics_core::{
    AnalyticsTableGenerator, AnalyticsTableUpdateParams, CancellationToken,
    ContinuousAnalyticsTableJob, CteOptimizationPipeline, Dialect, GenerationReport, SqlExecutor,
    TableReplicationService, WatermarkStore,
};
use serde::Serialize;
use std::fs;
use std::io::{self, Write};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

/// Build, job or query failures.
const EXIT_FAILURE: u8 = 1;
/// Configuration error (invalid config file, missing database URL, bad flags).
const EXIT_CONFIG_ERROR: u8 = 66;

/// Marks errors caused by configuration rather than by the work itself.
#[derive(Debug, thiserror::Error)]
#[error("{0:#}")]
struct ConfigError(anyhow::Error);

fn config_error(err: anyhow::Error) -> anyhow::Error {
    ConfigError(err).into()
}

fn main() -> ExitCode {
    let args = Args::parse();

    let config = match load_config(&args) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("dhis-analytics: error: {e:#}");
            return ExitCode::from(EXIT_CONFIG_ERROR);
        }
    };
    if let Err(e) = setup_logging(&config.logging) {
        eprintln!("dhis-analytics: error: {e}");
        return ExitCode::from(EXIT_CONFIG_ERROR);
    }

    match run(&args, &config) {
        Ok(has_errors) => {
            if has_errors {
                ExitCode::from(EXIT_FAILURE)
            } else {
                ExitCode::SUCCESS
            }
        }
        Err(e) => {
            eprintln!("dhis-analytics: error: {e:#}");
            if e.is::<ConfigError>() {
                ExitCode::from(EXIT_CONFIG_ERROR)
            } else {
                ExitCode::from(EXIT_FAILURE)
            }
        }
    }
}

/// Loads the configuration file and applies command-line overrides.
fn load_config(args: &Args) -> Result<AppConfig> {
    let mut config = AppConfig::load(args.config.as_deref())?;
    if let Some(url) = &args.database_url {
        config.database.url = Some(url.clone());
    }
    if let Some(dialect) = args.dialect {
        config.analytics.dialect = dialect.into();
    }
    if let Some(level) = args.log_level {
        config.logging.level = level.as_str().to_string();
    }
    Ok(config)
}

fn run(args: &Args, config: &AppConfig) -> Result<bool> {
    match &args.command {
        Command::Generate(generate) => run_generate(args, config, generate),
        Command::Continuous => run_continuous(args, config),
        Command::Replicate(replicate) => {
            let tables = config.replica_tables(&replicate.tables).map_err(config_error)?;
            let builder = sql_builder(config);
            let executor = connect(config, builder.clone())?;
            let mut service = TableReplicationService::new(executor, builder);
            if let Some(catalog) = &config.database.source_catalog {
                service = service.with_source_catalog(catalog);
            }
            let reports = service.replicate_all(&tables)?;
            let content = match args.format {
                OutputFormat::Json => format_json(&reports, args.compact)?,
                OutputFormat::Table => format_replication(&reports, args.output.is_none()),
            };
            write_output(&args.output, &content)?;
            Ok(false)
        }
        Command::Optimize(optimize) => run_optimize(args, config, optimize),
        Command::Outliers(outliers) => run_outliers(args, config, outliers),
        Command::Schema => {
            let schemas = serde_json::json!({
                "config": schemars::schema_for!(AppConfig),
                "outlierQuery": schemars::schema_for!(OutlierDetectionQuery),
                "catalog": schemars::schema_for!(InMemoryCatalog),
            });
            write_output(&args.output, &format_json(&schemas, args.compact)?)?;
            Ok(false)
        }
    }
}

fn run_generate(args: &Args, config: &AppConfig, generate: &GenerateArgs) -> Result<bool> {
    let now = Utc::now();
    let mut skip = config.analytics.skip_table_types.clone();
    skip.extend(generate.skip_table_types.iter().cloned());

    let params = if generate.latest {
        let watermark = FileWatermarkStore::new(&config.analytics.watermark_file).load()?;
        AnalyticsTableUpdateParams::latest(now, watermark.last_full_update)
    } else {
        AnalyticsTableUpdateParams::new(now)
    }
    .with_last_years(generate.last_years.or(config.analytics.last_years))
    .with_skip_table_types(skip)
    .with_parallel_jobs(config.analytics.parallel_jobs);

    let builder = sql_builder(config);
    let dry_run = generate
        .dry_run
        .then(|| Arc::new(DryRunExecutor::new(dry_run_years(&params))));
    let executor: Arc<dyn SqlExecutor> = match &dry_run {
        Some(dry_run) => Arc::clone(dry_run) as Arc<dyn SqlExecutor>,
        None => connect(config, builder.clone())?,
    };

    let generator = table_generator(config, executor, builder)?;
    let report = generator.generate(&params, &CancellationToken::new())?;

    let content = match (&dry_run, args.format) {
        (Some(dry_run), OutputFormat::Json) => format_json(
            &DryRunOutput {
                report: &report,
                statements: dry_run.statements(),
            },
            args.compact,
        )?,
        (Some(dry_run), OutputFormat::Table) => {
            let mut content = format_generation(&report, args.quiet, args.output.is_none());
            for statement in dry_run.statements() {
                content.push_str(&statement);
                content.push_str(";\n");
            }
            content
        }
        (None, OutputFormat::Json) => format_json(&report, args.compact)?,
        (None, OutputFormat::Table) => {
            format_generation(&report, args.quiet, args.output.is_none())
        }
    };
    write_output(&args.output, &content)?;
    Ok(false)
}

fn run_continuous(args: &Args, config: &AppConfig) -> Result<bool> {
    let builder = sql_builder(config);
    let executor = connect(config, builder.clone())?;
    let generator = table_generator(config, executor, builder)?;
    let store = Arc::new(FileWatermarkStore::new(&config.analytics.watermark_file));
    let job = ContinuousAnalyticsTableJob::new(generator, store, config.analytics.job_settings());

    let run = job.execute(Utc::now(), &CancellationToken::new())?;
    let content = match args.format {
        OutputFormat::Json => format_json(&run, args.compact)?,
        OutputFormat::Table => format_job_run(&run, args.quiet, args.output.is_none()),
    };
    write_output(&args.output, &content)?;
    Ok(run.error.is_some())
}

fn run_optimize(args: &Args, config: &AppConfig, optimize: &OptimizeArgs) -> Result<bool> {
    let pipeline = CteOptimizationPipeline::new(config.analytics.dialect);
    let mut has_errors = false;
    let mut optimized = Vec::new();

    for source in read_input(&optimize.files)? {
        match pipeline.optimize(source.query()) {
            Ok(sql) => optimized.push(OptimizedQuery {
                source: source.name,
                sql,
            }),
            Err(e) => {
                eprintln!("dhis-analytics: {}: {e}", source.name);
                has_errors = true;
            }
        }
    }

    let content = match args.format {
        OutputFormat::Json => format_json(&optimized, args.compact)?,
        OutputFormat::Table => format_optimized(&optimized, args.output.is_none()),
    };
    write_output(&args.output, &content)?;
    Ok(has_errors)
}

fn run_outliers(args: &Args, config: &AppConfig, outliers: &OutliersArgs) -> Result<bool> {
    let query: OutlierDetectionQuery = read_json(&outliers.query)?;
    let catalog: InMemoryCatalog = read_json(&outliers.catalog)?;

    let request = OutlierQueryParser::new(&catalog)
        .with_context(outliers.context.into())
        .get_from_query(&query)?;
    let builder = config.analytics.dialect.sql_builder();
    let sql = OutlierSqlGenerator::new(builder.as_ref()).generate(&request);
    let report = OutlierReport { request, sql };

    let content = match args.format {
        OutputFormat::Json => format_json(&report, args.compact)?,
        OutputFormat::Table => format_outliers(&report, args.output.is_none()),
    };
    write_output(&args.output, &content)?;
    Ok(false)
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct DryRunOutput<'a> {
    report: &'a GenerationReport,
    statements: Vec<String>,
}

/// Data years reported by the dry-run executor: the rebuilt years up to the current one.
fn dry_run_years(params: &AnalyticsTableUpdateParams) -> Vec<i64> {
    let current = params.start_time.year();
    let from = params.from_year().unwrap_or(current);
    (from..=current).map(i64::from).collect()
}

fn sql_builder(config: &AppConfig) -> Arc<dyn SqlBuilder> {
    Arc::from(config.analytics.dialect.sql_builder())
}

fn table_generator(
    config: &AppConfig,
    executor: Arc<dyn SqlExecutor>,
    builder: Arc<dyn SqlBuilder>,
) -> Result<AnalyticsTableGenerator> {
    if config.tables.is_empty() {
        return Err(config_error(anyhow!(
            "No analytics tables configured (add [[tables]] entries to the config file)"
        )));
    }
    Ok(config
        .tables
        .iter()
        .fold(AnalyticsTableGenerator::new(executor, builder), |generator, table| {
            generator.with_manager(SqlTableManager::new(table.to_definition()))
        }))
}

/// Connects to the configured database, checking the URL matches the dialect.
fn connect(config: &AppConfig, builder: Arc<dyn SqlBuilder>) -> Result<Arc<dyn SqlExecutor>> {
    let url = config.database.url.as_deref().ok_or_else(|| {
        config_error(anyhow!(
            "No database URL configured (use --database-url or [database] url)"
        ))
    })?;
    let dialect = config.analytics.dialect;
    match (DatabaseType::from_url(url), dialect) {
        (Some(DatabaseType::Postgres), Dialect::Postgres | Dialect::Generic)
        | (Some(DatabaseType::Sqlite), Dialect::Sqlite) => {}
        (_, Dialect::Clickhouse) => {
            return Err(config_error(anyhow!(
                "The clickhouse dialect only supports --dry-run"
            )))
        }
        _ => {
            return Err(config_error(anyhow!(
                "Database URL {} does not match dialect {dialect:?}",
                db::redact(url)
            )))
        }
    }
    open_executor(url, config, builder)
}

#[cfg(feature = "database")]
fn open_executor(
    url: &str,
    config: &AppConfig,
    builder: Arc<dyn SqlBuilder>,
) -> Result<Arc<dyn SqlExecutor>> {
    let executor = db::SqlxExecutor::connect(url, config.database.max_connections, builder)
        .with_context(|| format!("Failed to connect to {}", db::redact(url)))?;
    tracing::info!(url = %db::redact(url), "Connected to database");
    Ok(Arc::new(executor))
}

#[cfg(not(feature = "database"))]
fn open_executor(
    _url: &str,
    _config: &AppConfig,
    _builder: Arc<dyn SqlBuilder>,
) -> Result<Arc<dyn SqlExecutor>> {
    tracing::warn!("Database support is disabled in this build");
    Err(config_error(anyhow!(
        "Built without database support (enable the `database` feature)"
    )))
}

fn write_output(path: &Option<PathBuf>, content: &str) -> Result<()> {
    if let Some(path) = path {
        fs::write(path, content)
            .with_context(|| format!("Failed to write to {}", path.display()))?;
    } else {
        io::stdout()
            .write_all(content.as_bytes())
            .context("Failed to write to stdout")?;
        // Ensure newline at end for terminal output
        if !content.ends_with('\n') {
            println!();
        }
    }
    Ok(())
}
