//! Simulated migration against an in-memory store.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use clap::{Args, ValueEnum};
use comfy_table::modifiers::UTF8_ROUND_CORNERS;
use comfy_table::presets::UTF8_FULL;
use comfy_table::{Attribute, Cell, Color, ContentArrangement, Table};
use serde_json::json;
use somig_config::{ConfigLoader, LoggingConfig, SomigConfig};
use somig_coordinator::{Coordinator, IndexPlan, MigrationReport, MigrationStatus};
use somig_store::{FaultPlan, InMemoryStore};
use somig_transform::{AttributeSchema, FieldKind, TypeDefinition, TypeRegistry};
use somig_types::{IndexName, Mappings, MigratableDocument, SchemaVersion};
use tracing::info;
use tracing_subscriber::EnvFilter;

const SOURCE_VERSION: SchemaVersion = SchemaVersion::new(1, 0, 0);
const TARGET_VERSION: SchemaVersion = SchemaVersion::new(2, 0, 0);
const DOCUMENT_TYPES: [&str; 3] = ["dashboard", "visualization", "index-pattern"];

#[derive(Args)]
pub struct SimulateArgs {
    /// Directory containing somig.toml.
    #[arg(short, long, default_value = ".")]
    project: String,

    /// Index prefixes to migrate.
    #[arg(long = "prefix", default_values_t = [".kibana".to_string(), ".kibana_task_manager".to_string()])]
    prefixes: Vec<String>,

    /// Documents seeded per prefix.
    #[arg(short, long, default_value_t = 1000)]
    docs: usize,

    /// Documents per prefix with a type no migration knows.
    #[arg(long, default_value_t = 0)]
    bad_docs: usize,

    /// Seed pre-alias indices named after the prefix.
    #[arg(long)]
    legacy: bool,

    /// Probability that a store call fails transiently.
    #[arg(long)]
    fail_rate: Option<f64>,

    /// Seed of the fault injector.
    #[arg(long)]
    seed: Option<u64>,

    /// Migrations run at the same time.
    #[arg(long)]
    parallelism: Option<usize>,

    /// Documents per batch.
    #[arg(long)]
    batch_size: Option<usize>,

    /// Output format of the report.
    #[arg(short, long, value_enum, default_value_t = ReportFormat::Table)]
    format: ReportFormat,
}

#[derive(Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ReportFormat {
    Table,
    Json,
}

pub fn run(args: &SimulateArgs) -> Result<()> {
    let config = load_config(args)?;
    init_logging(&config.logging);

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Failed to start async runtime")?;
    let report = runtime.block_on(simulate(args, &config))?;

    match args.format {
        ReportFormat::Table => print_report(&report),
        ReportFormat::Json => println!("{}", serde_json::to_string_pretty(&report)?),
    }

    if report.status == MigrationStatus::Fatal {
        match report.fatal() {
            Some((prefix, reason)) => bail!("migration of {prefix} failed: {reason}"),
            None => bail!("migration failed"),
        }
    }
    Ok(())
}

fn load_config(args: &SimulateArgs) -> Result<SomigConfig> {
    let mut config = ConfigLoader::new()
        .with_project_dir(Path::new(&args.project))
        .load()
        .context("Failed to load configuration")?;

    if let Some(fail_rate) = args.fail_rate {
        config.store.failure_probability = fail_rate;
    }
    if let Some(seed) = args.seed {
        config.store.seed = seed;
    }
    if let Some(parallelism) = args.parallelism {
        config.coordinator.parallelism = parallelism;
    }
    if let Some(batch_size) = args.batch_size {
        config.migration.batch_size = batch_size;
    }
    config.validate().context("Invalid command line overrides")?;
    Ok(config)
}

fn init_logging(logging: &LoggingConfig) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&logging.level));
    // Logs go to stderr so the report on stdout stays parseable.
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_ansi(logging.ansi)
        .with_writer(std::io::stderr)
        .try_init();
}

async fn simulate(args: &SimulateArgs, config: &SomigConfig) -> Result<MigrationReport> {
    let store = seed_store(args, config);
    let coordinator = Coordinator::new(
        Arc::clone(&store),
        registry().context("Failed to register document types")?,
        config.coordinator_settings(),
    );

    let shutdown = coordinator.shutdown_handle();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            shutdown.trigger("interrupted");
        }
    });

    info!(
        started_at = %chrono::Utc::now().to_rfc3339(),
        prefixes = args.prefixes.len(),
        docs = args.docs,
        "starting simulated migration"
    );
    let plans = args
        .prefixes
        .iter()
        .map(|prefix| IndexPlan::new(prefix.clone(), TARGET_VERSION, mappings()))
        .collect();
    let report = coordinator.migrate(plans).await?;
    info!(
        faults_injected = store.faults_injected(),
        "simulated migration finished"
    );
    Ok(report)
}

fn seed_store(args: &SimulateArgs, config: &SomigConfig) -> Arc<InMemoryStore> {
    let mut store = InMemoryStore::new().with_fault_plan(FaultPlan::seeded(
        config.store.failure_probability,
        config.store.seed,
    ));
    if config.store.latency_ms > 0 {
        store = store.with_latency(Duration::from_millis(config.store.latency_ms));
    }

    for prefix in &args.prefixes {
        let index = if args.legacy {
            IndexName::new(prefix.as_str())
        } else {
            let index = IndexName::target(prefix, SOURCE_VERSION);
            let version_alias = IndexName::version_alias(prefix, SOURCE_VERSION);
            store.insert_index(
                index.clone(),
                Mappings::default(),
                &[prefix.as_str(), version_alias.as_str()],
            );
            index
        };

        let good = (0..args.docs).map(|i| {
            let type_name = DOCUMENT_TYPES[i % DOCUMENT_TYPES.len()];
            MigratableDocument::new(
                format!("{type_name}:{i:06}"),
                type_name,
                SOURCE_VERSION,
                json!({ "title": format!("{type_name} {i}") }),
            )
        });
        let bad = (0..args.bad_docs).map(|i| {
            MigratableDocument::new(
                format!("widget:{i:06}"),
                "widget",
                SOURCE_VERSION,
                json!({}),
            )
        });
        store.insert_documents(index, good.chain(bad));
    }

    Arc::new(store)
}

fn registry() -> Result<TypeRegistry> {
    let mut registry = TypeRegistry::new();

    registry.register(
        TypeDefinition::new("dashboard").migration(TARGET_VERSION, |mut doc| {
            doc.attributes_mut().insert("panels".into(), json!([]));
            Ok(doc)
        }),
    )?;

    registry.register(
        TypeDefinition::new("visualization")
            .migration(SchemaVersion::new(1, 5, 0), |mut doc| {
                let title = doc.attributes_mut().remove("title").unwrap_or_default();
                doc.attributes_mut().insert("name".into(), title);
                Ok(doc)
            })
            .migration(TARGET_VERSION, |mut doc| {
                doc.attributes_mut().insert("params".into(), json!({}));
                Ok(doc)
            }),
    )?;

    registry.register(
        TypeDefinition::new("index-pattern")
            .migration(TARGET_VERSION, Ok)
            .schema(AttributeSchema::new().field("title", FieldKind::String)),
    )?;

    Ok(registry)
}

fn mappings() -> Mappings {
    Mappings::new(json!({
        "dynamic": "strict",
        "properties": {
            "type": { "type": "keyword" },
            "migrationVersion": { "type": "keyword" },
            "dashboard": { "type": "object", "enabled": false },
            "visualization": { "type": "object", "enabled": false },
            "index-pattern": { "type": "object", "enabled": false }
        }
    }))
}

fn print_report(report: &MigrationReport) {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .apply_modifier(UTF8_ROUND_CORNERS)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(
            ["Prefix", "State", "Written", "Total", "Failed docs", "Retries", "Time", "Reason"]
                .map(|h| Cell::new(h).add_attribute(Attribute::Bold)),
        );

    for index in &report.indices {
        let state = if index.is_done() {
            Cell::new(index.control).fg(Color::Green)
        } else {
            Cell::new(index.control).fg(Color::Red)
        };
        let mut reason = index
            .fatal
            .as_ref()
            .map_or_else(String::new, ToString::to_string);
        if index.pit_leaked {
            reason.push_str(" (point-in-time left open)");
        }
        table.add_row(vec![
            Cell::new(&index.prefix),
            state,
            Cell::new(index.docs_written),
            Cell::new(index.docs_total),
            Cell::new(index.transform_errors),
            Cell::new(index.total_retries),
            Cell::new(format!("{}ms", index.elapsed_ms)),
            Cell::new(reason.trim()),
        ]);
    }

    println!("{table}");
    let status = match report.status {
        MigrationStatus::Done => "done",
        MigrationStatus::Fatal => "fatal",
    };
    println!("{status}: {} documents written", report.docs_written());
}
