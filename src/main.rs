//! Lineage CLI - Collect Mathematics Genealogy records into SQLite

use std::collections::{HashSet, VecDeque};
use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::{Parser, Subcommand};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use lineage::db::schema;
use lineage::fetch::{DEFAULT_TTL, UrlCache};
use lineage::{Db, Record, Value, config, model, scrape};

#[derive(Parser)]
#[command(name = "lineage")]
#[command(version)]
#[command(about = "Collect academic-lineage records from the Mathematics Genealogy Project")]
#[command(long_about = r#"
Lineage scrapes mathematician pages and persists them into a SQLite database
through a typed-record engine: repeated ingests of the same pages converge
instead of duplicating rows.

Example usage:
  lineage init
  lineage ingest --id 18231 --depth 2
  lineage show --id 18231
  lineage stats
"#)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Path to the config file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a default lineage.toml in the current directory
    Init {
        /// Overwrite an existing config
        #[arg(short, long)]
        force: bool,
    },

    /// Fetch mathematician pages and persist their records
    Ingest {
        /// Root mathematician page id
        #[arg(short, long)]
        id: i64,

        /// How many advisor/student hops to follow from the root
        #[arg(short, long, default_value = "0")]
        depth: usize,

        /// Stop after this many pages
        #[arg(short, long, default_value = "200")]
        limit: usize,

        /// Path to the database file
        #[arg(long)]
        database: Option<PathBuf>,

        /// Directory for the on-disk response cache
        #[arg(long)]
        cache_dir: Option<PathBuf>,

        /// Response cache time-to-live in seconds (0 disables caching)
        #[arg(long)]
        cache_ttl_secs: Option<u64>,
    },

    /// Print one mathematician record, nested references resolved
    Show {
        /// Mathematician page id
        #[arg(short, long)]
        id: i64,

        /// Path to the database file
        #[arg(long)]
        database: Option<PathBuf>,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Show row counts for every table
    Stats {
        /// Path to the database file
        #[arg(long)]
        database: Option<PathBuf>,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };

    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(filter)
        .init();

    let config = config::load_config(cli.config.as_deref())?.unwrap_or_default();

    match cli.command {
        Commands::Init { force } => run_init(force),
        Commands::Ingest {
            id,
            depth,
            limit,
            database,
            cache_dir,
            cache_ttl_secs,
        } => {
            let database = resolve_database(database, &config);
            let cache_dir = cache_dir
                .or_else(|| config.cache_dir.as_ref().map(PathBuf::from))
                .unwrap_or_else(|| config::default_cache_dir_in(Path::new(".")));
            let ttl = cache_ttl_secs
                .or(config.cache_ttl_secs)
                .map(Duration::from_secs)
                .unwrap_or(DEFAULT_TTL);
            run_ingest(id, depth, limit, &database, &cache_dir, ttl)
        }
        Commands::Show { id, database, format } => {
            run_show(id, &resolve_database(database, &config), &format)
        }
        Commands::Stats { database, format } => {
            run_stats(&resolve_database(database, &config), &format)
        }
    }
}

fn resolve_database(flag: Option<PathBuf>, config: &config::LineageConfig) -> PathBuf {
    flag.or_else(|| config.database.as_ref().map(PathBuf::from))
        .unwrap_or_else(|| config::default_database_path_in(Path::new(".")))
}

fn run_init(force: bool) -> anyhow::Result<()> {
    let base = Path::new(".");
    let config = config::LineageConfig {
        database: Some(config::default_database_path_in(base).display().to_string()),
        cache_dir: Some(config::default_cache_dir_in(base).display().to_string()),
        cache_ttl_secs: Some(DEFAULT_TTL.as_secs()),
        base_url: Some(scrape::BASE_URL.to_string()),
    };
    let path = config::default_config_path();
    config::write_config(&path, &config, force)?;
    println!("Wrote {}", path.display());
    Ok(())
}

fn open_db(database: &Path) -> anyhow::Result<Db> {
    config::ensure_db_dir(database)?;
    let db = Db::open(database, model::genealogy_registry()?)?;
    db.init_schema(&schema::all_schema_statements())?;
    Ok(db)
}

fn run_ingest(
    root: i64,
    depth: usize,
    limit: usize,
    database: &Path,
    cache_dir: &Path,
    ttl: Duration,
) -> anyhow::Result<()> {
    tracing::info!("Ingesting id {} (depth {}) into {:?}", root, depth, database);

    let db = open_db(database)?;
    let cache = UrlCache::new(cache_dir, Some(ttl));

    let mut queue = VecDeque::from([(root, 0usize)]);
    let mut seen = HashSet::from([root]);
    let mut fetched: HashSet<i64> = HashSet::new();
    // (advisor, advisee) pairs; edges are persisted only once both endpoint
    // rows exist, so a shallow crawl never references unfetched pages
    let mut edges: Vec<(i64, i64)> = Vec::new();

    while let Some((id, hops)) = queue.pop_front() {
        if fetched.len() >= limit {
            tracing::warn!("Page limit {} reached, stopping crawl", limit);
            break;
        }

        let url = scrape::mathematician_url(id);
        let body = match cache.fetch(&url) {
            Ok(body) => body,
            Err(e) => {
                tracing::warn!("Failed to fetch id {}: {}", id, e);
                continue;
            }
        };
        let html = String::from_utf8_lossy(&body);
        let page = match scrape::parse_mathematician_page(id, &html) {
            Ok(page) => page,
            Err(e) => {
                tracing::warn!("Failed to parse id {}: {}", id, e);
                continue;
            }
        };

        let records = scrape::page_records(&page, chrono::Utc::now().naive_utc());
        db.persist(&records.mathematician)?;
        db.persist(&records.webpage)?;
        for link in &records.links {
            db.persist(link)?;
        }
        fetched.insert(id);
        tracing::info!("Ingested {} ({})", page.name, id);

        for &advisor in &page.advisor_ids {
            edges.push((advisor, id));
            if hops < depth && seen.insert(advisor) {
                queue.push_back((advisor, hops + 1));
            }
        }
        for &student in &page.student_ids {
            edges.push((id, student));
            if hops < depth && seen.insert(student) {
                queue.push_back((student, hops + 1));
            }
        }
    }

    let mut linked = 0;
    for (advisor, advisee) in edges {
        if fetched.contains(&advisor) && fetched.contains(&advisee) {
            db.persist(&model::advisor_relationship(advisor, advisee, None))?;
            linked += 1;
        }
    }

    println!("Ingested {} pages, {} advisor edges", fetched.len(), linked);
    println!("{}", db.stats()?);
    Ok(())
}

fn run_show(id: i64, database: &Path, format: &str) -> anyhow::Result<()> {
    let db = open_db(database)?.read_only();
    match db.get("Mathematician", id)? {
        Some(record) => {
            if format == "json" {
                println!("{}", serde_json::to_string_pretty(&record_to_json(&record))?);
            } else {
                print_record(&record, 0);
            }
            Ok(())
        }
        None => anyhow::bail!("no mathematician with id {id}"),
    }
}

fn run_stats(database: &Path, format: &str) -> anyhow::Result<()> {
    let db = open_db(database)?.read_only();
    let stats = db.stats()?;
    if format == "json" {
        let map: serde_json::Map<String, serde_json::Value> = stats
            .tables
            .iter()
            .map(|(table, count)| (table.clone(), serde_json::json!(count)))
            .collect();
        println!("{}", serde_json::to_string_pretty(&map)?);
    } else {
        print!("{stats}");
    }
    Ok(())
}

fn print_record(record: &Record, indent: usize) {
    let pad = "  ".repeat(indent);
    println!("{pad}{}:", record.type_name());
    for (field, value) in record.iter() {
        match value {
            Value::Record(nested) => {
                println!("{pad}  {field}:");
                print_record(nested, indent + 2);
            }
            Value::Null => println!("{pad}  {field}: -"),
            other => println!("{pad}  {field}: {}", scalar_display(other)),
        }
    }
}

fn scalar_display(value: &Value) -> String {
    match value {
        Value::Null => "-".to_string(),
        Value::Integer(n) => n.to_string(),
        Value::Real(f) => f.to_string(),
        Value::Text(s) => s.clone(),
        Value::Timestamp(t) => t.to_string(),
        Value::Date(d) => d.to_string(),
        Value::Record(r) => format!("<{}>", r.type_name()),
    }
}

fn record_to_json(record: &Record) -> serde_json::Value {
    let mut map = serde_json::Map::new();
    for (field, value) in record.iter() {
        map.insert(field.to_string(), value_to_json(value));
    }
    serde_json::Value::Object(map)
}

fn value_to_json(value: &Value) -> serde_json::Value {
    match value {
        Value::Null => serde_json::Value::Null,
        Value::Integer(n) => serde_json::json!(n),
        Value::Real(f) => serde_json::json!(f),
        Value::Text(s) => serde_json::json!(s),
        Value::Date(d) => serde_json::json!(d.to_string()),
        Value::Timestamp(t) => serde_json::json!(t.to_string()),
        Value::Record(nested) => record_to_json(nested),
    }
}
