//! Lenscope CLI - Compile metric queries to SQL
//!
//! Usage:
//!   lenscope compile --explore <explore.json> --query <query.json> [--dialect <dialect>]
//!   lenscope validate --explore <explore.json>
//!   lenscope list --explore <explore.json>
//!
//! Examples:
//!   lenscope compile --explore orders.json --query revenue.json --dialect bigquery
//!   lenscope compile -e orders.json -q revenue.json -p params.json --output json
//!   lenscope validate -e orders.json

use clap::{Parser, Subcommand, ValueEnum};
use lenscope::compiler::{compile, validate_explore, CompileRequest};
use lenscope::config::Settings;
use lenscope::query::{IntrinsicUserAttributes, MetricQuery, Parameters, UserAttributes, WeekDay};
use lenscope::semantic::Explore;
use lenscope::sql::Dialect;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing::debug;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "lenscope")]
#[command(about = "Lenscope - Compile explore metric queries to dialect-correct SQL")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compile a metric query against an explore
    Compile {
        /// Path to the explore JSON file
        #[arg(short, long)]
        explore: PathBuf,

        /// Path to the metric query JSON file
        #[arg(short, long)]
        query: PathBuf,

        /// SQL dialect to generate (defaults to the configured dialect)
        #[arg(short, long)]
        dialect: Option<DialectArg>,

        /// Path to a JSON object of parameter values
        #[arg(short, long)]
        parameters: Option<PathBuf>,

        /// Path to a JSON file of user attributes
        #[arg(short, long)]
        attributes: Option<PathBuf>,

        /// Timezone for relative date filters (defaults to the configured timezone)
        #[arg(short, long)]
        timezone: Option<String>,

        /// First day of the week, used to order day-name dimensions
        #[arg(long)]
        start_of_week: Option<WeekDay>,

        /// Output format
        #[arg(short, long, default_value = "sql")]
        output: OutputFormat,
    },

    /// List the tables, fields and joins of an explore
    List {
        /// Path to the explore JSON file
        #[arg(short, long)]
        explore: PathBuf,
    },

    /// Validate an explore without compiling a query
    Validate {
        /// Path to the explore JSON file
        #[arg(short, long)]
        explore: PathBuf,

        /// SQL dialect to validate against
        #[arg(short, long)]
        dialect: Option<DialectArg>,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum DialectArg {
    Postgres,
    Redshift,
    Bigquery,
    Snowflake,
}

impl From<DialectArg> for Dialect {
    fn from(arg: DialectArg) -> Self {
        match arg {
            DialectArg::Postgres => Dialect::Postgres,
            DialectArg::Redshift => Dialect::Redshift,
            DialectArg::Bigquery => Dialect::BigQuery,
            DialectArg::Snowflake => Dialect::Snowflake,
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum OutputFormat {
    /// Just the SQL
    Sql,
    /// SQL, warnings and used parameters as JSON
    Json,
}

/// Shape of the `--attributes` file.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct AttributesFile {
    user_attributes: UserAttributes,
    intrinsic_user_attributes: IntrinsicUserAttributes,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let settings = match Settings::load() {
        Ok(s) => s,
        Err(e) => {
            eprintln!("Error loading configuration: {}", e);
            return ExitCode::FAILURE;
        }
    };

    init_logger(&settings.log.filter);

    match cli.command {
        Commands::Compile {
            explore,
            query,
            dialect,
            parameters,
            attributes,
            timezone,
            start_of_week,
            output,
        } => {
            let options = CompileOptions {
                dialect: dialect.map(Into::into).unwrap_or(settings.compiler.dialect),
                timezone: timezone.unwrap_or_else(|| settings.compiler.timezone.clone()),
                start_of_week: start_of_week.unwrap_or(settings.compiler.start_of_week),
                default_limit: settings.compiler.default_limit,
            };
            cmd_compile(explore, query, parameters, attributes, options, output)
        }
        Commands::List { explore } => cmd_list(explore),
        Commands::Validate { explore, dialect } => cmd_validate(
            explore,
            dialect.map(Into::into).unwrap_or(settings.compiler.dialect),
        ),
    }
}

/// Log to stderr, filtered by `LENSCOPE_LOG` or else the configured filter.
fn init_logger(default_filter: &str) {
    let filter = EnvFilter::try_from_env("LENSCOPE_LOG")
        .or_else(|_| EnvFilter::try_new(default_filter))
        .unwrap_or_else(|_| EnvFilter::new("warn"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|err| eprintln!("Error initializing the logger: {err}"))
        .ok();
}

struct CompileOptions {
    dialect: Dialect,
    timezone: String,
    start_of_week: WeekDay,
    default_limit: Option<u64>,
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T, String> {
    let source = fs::read_to_string(path)
        .map_err(|e| format!("Error reading file '{}': {}", path.display(), e))?;
    serde_json::from_str(&source)
        .map_err(|e| format!("Error parsing file '{}': {}", path.display(), e))
}

fn read_optional_json<T: DeserializeOwned + Default>(path: Option<&Path>) -> Result<T, String> {
    match path {
        Some(path) => read_json(path),
        None => Ok(T::default()),
    }
}

fn cmd_compile(
    explore_file: PathBuf,
    query_file: PathBuf,
    parameters_file: Option<PathBuf>,
    attributes_file: Option<PathBuf>,
    options: CompileOptions,
    output: OutputFormat,
) -> ExitCode {
    let inputs = (|| -> Result<_, String> {
        let explore: Explore = read_json(&explore_file)?;
        let query: MetricQuery = read_json(&query_file)?;
        let parameters: Parameters = read_optional_json(parameters_file.as_deref())?;
        let attributes: AttributesFile = read_optional_json(attributes_file.as_deref())?;
        Ok((explore, query, parameters, attributes))
    })();

    let (explore, mut query, parameters, attributes) = match inputs {
        Ok(inputs) => inputs,
        Err(e) => {
            eprintln!("{}", e);
            return ExitCode::FAILURE;
        }
    };

    if query.limit.is_none() {
        query.limit = options.default_limit;
    }

    debug!(
        explore = %explore.name,
        dialect = %options.dialect,
        timezone = %options.timezone,
        "compiling metric query"
    );

    let request = CompileRequest::new(&explore, &query)
        .with_dialect(options.dialect)
        .with_timezone(&options.timezone)
        .with_start_of_week(options.start_of_week)
        .with_parameters(parameters)
        .with_user_attributes(attributes.user_attributes)
        .with_intrinsic_user_attributes(attributes.intrinsic_user_attributes);

    match compile(&request) {
        Ok(compiled) => {
            match output {
                OutputFormat::Sql => {
                    for warning in &compiled.warnings {
                        eprintln!("Warning: {}", warning.message);
                    }
                    println!("{}", compiled.sql);
                }
                OutputFormat::Json => match serde_json::to_string_pretty(&compiled) {
                    Ok(json) => println!("{}", json),
                    Err(e) => {
                        eprintln!("Error serializing output: {}", e);
                        return ExitCode::FAILURE;
                    }
                },
            }
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("Compilation error: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn cmd_list(explore_file: PathBuf) -> ExitCode {
    let explore: Explore = match read_json(&explore_file) {
        Ok(e) => e,
        Err(e) => {
            eprintln!("{}", e);
            return ExitCode::FAILURE;
        }
    };

    println!("Explore: {} (base table: {})", explore.name, explore.base_table);
    for (name, table) in &explore.tables {
        println!();
        println!("Table: {}", name);
        for (field, dimension) in &table.dimensions {
            match &dimension.time_interval {
                Some(interval) => {
                    println!("  dimension {}.{} ({:?}, {:?})", name, field, dimension.value_type, interval)
                }
                None => println!("  dimension {}.{} ({:?})", name, field, dimension.value_type),
            }
        }
        for (field, metric) in &table.metrics {
            println!("  metric    {}.{} ({:?})", name, field, metric.metric_type);
        }
    }

    if !explore.joined_tables.is_empty() {
        println!();
        println!("Joins:");
        for join in &explore.joined_tables {
            let relationship = join
                .relationship
                .map(|r| r.to_string())
                .unwrap_or_else(|| "?".to_string());
            println!("  {} {} [{}]", join.join_type.keyword(), join.table, relationship);
        }
    }

    ExitCode::SUCCESS
}

fn cmd_validate(explore_file: PathBuf, dialect: Dialect) -> ExitCode {
    let explore: Explore = match read_json(&explore_file) {
        Ok(e) => e,
        Err(e) => {
            eprintln!("{}", e);
            return ExitCode::FAILURE;
        }
    };

    let issues = validate_explore(&explore, &dialect);
    if issues.is_empty() {
        println!("OK: explore '{}' is valid", explore.name);
        return ExitCode::SUCCESS;
    }

    eprintln!("Validation errors:");
    for issue in &issues {
        eprintln!("  {}", issue);
    }
    ExitCode::FAILURE
}
