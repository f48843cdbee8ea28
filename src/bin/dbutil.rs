//! dbutil: condition-map queries from the command line
//!
//! # Usage
//!
//! ```bash
//! # Show the SQL only
//! dbutil --dry-run select users -F id,email -w age__gte=18 -w status=active
//!
//! # Run against the database in ./dbutil.toml
//! dbutil one users -w id=5
//! dbutil update users -s status=inactive -w last_login__lt=2024-01-01
//! dbutil delete sessions -w expired=1
//! ```

use std::collections::HashMap;
use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use clap::{Args, Parser, Subcommand, ValueEnum};
use colored::*;
use dbutil::logging::LogConfig;
use dbutil::prelude::*;

#[derive(Parser)]
#[command(name = "dbutil")]
#[command(version)]
#[command(about = "Condition-map SQL for MySQL", long_about = None)]
#[command(after_help = "EXAMPLES:
    dbutil -n select users -F id,email -w age__gte=18 -w status=active
    dbutil count orders -w user_id__in=1,2,3
    dbutil insert users -s name=bob -s age=30 -s manager_id=NULL
    dbutil update users -s status=inactive -w id=7
    dbutil stream events --batch-size 500 -w kind__neq=debug

FILTER VALUES:
    NULL / NOT NULL    IS NULL / IS NOT NULL
    a,b,c              list (with __in / __no_in)
    42, 1.5, true      numbers and booleans, anything else is text")]
struct Cli {
    /// Config file (defaults to ./dbutil.toml, then the user config dir)
    #[arg(short, long, global = true, env = "DBUTIL_CONFIG")]
    config: Option<PathBuf>,

    /// Don't execute, just show the generated SQL
    #[arg(short = 'n', long, global = true)]
    dry_run: bool,

    /// Echo every statement and its params
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Output format
    #[arg(short, long, value_enum, default_value = "table", global = true)]
    format: OutputFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum OutputFormat {
    Table,
    Json,
}

#[derive(Args)]
struct Filter {
    /// Condition as KEY=VALUE, KEY being column or column__op (repeatable)
    #[arg(short = 'w', long = "where", value_name = "KEY=VALUE")]
    conditions: Vec<String>,
}

#[derive(Args)]
struct SelectArgs {
    table: String,

    /// Fields to select (default *)
    #[arg(short = 'F', long, value_delimiter = ',')]
    fields: Vec<String>,

    #[command(flatten)]
    filter: Filter,

    /// Trailing clause such as "ORDER BY id DESC"
    #[arg(short, long, default_value = "")]
    extends: String,

    #[arg(short, long)]
    limit: Option<u64>,

    #[arg(short, long)]
    offset: Option<u64>,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch all matching rows
    Select(SelectArgs),
    /// Fetch the first matching row
    One(SelectArgs),
    /// Count matching rows
    Count {
        table: String,
        #[command(flatten)]
        filter: Filter,
        #[arg(short, long, default_value = "")]
        extends: String,
    },
    /// Fetch matching rows in batches
    Stream {
        #[command(flatten)]
        select: SelectArgs,
        #[arg(short, long, default_value_t = 100)]
        batch_size: usize,
    },
    /// Insert one row
    Insert {
        table: String,
        /// Column value as COLUMN=VALUE (repeatable)
        #[arg(short, long = "set", value_name = "COLUMN=VALUE")]
        set: Vec<String>,
    },
    /// Update matching rows
    Update {
        table: String,
        #[arg(short, long = "set", value_name = "COLUMN=VALUE")]
        set: Vec<String>,
        #[command(flatten)]
        filter: Filter,
    },
    /// Delete matching rows (at least one condition required)
    Delete {
        table: String,
        #[command(flatten)]
        filter: Filter,
    },
}

fn main() {
    let cli = Cli::parse();
    if let Err(e) = run(&cli) {
        eprintln!("{} {:#}", "Error:".red().bold(), e);
        std::process::exit(1);
    }
}

fn run(cli: &Cli) -> Result<()> {
    let config = match &cli.config {
        Some(path) => Config::load(path)?,
        None if cli.dry_run => Config::default(),
        None => Config::discover()?,
    };

    let mut options = config.options.clone();
    if cli.verbose {
        options.level = Level::Debug;
    }
    LogConfig::for_level(options.level).init()?;

    if cli.dry_run {
        return show_sql(&cli.command);
    }

    let session = MySqlSession::connect(&config.database)
        .with_context(|| format!("connecting to {}:{}", config.database.host, config.database.port))?;
    let mut db = DbUtil::new(session, &options);

    match &cli.command {
        Commands::Select(args) => {
            let rows = db.select_many(&to_select(args)?)?;
            format_output(&rows, cli.format);
        }
        Commands::One(args) => {
            let rows: Vec<Row> = db.select_one(&to_select(args)?)?.into_iter().collect();
            format_output(&rows, cli.format);
        }
        Commands::Count { table, filter, extends } => {
            let n = db.count(table, parse_conditions(filter)?, extends)?;
            println!("{}", n.to_string().cyan());
        }
        Commands::Stream { select, batch_size } => {
            let select = to_select(select)?;
            for (i, batch) in db.select_stream(&select, *batch_size)?.enumerate() {
                let batch = batch?;
                println!("{}", format!("batch {} ({} rows)", i + 1, batch.len()).dimmed());
                format_output(&batch, cli.format);
            }
        }
        Commands::Insert { table, set } => {
            let affected = db.insert_one(table, parse_values(set)?)?;
            println!("{} {} rows affected", "✓".green(), affected);
        }
        Commands::Update { table, set, filter } => {
            let affected = db.update(table, parse_values(set)?, parse_conditions(filter)?)?;
            println!("{} {} rows affected", "✓".green(), affected);
        }
        Commands::Delete { table, filter } => {
            let affected = db.delete(table, parse_conditions(filter)?)?;
            println!("{} {} rows affected", "✓".green(), affected);
        }
    }

    db.close()?;
    Ok(())
}

fn show_sql(command: &Commands) -> Result<()> {
    let statement = match command {
        Commands::Select(args) => to_select(args)?.to_statement()?,
        Commands::One(args) => to_select(args)?.to_single_statement()?,
        Commands::Count { table, filter, extends } => Select::count(table.as_str())
            .filter(parse_conditions(filter)?)
            .extends(extends.as_str())
            .to_statement()?,
        Commands::Stream { select, .. } => to_select(select)?.to_statement()?,
        Commands::Insert { table, set } => {
            Insert::new(table.as_str(), parse_values(set)?).to_statement()?
        }
        Commands::Update { table, set, filter } => {
            Update::new(table.as_str(), parse_values(set)?, parse_conditions(filter)?)
                .to_statement()?
        }
        Commands::Delete { table, filter } => {
            Delete::new(table.as_str(), parse_conditions(filter)?).to_statement()?
        }
    };

    println!("{}", "Generated SQL:".green().bold());
    println!("{}", statement.sql.white());
    if !statement.params.is_empty() {
        println!();
        println!("{}", "Params:".cyan());
        for (i, param) in statement.params.iter().enumerate() {
            println!("  %s[{}] = {}", i + 1, param.to_string().yellow());
        }
    }
    Ok(())
}

fn to_select(args: &SelectArgs) -> Result<Select> {
    let mut select = Select::new(args.table.as_str())
        .fields(args.fields.iter().map(String::as_str))
        .filter(parse_conditions(&args.filter)?)
        .extends(args.extends.as_str());
    if let Some(n) = args.limit {
        select = select.limit(n);
    }
    if let Some(n) = args.offset {
        select = select.offset(n);
    }
    Ok(select)
}

fn split_pair(raw: &str) -> Result<(&str, &str)> {
    match raw.split_once('=') {
        Some((key, value)) if !key.trim().is_empty() => Ok((key.trim(), value)),
        _ => bail!("expected KEY=VALUE, got '{}'", raw),
    }
}

fn parse_conditions(filter: &Filter) -> Result<Conditions> {
    let mut conditions = Conditions::new();
    for raw in &filter.conditions {
        let (key, value) = split_pair(raw)?;
        conditions.push(key, parse_filter_value(key, value))?;
    }
    Ok(conditions)
}

fn parse_values(pairs: &[String]) -> Result<Values> {
    let mut values = Values::new();
    for raw in pairs {
        let (column, value) = split_pair(raw)?;
        values = values.set(column, parse_param(value));
    }
    Ok(values)
}

/// Command-line spelling of a filter value. The sentinel strings live only here.
fn parse_filter_value(key: &str, raw: &str) -> FilterValue {
    match raw {
        "NULL" => FilterValue::Null,
        "NOT NULL" => FilterValue::NotNull,
        _ if key.ends_with("__in") || key.ends_with("__no_in") => FilterValue::List(
            raw.split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(parse_param)
                .collect(),
        ),
        _ => parse_param(raw).into(),
    }
}

fn parse_param(raw: &str) -> Param {
    if raw == "NULL" {
        Param::Null
    } else if let Ok(n) = raw.parse::<i64>() {
        Param::Int(n)
    } else if let Ok(f) = raw.parse::<f64>() {
        Param::Float(f)
    } else if raw == "true" {
        Param::Bool(true)
    } else if raw == "false" {
        Param::Bool(false)
    } else {
        Param::Text(raw.to_string())
    }
}

fn format_output(results: &[Row], format: OutputFormat) {
    if results.is_empty() {
        println!("{}", "(no results)".dimmed());
        return;
    }

    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(results).unwrap_or_default());
        }
        OutputFormat::Table => {
            // Column names from the first row, in a stable order
            let mut columns: Vec<&String> = results[0].keys().collect();
            columns.sort();

            // Calculate column widths

            let mut widths: HashMap<&String, usize> =
                columns.iter().map(|c| (*c, c.len())).collect();
            for row in results {
                for (col, val) in row {
                    let len = val_to_string(val).chars().count();
                    if let Some(w) = widths.get_mut(col) {
                        *w = (*w).max(len);
                    }
                }
            }

            // Print header
            let header: Vec<String> = columns
                .iter()
                .map(|c| format!("{:width$}", c, width = widths[*c]))
                .collect();
            println!("{}", header.join(" │ ").white().bold());

            // Print separator
            let sep: Vec<String> = columns.iter().map(|c| "─".repeat(widths[*c])).collect();
            println!("{}", sep.join("─┼─").dimmed());

            // Print rows
            for row in results {
                let cells: Vec<String> = columns
                    .iter()
                    .map(|c| {
                        let val = row.get(*c).map(val_to_string).unwrap_or_default();
                        format!("{:width$}", val, width = widths[*c])
                    })
                    .collect();
                println!("{}", cells.join(" │ "));
            }

            println!();
            println!("{} row(s) returned", results.len().to_string().cyan());
        }
    }
}

fn val_to_string(val: &serde_json::Value) -> String {
    match val {
        serde_json::Value::Null => "NULL".to_string(),
        serde_json::Value::Bool(b) => b.to_string(),
        serde_json::Value::Number(n) => n.to_string(),
        serde_json::Value::String(s) => s.clone(),
        _ => val.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_filter_sentinels() {
        assert_eq!(parse_filter_value("deleted_at", "NULL"), FilterValue::Null);
        assert_eq!(parse_filter_value("email", "NOT NULL"), FilterValue::NotNull);
    }

    #[test]
    fn test_parse_filter_list() {
        assert_eq!(
            parse_filter_value("id__in", "1, 2,x"),
            FilterValue::List(vec![Param::Int(1), Param::Int(2), Param::Text("x".into())])
        );
    }

    #[test]
    fn test_parse_param() {
        assert_eq!(parse_param("42"), Param::Int(42));
        assert_eq!(parse_param("1.5"), Param::Float(1.5));
        assert_eq!(parse_param("true"), Param::Bool(true));
        assert_eq!(parse_param("NULL"), Param::Null);
        assert_eq!(parse_param("bob"), Param::Text("bob".into()));
    }

    #[test]
    fn test_split_pair() {
        assert_eq!(split_pair("age__gte=18").unwrap(), ("age__gte", "18"));
        assert_eq!(split_pair("note=a=b").unwrap(), ("note", "a=b"));
        assert!(split_pair("novalue").is_err());
        assert!(split_pair("=1").is_err());
    }

    #[test]
    fn test_dry_run_statement() {
        let args = SelectArgs {
            table: "users".into(),
            fields: vec!["id".into()],
            filter: Filter {
                conditions: vec!["age__gte=18".into(), "status=active".into()],
            },
            extends: String::new(),
            limit: Some(5),
            offset: None,
        };
        let stmt = to_select(&args).unwrap().to_statement().unwrap();
        assert_eq!(
            stmt.sql,
            "SELECT id FROM users WHERE age >= %s AND status = %s LIMIT 5"
        );
    }
}
