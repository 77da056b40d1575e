use anyhow::{anyhow, Result};
use clap::{Parser, Subcommand};
use lab_table::{
    build_columns, flatten_leaf_columns, load_repo_output, load_state, load_table_config,
    write_config_template, write_state, Column, Experiment, FilterDefinition, Operator, Primitive,
    SortDefinition, TableConfig,
};
use serde_json::{json, Value};
use std::path::PathBuf;
use tracing::debug;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

#[derive(Parser)]
#[command(name = "lab", version = "0.3.0", about = "Experiment table CLI")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Render the experiment table for a tracker output file.
    Show {
        output: PathBuf,
        #[arg(long)]
        config: Option<PathBuf>,
        #[arg(long)]
        state: Option<PathBuf>,
        /// "PATH OP [VALUE]", repeatable
        #[arg(long = "filter")]
        filters: Vec<String>,
        /// "PATH[:desc]", repeatable
        #[arg(long = "sort")]
        sorts: Vec<String>,
        #[arg(long = "select")]
        select: Vec<String>,
        #[arg(long)]
        json: bool,
    },
    /// Print the inferred column schema.
    Columns {
        output: PathBuf,
        #[arg(long)]
        leaves: bool,
        #[arg(long)]
        json: bool,
    },
    InitConfig {
        #[arg(long, default_value = "table.yaml")]
        path: PathBuf,
        #[arg(long)]
        force: bool,
        #[arg(long)]
        json: bool,
    },
}

fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();
    let json_mode = command_json_mode(&cli.command);
    let result = run_command(cli.command);
    match result {
        Ok(Some(payload)) => {
            emit_json(&payload);
            Ok(())
        }
        Ok(None) => Ok(()),
        Err(err) => {
            if json_mode {
                emit_json(&json_error("command_failed", err.to_string(), json!({})));
                std::process::exit(1);
            }
            Err(err)
        }
    }
}

fn init_tracing() {
    // stdout carries JSON payloads, so logs go to stderr
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_env("LAB_LOG")
                .unwrap_or_else(|_| "warn".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn run_command(command: Commands) -> Result<Option<Value>> {
    match command {
        Commands::Show {
            output,
            config,
            state,
            filters,
            sorts,
            select,
            json,
        } => {
            let config = match &config {
                Some(path) => load_table_config(path)?,
                None => TableConfig::default(),
            };
            let saved = match &state {
                Some(path) => load_state(path)?,
                None => None,
            };
            let mut model = config.build_model(saved);
            model.transform_and_set(load_repo_output(&output)?)?;
            for raw in &filters {
                model.add_filter(parse_filter(raw)?)?;
            }
            for raw in &sorts {
                model.add_sort(parse_sort(raw)?)?;
            }
            if !select.is_empty() {
                model.set_selected(select);
            }
            if let Some(path) = &state {
                write_state(path, &model.persisted_state())?;
                debug!(path = %path.display(), "table state saved");
            }
            if json {
                return Ok(Some(json!({
                    "ok": true,
                    "command": "show",
                    "table": serde_json::to_value(model.snapshot())?
                })));
            }
            print_rows(&model.rows(), 0);
            println!(
                "rows: {} ({} filtered)",
                model.row_count(),
                model.filtered_count()
            );
            println!("selected: {}", model.selected_ids().join(", "));
            if !model.is_filter_driven() {
                println!("selection: manual");
            }
        }
        Commands::Columns {
            output,
            leaves,
            json,
        } => {
            let columns = build_columns(&load_repo_output(&output)?);
            let columns = if leaves {
                flatten_leaf_columns(&columns)
            } else {
                columns
            };
            if json {
                return Ok(Some(json!({
                    "ok": true,
                    "command": "columns",
                    "columns": serde_json::to_value(&columns)?
                })));
            }
            if leaves {
                for column in &columns {
                    println!("{}", describe_column(column));
                }
            } else {
                print_columns(&columns, 0);
            }
        }
        Commands::InitConfig { path, force, json } => {
            write_config_template(&path, force)?;
            if json {
                return Ok(Some(json!({
                    "ok": true,
                    "command": "init-config",
                    "path": path.display().to_string()
                })));
            }
            println!("wrote: {}", path.display());
        }
    }
    Ok(None)
}

fn emit_json(value: &Value) {
    match serde_json::to_string(value) {
        Ok(s) => println!("{}", s),
        Err(_) => println!(
            "{{\"ok\":false,\"error\":{{\"code\":\"serialization_error\",\"message\":\"failed to serialize JSON payload\",\"details\":{{}}}}}}"
        ),
    }
}

fn json_error(code: &str, message: String, details: Value) -> Value {
    json!({
        "ok": false,
        "error": {
            "code": code,
            "message": message,
            "details": details
        }
    })
}

fn command_json_mode(command: &Commands) -> bool {
    match command {
        Commands::Show { json, .. }
        | Commands::Columns { json, .. }
        | Commands::InitConfig { json, .. } => *json,
    }
}

fn parse_filter_value(raw: &str) -> Primitive {
    let parsed = serde_json::from_str::<Value>(raw).unwrap_or(Value::String(raw.to_string()));
    Primitive::from(parsed)
}

fn parse_filter(raw: &str) -> Result<FilterDefinition> {
    let mut parts = raw.trim().splitn(3, char::is_whitespace);
    let path = parts
        .next()
        .filter(|p| !p.is_empty())
        .ok_or_else(|| anyhow!("invalid --filter '{}': expected PATH OP [VALUE]", raw))?;
    let operator: Operator = parts
        .next()
        .ok_or_else(|| anyhow!("invalid --filter '{}': missing operator", raw))?
        .parse()?;
    let value = parts
        .next()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(parse_filter_value);
    Ok(FilterDefinition::new(path, operator, value))
}

fn parse_sort(raw: &str) -> Result<SortDefinition> {
    let raw = raw.trim();
    let (path, descending) = if let Some(path) = raw.strip_suffix(":desc") {
        (path, true)
    } else if let Some(path) = raw.strip_suffix(":asc") {
        (path, false)
    } else {
        (raw, false)
    };
    if path.is_empty() {
        return Err(anyhow!("invalid --sort '{}': path cannot be empty", raw));
    }
    Ok(SortDefinition::new(path, descending))
}

fn print_rows(rows: &[Experiment], depth: usize) {
    for row in rows {
        let color = row.display_color.as_deref().unwrap_or("-");
        let queued = if row.is_queued() { " (queued)" } else { "" };
        println!(
            "{}{:<8} {}{}",
            "  ".repeat(depth),
            color,
            row.display_name,
            queued
        );
        print_rows(&row.sub_rows, depth + 1);
    }
}

fn describe_column(column: &Column) -> String {
    let types = column
        .types
        .as_ref()
        .map(|types| types.iter().map(|t| t.as_str()).collect::<Vec<_>>().join("|"))
        .unwrap_or_default();
    let mut line = format!("{} [{}]", column.path, types);
    if let Some(len) = column.max_string_length {
        line.push_str(&format!(" width={}", len));
    }
    if let (Some(min), Some(max)) = (column.min_number, column.max_number) {
        line.push_str(&format!(" range={}..{}", min, max));
    }
    line
}

fn print_columns(columns: &[Column], depth: usize) {
    for column in columns {
        if column.is_leaf() {
            println!("{}{}", "  ".repeat(depth), describe_column(column));
        } else {
            println!("{}{}", "  ".repeat(depth), column.name);
        }
        if let Some(children) = &column.child_columns {
            print_columns(children, depth + 1);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filter_values_parse_as_json_then_text() {
        let filter = parse_filter("params:params.yaml:epochs >= 5").expect("numeric filter");
        assert_eq!(filter.path, "params:params.yaml:epochs");
        assert_eq!(filter.operator, Operator::GreaterThanOrEqual);
        assert_eq!(filter.value, Some(Primitive::Number(5.0)));

        let filter = parse_filter("params:params.yaml:opt ∈ adam w").expect("text filter");
        assert_eq!(filter.value, Some(Primitive::from("adam w")));

        let filter = parse_filter("metrics:metrics.json:acc ≠Ø").expect("unary filter");
        assert_eq!(filter.operator, Operator::NotMissing);
        assert_eq!(filter.value, None);
    }

    #[test]
    fn bad_filters_are_rejected() {
        assert!(parse_filter("").is_err());
        assert!(parse_filter("params:params.yaml:epochs").is_err());
        let err = parse_filter("params:params.yaml:epochs ~ 5").expect_err("unknown operator");
        assert!(err.to_string().contains("~"), "unexpected error: {}", err);
    }

    #[test]
    fn sort_direction_comes_from_suffix() {
        let sort = parse_sort("metrics:metrics.json:acc:desc").expect("desc sort");
        assert_eq!(sort, SortDefinition::new("metrics:metrics.json:acc", true));
        let sort = parse_sort("params:params.yaml:lr").expect("plain sort");
        assert_eq!(sort, SortDefinition::new("params:params.yaml:lr", false));
        let sort = parse_sort("params:params.yaml:lr:asc").expect("asc sort");
        assert!(!sort.descending);
        assert!(parse_sort(":desc").is_err());
    }

    #[test]
    fn json_errors_use_the_envelope() {
        let err = json_error("command_failed", "boom".to_string(), json!({}));
        assert_eq!(err["ok"], json!(false));
        assert_eq!(err["error"]["code"], json!("command_failed"));
    }
}
