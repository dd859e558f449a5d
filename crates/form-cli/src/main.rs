use clap::{Parser, Subcommand, ValueEnum};
use form_spec::{
    EngineConfig, FormReport, FormSchema, ValueSet, build_graph, check_schema_with,
    initial_values, validate_form_with,
};
use std::fs;
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

type CliResult<T> = Result<T, Box<dyn std::error::Error>>;

#[derive(Parser)]
#[command(
    author,
    version,
    about = "Form schema validation CLI",
    long_about = "Validates submitted values against a form schema, computes derived fields and checks schemas before they are saved"
)]
struct Cli {
    /// Log engine decisions (graph order, unresolved derivations) to stderr.
    #[arg(long, global = true, alias = "debug")]
    verbose: bool,
    #[command(subcommand)]
    command: Command,
}

#[derive(Copy, Clone, Debug, ValueEnum)]
enum SchemaTarget {
    Form,
    Values,
    Config,
}

#[derive(Subcommand)]
enum Command {
    /// Validate a value set against a form schema.
    Validate {
        /// Path to the FormSchema JSON.
        #[arg(long, value_name = "SCHEMA")]
        schema: PathBuf,
        /// Path to the JSON object of submitted values, keyed by field id.
        #[arg(long, value_name = "VALUES")]
        values: PathBuf,
        /// Optional engine config JSON (formula limits).
        #[arg(long, value_name = "CONFIG")]
        config: Option<PathBuf>,
        /// Print the full report as JSON instead of a summary.
        #[arg(long)]
        json: bool,
    },
    /// Run the save-time checks on a form schema.
    Check {
        /// Path to the FormSchema JSON.
        #[arg(long, value_name = "SCHEMA")]
        schema: PathBuf,
        /// Optional engine config JSON (formula limits).
        #[arg(long, value_name = "CONFIG")]
        config: Option<PathBuf>,
    },
    /// Print the order in which derived fields are computed.
    Order {
        /// Path to the FormSchema JSON.
        #[arg(long, value_name = "SCHEMA")]
        schema: PathBuf,
    },
    /// Print the initial values a renderer starts from.
    Defaults {
        /// Path to the FormSchema JSON.
        #[arg(long, value_name = "SCHEMA")]
        schema: PathBuf,
    },
    /// Print the JSON Schema of the schema, values or config documents.
    Schema {
        #[arg(long, value_enum, default_value_t = SchemaTarget::Form)]
        target: SchemaTarget,
    },
}

fn main() -> CliResult<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);
    match cli.command {
        Command::Validate {
            schema,
            values,
            config,
            json,
        } => run_validate(&schema, &values, config.as_deref(), json),
        Command::Check { schema, config } => run_check(&schema, config.as_deref()),
        Command::Order { schema } => run_order(&schema),
        Command::Defaults { schema } => run_defaults(&schema),
        Command::Schema { target } => run_schema(target),
    }
}

fn init_tracing(verbose: bool) {
    let fallback = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

fn load_schema(path: &Path) -> CliResult<FormSchema> {
    let contents = fs::read_to_string(path)?;
    let schema: FormSchema = serde_json::from_str(&contents)?;
    tracing::debug!(
        path = %path.display(),
        form = %schema.id,
        fields = schema.fields.len(),
        "loaded form schema"
    );
    Ok(schema)
}

fn load_values(path: &Path) -> CliResult<ValueSet> {
    let contents = fs::read_to_string(path)?;
    let values = serde_json::from_str(&contents)?;
    Ok(values)
}

fn load_config(path: Option<&Path>) -> CliResult<EngineConfig> {
    let Some(path) = path else {
        return Ok(EngineConfig::default());
    };
    let contents = fs::read_to_string(path)?;
    Ok(EngineConfig::from_json_str(&contents)?)
}

fn run_validate(
    schema_path: &Path,
    values_path: &Path,
    config_path: Option<&Path>,
    json: bool,
) -> CliResult<()> {
    let schema = load_schema(schema_path)?;
    let values = load_values(values_path)?;
    let config = load_config(config_path)?;

    let report = validate_form_with(&schema, &values, &config);
    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        describe_report(&report);
    }

    if report.overall_valid {
        Ok(())
    } else {
        Err("validation failed".into())
    }
}

fn describe_report(report: &FormReport) {
    println!(
        "Validation result: {}",
        if report.overall_valid {
            "valid"
        } else {
            "invalid"
        }
    );
    if let Some(error) = &report.form_error {
        println!("Form error: {error}");
    }
    let mut failing = report.field_errors.failing().peekable();
    if failing.peek().is_some() {
        println!("Errors:");
        for (field, violations) in failing {
            for violation in violations {
                println!("  {} - {}", field, violation.message);
            }
        }
    }
    if !report.resolved_values.is_empty() {
        println!("Resolved values:");
        for (field, value) in report.resolved_values.iter() {
            println!("  {field} = {value}");
        }
    }
}

fn run_check(schema_path: &Path, config_path: Option<&Path>) -> CliResult<()> {
    let schema = load_schema(schema_path)?;
    let config = load_config(config_path)?;

    let issues = check_schema_with(&schema, &config);
    if issues.is_empty() {
        println!("Schema '{}' passed all checks.", schema.name);
        return Ok(());
    }
    println!("Schema '{}' has {} issue(s):", schema.name, issues.len());
    for issue in &issues {
        println!("  - {issue}");
    }
    Err(format!("{} schema issue(s) found", issues.len()).into())
}

fn run_order(schema_path: &Path) -> CliResult<()> {
    let schema = load_schema(schema_path)?;
    let graph = build_graph(&schema)?;
    for id in graph.evaluation_order_ids() {
        println!("{id}");
    }
    Ok(())
}

fn run_defaults(schema_path: &Path) -> CliResult<()> {
    let schema = load_schema(schema_path)?;
    println!("{}", serde_json::to_string_pretty(&initial_values(&schema))?);
    Ok(())
}

fn run_schema(target: SchemaTarget) -> CliResult<()> {
    let schema = match target {
        SchemaTarget::Form => schemars::schema_for!(FormSchema),
        SchemaTarget::Values => schemars::schema_for!(ValueSet),
        SchemaTarget::Config => schemars::schema_for!(EngineConfig),
    };
    println!("{}", serde_json::to_string_pretty(&schema)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_cmd::Command;
    use assert_fs::TempDir;
    use assert_fs::prelude::*;
    use serde_json::{Value, json};
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn signup_schema() -> Value {
        json!({
            "id": "signup",
            "name": "Signup",
            "created_at": "2025-03-01T09:30:00Z",
            "fields": [
                { "id": "name", "label": "Name", "type": "text", "required": true, "min_length": 2 },
                { "id": "age", "label": "Age", "type": "number", "required": true },
                {
                    "id": "ageNextYear",
                    "label": "Age next year",
                    "type": "derived",
                    "parent_field_ids": ["age"],
                    "formula": "age + 1"
                },
                { "id": "terms", "label": "Accept terms", "type": "checkbox" }
            ]
        })
    }

    fn cyclic_schema() -> Value {
        json!({
            "id": "cyclic",
            "name": "Cyclic",
            "created_at": "2025-03-01T09:30:00Z",
            "fields": [
                { "id": "a", "label": "A", "type": "derived", "parent_field_ids": ["b"], "formula": "b" },
                { "id": "b", "label": "B", "type": "derived", "parent_field_ids": ["a"], "formula": "a" }
            ]
        })
    }

    fn write_json(dir: &TempDir, name: &str, value: &Value) -> CliResult<PathBuf> {
        let file = dir.child(name);
        file.write_str(&serde_json::to_string_pretty(value)?)?;
        Ok(file.path().to_path_buf())
    }

    fn stdout_of(output: &std::process::Output) -> CliResult<String> {
        Ok(String::from_utf8(output.stdout.clone())?)
    }

    #[test]
    fn load_config_defaults_without_a_file() -> CliResult<()> {
        assert_eq!(load_config(None)?, EngineConfig::default());
        Ok(())
    }

    #[test]
    fn load_config_reads_partial_limits() -> CliResult<()> {
        let mut file = NamedTempFile::new()?;
        writeln!(file, r#"{{ "max_formula_len": 64 }}"#)?;
        let config = load_config(Some(file.path()))?;
        assert_eq!(config.max_formula_len, 64);
        assert_eq!(
            config.max_formula_nodes,
            EngineConfig::default().max_formula_nodes
        );
        Ok(())
    }

    #[test]
    fn load_config_rejects_zero_limits() -> CliResult<()> {
        let mut file = NamedTempFile::new()?;
        writeln!(file, r#"{{ "max_formula_depth": 0 }}"#)?;
        assert!(load_config(Some(file.path())).is_err());
        Ok(())
    }

    #[test]
    fn validate_reports_valid_form_with_derived_value() -> CliResult<()> {
        let dir = TempDir::new()?;
        let schema = write_json(&dir, "schema.json", &signup_schema())?;
        let values = write_json(&dir, "values.json", &json!({ "name": "Ada", "age": 36 }))?;

        let mut cmd = Command::cargo_bin("formspec")?;
        let assert = cmd
            .arg("validate")
            .arg("--schema")
            .arg(&schema)
            .arg("--values")
            .arg(&values)
            .assert()
            .success();
        let stdout = stdout_of(assert.get_output())?;
        assert!(stdout.contains("Validation result: valid"));
        assert!(stdout.contains("ageNextYear = 37"));
        Ok(())
    }

    #[test]
    fn validate_fails_and_lists_every_violation() -> CliResult<()> {
        let dir = TempDir::new()?;
        let schema = write_json(&dir, "schema.json", &signup_schema())?;
        let values = write_json(&dir, "values.json", &json!({ "name": "A" }))?;

        let mut cmd = Command::cargo_bin("formspec")?;
        let assert = cmd
            .arg("validate")
            .arg("--schema")
            .arg(&schema)
            .arg("--values")
            .arg(&values)
            .assert()
            .failure();
        let stdout = stdout_of(assert.get_output())?;
        assert!(stdout.contains("Validation result: invalid"));
        assert!(stdout.contains("name - Name must be at least 2 characters."));
        assert!(stdout.contains("age - Age is required."));
        assert!(stdout.contains("ageNextYear - Age next year could not be computed"));
        Ok(())
    }

    #[test]
    fn validate_emits_json_report() -> CliResult<()> {
        let dir = TempDir::new()?;
        let schema = write_json(&dir, "schema.json", &signup_schema())?;
        let values = write_json(
            &dir,
            "values.json",
            &json!({ "name": "Ada", "age": "40", "ageNextYear": 1, "extra": true }),
        )?;

        let mut cmd = Command::cargo_bin("formspec")?;
        let assert = cmd
            .arg("validate")
            .arg("--schema")
            .arg(&schema)
            .arg("--values")
            .arg(&values)
            .arg("--json")
            .assert()
            .success();
        let report: Value = serde_json::from_str(&stdout_of(assert.get_output())?)?;
        assert_eq!(report["overall_valid"], json!(true));
        assert_eq!(report["resolved_values"]["ageNextYear"], json!(41.0));
        assert!(report["resolved_values"].get("extra").is_none());
        assert_eq!(report["field_errors"]["name"], json!([]));
        Ok(())
    }

    #[test]
    fn validate_honours_config_limits() -> CliResult<()> {
        let dir = TempDir::new()?;
        let schema = write_json(&dir, "schema.json", &signup_schema())?;
        let values = write_json(&dir, "values.json", &json!({ "name": "Ada", "age": 36 }))?;
        let config = write_json(&dir, "config.json", &json!({ "max_formula_len": 3 }))?;

        let mut cmd = Command::cargo_bin("formspec")?;
        let assert = cmd
            .arg("validate")
            .arg("--schema")
            .arg(&schema)
            .arg("--values")
            .arg(&values)
            .arg("--config")
            .arg(&config)
            .arg("--json")
            .assert()
            .failure();
        let report: Value = serde_json::from_str(&stdout_of(assert.get_output())?)?;
        let violation = &report["field_errors"]["ageNextYear"][0];
        assert_eq!(violation["code"], json!("unresolved"));
        assert_eq!(violation["error"]["error"], json!("syntax"));
        Ok(())
    }

    #[test]
    fn validate_reports_cycle_as_form_error() -> CliResult<()> {
        let dir = TempDir::new()?;
        let schema = write_json(&dir, "schema.json", &cyclic_schema())?;
        let values = write_json(&dir, "values.json", &json!({}))?;

        let mut cmd = Command::cargo_bin("formspec")?;
        let assert = cmd
            .arg("validate")
            .arg("--schema")
            .arg(&schema)
            .arg("--values")
            .arg(&values)
            .assert()
            .failure();
        let stdout = stdout_of(assert.get_output())?;
        assert!(stdout.contains(
            "Form error: derived fields depend on each other in a cycle: a -> b -> a"
        ));
        Ok(())
    }

    #[test]
    fn check_passes_clean_schema_and_lists_issues() -> CliResult<()> {
        let dir = TempDir::new()?;
        let clean = write_json(&dir, "clean.json", &signup_schema())?;
        let mut cmd = Command::cargo_bin("formspec")?;
        let assert = cmd.arg("check").arg("--schema").arg(&clean).assert().success();
        assert!(stdout_of(assert.get_output())?.contains("Schema 'Signup' passed all checks."));

        let broken = write_json(
            &dir,
            "broken.json",
            &json!({
                "id": "broken",
                "name": "",
                "created_at": "2025-03-01T09:30:00Z",
                "fields": [
                    { "id": "color", "label": "", "type": "radio", "options": [] },
                    {
                        "id": "total",
                        "label": "Total",
                        "type": "derived",
                        "parent_field_ids": ["color"],
                        "formula": "color + other"
                    }
                ]
            }),
        )?;
        let mut cmd = Command::cargo_bin("formspec")?;
        let assert = cmd.arg("check").arg("--schema").arg(&broken).assert().failure();
        let stdout = stdout_of(assert.get_output())?;
        assert!(stdout.contains("has 4 issue(s):"));
        assert!(stdout.contains("  - form name cannot be empty"));
        assert!(stdout.contains("  - field 'color' needs a label"));
        assert!(stdout.contains("  - field 'color' needs at least one option"));
        assert!(stdout.contains("reads 'other', which is not one of its parents"));
        Ok(())
    }

    #[test]
    fn order_prints_derived_fields_in_dependency_order() -> CliResult<()> {
        let dir = TempDir::new()?;
        let schema = write_json(
            &dir,
            "schema.json",
            &json!({
                "id": "chain",
                "name": "Chain",
                "created_at": "2025-03-01T09:30:00Z",
                "fields": [
                    { "id": "d2", "label": "D2", "type": "derived", "parent_field_ids": ["d1"], "formula": "d1 + 1" },
                    { "id": "x", "label": "X", "type": "number" },
                    { "id": "d1", "label": "D1", "type": "derived", "parent_field_ids": ["x"], "formula": "x * 2" }
                ]
            }),
        )?;

        let mut cmd = Command::cargo_bin("formspec")?;
        let assert = cmd.arg("order").arg("--schema").arg(&schema).assert().success();
        assert_eq!(stdout_of(assert.get_output())?, "d1\nd2\n");

        let cyclic = write_json(&dir, "cyclic.json", &cyclic_schema())?;
        let mut cmd = Command::cargo_bin("formspec")?;
        cmd.arg("order").arg("--schema").arg(&cyclic).assert().failure();
        Ok(())
    }

    #[test]
    fn defaults_prints_initial_values() -> CliResult<()> {
        let dir = TempDir::new()?;
        let schema = write_json(&dir, "schema.json", &signup_schema())?;

        let mut cmd = Command::cargo_bin("formspec")?;
        let assert = cmd.arg("defaults").arg("--schema").arg(&schema).assert().success();
        let values: Value = serde_json::from_str(&stdout_of(assert.get_output())?)?;
        assert_eq!(values, json!({ "terms": false }));
        Ok(())
    }

    #[test]
    fn schema_command_prints_json_schema() -> CliResult<()> {
        let mut cmd = Command::cargo_bin("formspec")?;
        let assert = cmd.arg("schema").assert().success();
        let schema: Value = serde_json::from_str(&stdout_of(assert.get_output())?)?;
        assert_eq!(schema["title"], json!("FormSchema"));

        let mut cmd = Command::cargo_bin("formspec")?;
        let assert = cmd
            .arg("schema")
            .arg("--target")
            .arg("config")
            .assert()
            .success();
        let schema: Value = serde_json::from_str(&stdout_of(assert.get_output())?)?;
        assert_eq!(schema["title"], json!("EngineConfig"));
        Ok(())
    }
}
