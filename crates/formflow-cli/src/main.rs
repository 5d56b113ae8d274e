//! formflow CLI - formula and form debugging tool

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use clap::{Args, Parser, Subcommand};
use formflow::prelude::*;
use formflow::RegistryConfiguration;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tracing_subscriber::prelude::*;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "formflow")]
#[command(author, version, about = "Formula and form rule debugging tool")]
struct Cli {
    /// Log debug output to stderr (overrides RUST_LOG)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Form data and field metadata, both optional JSON files
#[derive(Args, Debug, Default)]
struct FormInputs {
    /// JSON object of field values
    #[arg(short, long)]
    data: Option<PathBuf>,

    /// JSON object of field metadata keyed by field id
    #[arg(short, long)]
    fields: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Evaluate a formula against form data
    Eval {
        formula: String,

        #[command(flatten)]
        inputs: FormInputs,

        /// Evaluation instant for NOW()/TODAY() (RFC 3339, default: now)
        #[arg(long)]
        now: Option<DateTime<Utc>>,

        /// Print the formula with macros expanded before the result
        #[arg(long)]
        expand: bool,
    },

    /// Check formula syntax
    Check {
        #[arg(required = true)]
        formulas: Vec<String>,
    },

    /// List the fields a formula references
    Deps { formula: String },

    /// Apply a field change to a calculation/validation configuration
    Calc {
        /// Registry configuration (JSON)
        config: PathBuf,

        /// Field whose value changed
        #[arg(short, long)]
        changed: String,

        #[command(flatten)]
        inputs: FormInputs,

        /// Print the report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show section visibility and progress for form data
    Flow {
        /// Section definitions (JSON array)
        sections: PathBuf,

        #[command(flatten)]
        inputs: FormInputs,

        /// Saved flow state (JSON)
        #[arg(short, long)]
        state: Option<PathBuf>,

        /// Print the report as JSON
        #[arg(long)]
        json: bool,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let stdout = io::stdout();
    let mut out = stdout.lock();
    run(cli.command, &mut out)
}

fn init_logging(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
        .init();
}

fn run(command: Commands, out: &mut dyn Write) -> Result<()> {
    match command {
        Commands::Eval {
            formula,
            inputs,
            now,
            expand,
        } => eval(&formula, &inputs, now.unwrap_or_else(Utc::now), expand, out),
        Commands::Check { formulas } => check(&formulas, out),
        Commands::Deps { formula } => deps(&formula, out),
        Commands::Calc {
            config,
            changed,
            inputs,
            json,
        } => calc(&config, &changed, &inputs, json, out),
        Commands::Flow {
            sections,
            inputs,
            state,
            json,
        } => flow(&sections, &inputs, state.as_deref(), json, out),
    }
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("Failed to read '{}'", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("Failed to parse '{}'", path.display()))
}

impl FormInputs {
    fn load(&self) -> Result<(FormData, FieldMap)> {
        let data = match &self.data {
            Some(path) => read_json(path)?,
            None => FormData::new(),
        };
        let fields = match &self.fields {
            Some(path) => read_json(path)?,
            None => FieldMap::new(),
        };
        Ok((data, fields))
    }
}

fn eval(
    formula: &str,
    inputs: &FormInputs,
    now: DateTime<Utc>,
    expand: bool,
    out: &mut dyn Write,
) -> Result<()> {
    let (data, fields) = inputs.load()?;
    let mut engine = FormulaEngine::new();

    if expand {
        let expanded = engine
            .expand(formula, &data, &fields, now)
            .context("Failed to expand macros")?;
        writeln!(out, "{}", expanded)?;
    }

    let value = engine
        .try_evaluate_at(formula, &data, &fields, now)
        .with_context(|| format!("Failed to evaluate {:?}", formula))?;
    writeln!(out, "{}", value.to_text())?;
    Ok(())
}

fn check(formulas: &[String], out: &mut dyn Write) -> Result<()> {
    let engine = FormulaEngine::new();
    let mut failures = 0;

    for formula in formulas {
        match engine.check(Some(formula)) {
            Ok(()) => writeln!(out, "ok     {}", formula)?,
            Err(e) => {
                failures += 1;
                writeln!(out, "error  {}", formula)?;
                if let Some(position) = e.position() {
                    writeln!(out, "       {}^", " ".repeat(position))?;
                }
                writeln!(out, "       {}", e)?;
            }
        }
    }

    if failures > 0 {
        bail!("{} of {} formulas failed to parse", failures, formulas.len());
    }
    Ok(())
}

fn deps(formula: &str, out: &mut dyn Write) -> Result<()> {
    let engine = FormulaEngine::new();
    engine
        .check(Some(formula))
        .with_context(|| format!("Invalid formula {:?}", formula))?;

    for name in engine.get_dependencies(formula) {
        writeln!(out, "{}", name)?;
    }
    Ok(())
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct CalcReport {
    calculated: Vec<CalculatedValue>,
    violations: Vec<Violation>,
}

fn severity_label(severity: Severity) -> &'static str {
    match severity {
        Severity::Error => "error",
        Severity::Warning => "warning",
        Severity::Info => "info",
    }
}

fn calc(
    config: &Path,
    changed: &str,
    inputs: &FormInputs,
    json: bool,
    out: &mut dyn Write,
) -> Result<()> {
    let config: RegistryConfiguration = read_json(config)?;
    let (mut data, fields) = inputs.load()?;

    let mut registry = CalculationRegistry::new();
    registry.import_configuration(config);
    for field_id in registry.circular_fields() {
        tracing::warn!("{} is part of a dependency cycle", field_id);
    }

    let calculated = registry.apply_change(changed, &mut data, &fields);
    let mut violations = Vec::new();
    for field_id in registry.get_affected_validations(changed) {
        let value = data.get(&field_id).cloned().unwrap_or_default();
        violations.extend(registry.validate_field(&field_id, &value, &data, &fields));
    }
    tracing::debug!(
        "{} recalculated, {} violations",
        calculated.len(),
        violations.len()
    );

    if json {
        let report = CalcReport {
            calculated,
            violations,
        };
        writeln!(out, "{}", serde_json::to_string_pretty(&report)?)?;
        return Ok(());
    }

    for value in &calculated {
        writeln!(out, "{} = {}", value.field_id, value.display)?;
    }
    for violation in &violations {
        writeln!(
            out,
            "{} {}: {}",
            severity_label(violation.severity),
            violation.field_id,
            violation.message
        )?;
    }
    Ok(())
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SectionReport {
    id: String,
    title: String,
    visible: bool,
    required: bool,
    complete: bool,
    current: bool,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct FlowReport {
    sections: Vec<SectionReport>,
    progress: FormProgress,
}

fn flow(
    sections: &Path,
    inputs: &FormInputs,
    state: Option<&Path>,
    json: bool,
    out: &mut dyn Write,
) -> Result<()> {
    let definitions: Vec<Section> = read_json(sections)?;
    let (data, fields) = inputs.load()?;

    let mut flow = SectionFlow::new();
    for section in definitions {
        flow.register_section(section);
    }
    if let Some(path) = state {
        let saved: FlowState = read_json(path)?;
        flow.import_state(saved);
    }
    flow.recalculate_flow(&data, &fields);

    let ids: Vec<(String, String)> = flow
        .get_sections()
        .iter()
        .map(|s| (s.id.clone(), s.title.clone()))
        .collect();
    let mut report = Vec::with_capacity(ids.len());
    for (id, title) in ids {
        report.push(SectionReport {
            visible: flow.is_section_visible(&id, &data, &fields),
            required: flow.is_section_required(&id, &data, &fields),
            complete: flow.is_section_complete(&id, &data, &fields),
            current: flow.current_section_id() == Some(id.as_str()),
            id,
            title,
        });
    }
    let progress = flow.get_form_progress(&data, &fields);

    if json {
        let report = FlowReport {
            sections: report,
            progress,
        };
        writeln!(out, "{}", serde_json::to_string_pretty(&report)?)?;
        return Ok(());
    }

    for section in &report {
        let marker = if section.current { ">" } else { " " };
        let status = match (section.visible, section.complete) {
            (false, _) => "hidden",
            (true, true) => "complete",
            (true, false) => "incomplete",
        };
        let required = if section.visible && section.required {
            " (required)"
        } else {
            ""
        };
        writeln!(
            out,
            "{} {:<16} {:<10} {}{}",
            marker, section.id, status, section.title, required
        )?;
    }
    writeln!(
        out,
        "Progress: {}/{} sections ({}%)",
        progress.completed_sections, progress.visible_sections, progress.percent
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    fn write(dir: &TempDir, name: &str, contents: &str) -> PathBuf {
        let path = dir.path().join(name);
        fs::write(&path, contents).unwrap();
        path
    }

    fn output(command: Commands) -> (Result<()>, String) {
        let mut buf = Vec::new();
        let result = run(command, &mut buf);
        (result, String::from_utf8(buf).unwrap())
    }

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_eval_with_data_file() {
        let dir = TempDir::new().unwrap();
        let data = write(&dir, "data.json", r#"{"Age": 16, "Qty": 3, "Price": 10}"#);

        let (result, text) = output(Commands::Eval {
            formula: r#"IF([Age]>=18,"adult","minor")"#.into(),
            inputs: FormInputs {
                data: Some(data.clone()),
                fields: None,
            },
            now: None,
            expand: false,
        });
        assert!(result.is_ok());
        assert_eq!(text, "minor\n");

        let (result, text) = output(Commands::Eval {
            formula: "SUM([Qty],[Price])*2".into(),
            inputs: FormInputs {
                data: Some(data),
                fields: None,
            },
            now: None,
            expand: true,
        });
        assert!(result.is_ok());
        assert_eq!(text, "13*2\n26\n");
    }

    #[test]
    fn test_eval_missing_file() {
        let (result, _) = output(Commands::Eval {
            formula: "1".into(),
            inputs: FormInputs {
                data: Some(PathBuf::from("/nonexistent/data.json")),
                fields: None,
            },
            now: None,
            expand: false,
        });
        let message = format!("{:#}", result.unwrap_err());
        assert!(message.contains("Failed to read"));
    }

    #[test]
    fn test_check_reports_failures() {
        let (result, text) = output(Commands::Check {
            formulas: vec!["AND([A]=1,[B]=2)".into(), "AND([A]=1".into()],
        });
        assert!(result.is_err());
        assert!(text.starts_with("ok     AND([A]=1,[B]=2)\nerror  AND([A]=1\n"));
    }

    #[test]
    fn test_deps() {
        let (result, text) = output(Commands::Deps {
            formula: "OR([A]=1,[B]=2,[C]=3)".into(),
        });
        assert!(result.is_ok());
        assert_eq!(text, "A\nB\nC\n");
    }

    #[test]
    fn test_calc_prints_values_and_violations() {
        let dir = TempDir::new().unwrap();
        let config = write(
            &dir,
            "config.json",
            r#"{
                "calculations": [
                    {"fieldId": "Total", "formula": "SUM([Qty],[Price])", "format": {"formatType": "currency"}}
                ],
                "validations": [
                    {"fieldId": "Total", "formula": "[Total]<=20", "message": "Total too high"}
                ]
            }"#,
        );
        let data = write(&dir, "data.json", r#"{"Qty": 3, "Price": 30}"#);

        let (result, text) = output(Commands::Calc {
            config,
            changed: "Qty".into(),
            inputs: FormInputs {
                data: Some(data),
                fields: None,
            },
            json: false,
        });
        assert!(result.is_ok());
        assert_eq!(text, "Total = $33.00\nerror Total: Total too high\n");
    }

    #[test]
    fn test_flow_report() {
        let dir = TempDir::new().unwrap();
        let sections = write(
            &dir,
            "sections.json",
            r#"[
                {"id": "a", "title": "Start", "order": 1},
                {"id": "b", "title": "Extra", "order": 2, "showCondition": "[Show]"}
            ]"#,
        );
        let data = write(&dir, "data.json", r#"{"Show": false}"#);
        let state = write(&dir, "state.json", r#"{"currentSectionId": "a"}"#);

        let (result, text) = output(Commands::Flow {
            sections,
            inputs: FormInputs {
                data: Some(data),
                fields: None,
            },
            state: Some(state),
            json: false,
        });
        assert!(result.is_ok());
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].starts_with("> a"));
        assert!(lines[1].contains("hidden"));
        assert_eq!(lines[2], "Progress: 0/1 sections (0%)");
    }
}
