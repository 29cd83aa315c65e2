//! Rulecraft CLI - rule-set checker
//!
//! Loads rule-set documents, resolves their references and reports every
//! problem found on the way.

use clap::{Parser, ValueEnum};
use colored::Colorize;
use rayon::prelude::*;
use rulecraft::{
    CollectingReporter, Config, Diagnostic, Location, PropertyOverride, RuleDef, RulePriority,
    RuleSet, RuleSetError, RuleSetLoader, RuleSetWriter, Severity,
};
use serde::Serialize;
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "rulecraft",
    version,
    about = "Rule-set checker",
    long_about = "Loads XML rule-set documents, resolves rule references and reports problems."
)]
struct Cli {
    /// Rule-set files to check
    #[arg(required = true)]
    files: Vec<String>,

    /// Configuration file path
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Output format
    #[arg(short, long, value_enum, default_value = "text")]
    format: Format,

    /// Directory searched for referenced rule-sets (repeatable)
    #[arg(short = 'I', long = "search-path")]
    search_paths: Vec<PathBuf>,

    /// Drop rules less severe than this (1 = high .. 5 = low)
    #[arg(long)]
    min_priority: Option<RulePriority>,

    /// Set a rule property, e.g. -P TooManyMethods:maxMethods=20
    #[arg(short = 'P', long = "property", value_name = "RULE:PROPERTY=VALUE")]
    properties: Vec<PropertyOverride>,

    /// Print the resolved rule-set as XML
    #[arg(long)]
    dump: bool,

    /// List the rules of each rule-set
    #[arg(long)]
    list_rules: bool,

    /// Disable colored output
    #[arg(long)]
    no_color: bool,

    /// Number of parallel jobs (0 = auto)
    #[arg(short, long, default_value = "0")]
    jobs: usize,
}

#[derive(Clone, Copy, ValueEnum)]
enum Format {
    Text,
    Json,
}

/// Outcome of loading one rule-set file
struct FileReport {
    file: String,
    rule_set: Option<RuleSet>,
    diagnostics: Vec<Diagnostic>,
}

impl FileReport {
    fn has_errors(&self) -> bool {
        self.diagnostics.iter().any(Diagnostic::is_error)
    }
}

#[derive(Serialize)]
struct JsonRule {
    name: String,
    language: String,
    priority: RulePriority,
    reference: bool,
    deprecated: bool,
}

#[derive(Serialize)]
struct JsonReport<'a> {
    file: &'a str,
    name: Option<&'a str>,
    rules: Vec<JsonRule>,
    diagnostics: &'a [Diagnostic],
}

fn main() {
    // Initialize logger
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let cli = Cli::parse();

    if cli.no_color {
        colored::control::set_override(false);
    }

    if cli.jobs > 0 {
        if let Err(e) = rayon::ThreadPoolBuilder::new()
            .num_threads(cli.jobs)
            .build_global()
        {
            log::warn!("Cannot configure thread pool: {}", e);
        }
    }

    let mut config = if let Some(config_path) = &cli.config {
        Config::load(config_path).unwrap_or_else(|e| {
            eprintln!("{}: Failed to load config: {}", "error".red().bold(), e);
            std::process::exit(1);
        })
    } else {
        Config::load_default().unwrap_or_default()
    };
    config.merge_cli(cli.min_priority, cli.search_paths.clone());

    let loader = config.loader().unwrap_or_else(|e| {
        eprintln!("{}: Invalid configuration: {}", "error".red().bold(), e);
        std::process::exit(1);
    });

    let mut overrides = config.property_overrides();
    overrides.extend(cli.properties.iter().cloned());

    let reports: Vec<FileReport> = cli
        .files
        .par_iter()
        .map(|file| check_file(&loader, file, &overrides))
        .collect();

    let failed = match cli.format {
        Format::Text => print_text(&reports, &cli),
        Format::Json => print_json(&reports),
    };
    if failed {
        std::process::exit(1);
    }
}

fn check_file(loader: &RuleSetLoader, file: &str, overrides: &[PropertyOverride]) -> FileReport {
    let mut reporter = CollectingReporter::new();
    let rule_set = match loader.load_from_resource(file, &mut reporter) {
        Ok(rule_set) => rule_set,
        Err(e) => {
            let mut diagnostics = reporter.into_diagnostics();
            diagnostics.push(Diagnostic::new(
                Severity::Error,
                e.to_string(),
                Location::new(file, 0, 0),
            ));
            return FileReport {
                file: file.to_string(),
                rule_set: None,
                diagnostics,
            };
        }
    };

    let mut diagnostics = reporter.into_diagnostics();
    let mut builder = rule_set.to_builder();
    for property_override in overrides {
        match builder.apply_override(property_override) {
            Ok(()) => {}
            // Overrides apply to every file; a file without the rule is fine
            Err(RuleSetError::UnknownRule(rule)) => {
                log::debug!("{}: no rule {} for override {}", file, rule, property_override);
            }
            Err(e) => diagnostics.push(Diagnostic::new(
                Severity::Error,
                format!("Cannot apply '{}': {}", property_override, e),
                Location::new(file, 0, 0),
            )),
        }
    }

    FileReport {
        file: file.to_string(),
        rule_set: Some(builder.build()),
        diagnostics,
    }
}

fn print_text(reports: &[FileReport], cli: &Cli) -> bool {
    let mut errors = 0;
    let mut warnings = 0;

    for report in reports {
        for diagnostic in &report.diagnostics {
            let severity = match diagnostic.severity {
                Severity::Error => "error".red().bold(),
                Severity::Warning => "warning".yellow().bold(),
            };
            print!(
                "{}: {}: {}",
                diagnostic.location.to_string().bold(),
                severity,
                diagnostic.message
            );
            if let Some(cause) = &diagnostic.cause {
                print!(" {}", format!("(caused by: {})", cause).dimmed());
            }
            println!();
        }
        errors += report.diagnostics.iter().filter(|d| d.is_error()).count();
        warnings += report.diagnostics.iter().filter(|d| !d.is_error()).count();

        let Some(rule_set) = &report.rule_set else {
            continue;
        };
        println!(
            "{} {} ({} rules)",
            report.file.cyan(),
            rule_set.name().bold(),
            rule_set.len()
        );
        if cli.list_rules {
            for rule in rule_set.rules() {
                let kind = if rule.is_reference() { "ref" } else { "def" };
                let mut line = format!(
                    "  {:<40} {:<4} {:<12} {}",
                    rule.name(),
                    kind,
                    rule.priority().label(),
                    rule.language().id()
                );
                if rule.is_deprecated() {
                    line.push_str(" (deprecated)");
                }
                println!("{}", line);
            }
        }
        if cli.dump {
            match RuleSetWriter::new().write_to_string(rule_set) {
                Ok(xml) => println!("{}", xml),
                Err(e) => {
                    eprintln!("{}: {}", "error".red().bold(), e);
                    errors += 1;
                }
            }
        }
    }

    let summary = format!(
        "{} file(s) checked, {} error(s), {} warning(s)",
        reports.len(),
        errors,
        warnings
    );
    if errors > 0 {
        println!("{}", summary.red());
    } else {
        println!("{}", summary.green());
    }
    errors > 0
}

fn print_json(reports: &[FileReport]) -> bool {
    let json: Vec<JsonReport<'_>> = reports
        .iter()
        .map(|report| JsonReport {
            file: &report.file,
            name: report.rule_set.as_ref().map(RuleSet::name),
            rules: report
                .rule_set
                .iter()
                .flat_map(|set| set.rules())
                .map(|rule| JsonRule {
                    name: rule.name().to_string(),
                    language: rule.language().id().to_string(),
                    priority: rule.priority(),
                    reference: rule.is_reference(),
                    deprecated: rule.is_deprecated(),
                })
                .collect(),
            diagnostics: &report.diagnostics,
        })
        .collect();

    match serde_json::to_string_pretty(&json) {
        Ok(text) => println!("{}", text),
        Err(e) => eprintln!("{}: {}", "error".red().bold(), e),
    }
    reports.iter().any(FileReport::has_errors)
}
