//! Tapline mock rule linter CLI.
//!
//! Usage:
//!   tapline-lint <directory_or_file> [OPTIONS]

use clap::{Parser, ValueEnum};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tapline_lint::{lint_directory, lint_file, LintIssue, LintResult, Severity};

// ANSI color codes
const GREEN: &str = "\x1b[32m";
const RED: &str = "\x1b[31m";
const YELLOW: &str = "\x1b[33m";
const CYAN: &str = "\x1b[36m";
const BOLD: &str = "\x1b[1m";
const DIM: &str = "\x1b[2m";
const RESET: &str = "\x1b[0m";

#[derive(Debug, Clone, Copy, ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

/// Tapline Mock Rule Linter
#[derive(Parser, Debug)]
#[command(name = "tapline-lint")]
#[command(author, version, about = "Validate mock rule files for Tapline")]
struct Args {
    /// Rule file or directory containing rule files
    #[arg(required = true)]
    path: PathBuf,

    #[arg(short, long, value_enum, default_value = "text")]
    output: OutputFormat,

    /// Only show errors (hide warnings)
    #[arg(short = 'e', long)]
    errors_only: bool,

    /// Strict mode - treat warnings as errors
    #[arg(short, long)]
    strict: bool,
}

fn main() {
    let args = Args::parse();

    let result = if args.path.is_dir() {
        lint_directory(&args.path)
    } else {
        lint_file(&args.path)
    };

    match args.output {
        OutputFormat::Json => match serde_json::to_string_pretty(&result) {
            Ok(output) => println!("{output}"),
            Err(e) => eprintln!("{RED}Failed to serialize results: {e}{RESET}"),
        },
        OutputFormat::Text => print_results(&args.path, &result, args.errors_only),
    }

    std::process::exit(if result.is_failure(args.strict) { 1 } else { 0 });
}

fn print_results(path: &Path, result: &LintResult, errors_only: bool) {
    println!("{BOLD}{CYAN}Tapline Rule Linter{RESET}");
    println!("{DIM}━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━{RESET}");
    println!("{DIM}Scanning:{RESET} {CYAN}{}{RESET}\n", path.display());

    let mut issues_by_file: BTreeMap<&PathBuf, Vec<&LintIssue>> = BTreeMap::new();
    for issue in &result.issues {
        if errors_only && issue.severity != Severity::Error {
            continue;
        }
        issues_by_file.entry(&issue.file).or_default().push(issue);
    }

    for (file, issues) in &issues_by_file {
        let has_errors = issues.iter().any(|i| i.severity == Severity::Error);
        let status = if has_errors {
            format!("{RED}FAIL{RESET}")
        } else {
            format!("{YELLOW}WARN{RESET}")
        };
        println!("{status} {BOLD}{CYAN}{}{RESET}", file.display());

        for issue in issues {
            let color = severity_color(issue.severity);
            let location = issue
                .location
                .as_ref()
                .map(|l| format!("{DIM}[{RESET}{CYAN}{l}{RESET}{DIM}]{RESET} "))
                .unwrap_or_default();
            println!(
                "  {color}|{RESET} {location}{BOLD}{color}{}{RESET}: {} {DIM}({}){RESET}",
                issue.severity.label(),
                issue.message,
                issue.code
            );
            if let Some(suggestion) = &issue.suggestion {
                println!("  {color}|{RESET}   {GREEN}-> {suggestion}{RESET}");
            }
        }
        println!();
    }

    println!("{DIM}━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━{RESET}");
    println!("  {DIM}Files checked:{RESET} {BOLD}{}{RESET}", result.files_checked);
    println!("  {DIM}Errors:{RESET}        {BOLD}{}{RESET}", result.errors);
    println!("  {DIM}Warnings:{RESET}      {BOLD}{}{RESET}", result.warnings);
    println!();

    if result.errors == 0 && result.warnings == 0 {
        println!("{GREEN}{BOLD}All checks passed!{RESET}");
    } else if result.errors == 0 {
        println!("{YELLOW}{BOLD}Passed with warnings{RESET}");
    } else {
        println!("{RED}{BOLD}Linting failed with errors{RESET}");
    }
}

fn severity_color(severity: Severity) -> &'static str {
    match severity {
        Severity::Error => RED,
        Severity::Warning => YELLOW,
    }
}
