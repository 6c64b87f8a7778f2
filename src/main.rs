use anyhow::{Context, Result};
use clap::Parser;
use serde::Serialize;
use sig_sniffer::builder::{SignatureBuilder, hash_content};
use sig_sniffer::checker::SignatureChecker;
use sig_sniffer::cli::{Cli, Commands};
use sig_sniffer::codec::read_database;
use sig_sniffer::config::{
    resolve_ignore_list, resolve_markers, resolve_signature_path, write_atomically,
};
use sig_sniffer::diagnostic::{CollectingSink, Diagnostic, DiagnosticSink, TracingSink};
use sig_sniffer::ignore_rules::{ClassFilter, IgnoreRules};
use sig_sniffer::logger::init_logger;
use sig_sniffer::merger::merge_streams;
use sig_sniffer::version::report_versions;
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Instant;

fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    init_logger(cli.verbose, cli.quiet);

    match cli.command {
        Commands::Build {
            paths,
            output,
            base,
            include,
            exclude,
        } => {
            let result = build(&paths, &output, &base, &include, &exclude)?;
            println!("{}", serde_json::to_string_pretty(&result)?);
            Ok(ExitCode::SUCCESS)
        }
        Commands::Check {
            paths,
            signature,
            ignore,
            ignore_file,
            annotation,
            source_root,
            classpath,
            no_archives,
        } => {
            let signature = resolve_signature_path(signature.as_deref())?;
            let ignore = resolve_ignore_list(&ignore, ignore_file.as_deref())?;
            let rules = IgnoreRules::new(&ignore).context("Invalid ignore pattern")?;
            let checker = SignatureChecker::load(open(&signature)?, rules)
                .with_context(|| format!("Failed to load {}", signature.display()))?
                .markers(resolve_markers(&annotation))
                .source_roots(source_root)
                .classpath(classpath)
                .check_archives(!no_archives);

            let result = check(&checker, &signature, &paths)?;
            println!("{}", serde_json::to_string_pretty(&result)?);
            if result.violations_found {
                return Ok(ExitCode::from(1));
            }
            Ok(ExitCode::SUCCESS)
        }
        Commands::Merge { inputs, output } => {
            let result = merge(&inputs, &output)?;
            println!("{}", serde_json::to_string_pretty(&result)?);
            Ok(ExitCode::SUCCESS)
        }
        Commands::Versions {
            human,
            threshold,
            paths,
            ..
        } => {
            let stdout = std::io::stdout();
            let report = report_versions(&paths, human, &mut stdout.lock())?;
            if let Some(threshold) = threshold
                && report.exceeds(threshold)
            {
                tracing::debug!(highest = ?report.highest, %threshold, "class version threshold exceeded");
                return Ok(ExitCode::from(1));
            }
            Ok(ExitCode::SUCCESS)
        }
    }
}

#[derive(Debug, Serialize)]
struct BuildResult {
    output: String,
    classes_found: usize,
    classes_written: usize,
    sha256: String,
    duration_ms: u64,
}

#[derive(Debug, Serialize)]
struct CheckResult {
    signature: String,
    units_scanned: usize,
    violations_found: bool,
    duration_ms: u64,
    diagnostics: Vec<Diagnostic>,
}

#[derive(Debug, Serialize)]
struct MergeResult {
    output: String,
    inputs: usize,
    classes: usize,
    sha256: String,
    duration_ms: u64,
}

fn open(path: &Path) -> Result<BufReader<File>> {
    let file = File::open(path)
        .with_context(|| format!("Failed to open signature database: {}", path.display()))?;
    Ok(BufReader::new(file))
}

fn build(
    paths: &[PathBuf],
    output: &Path,
    bases: &[PathBuf],
    include: &[String],
    exclude: &[String],
) -> Result<BuildResult> {
    let start = Instant::now();
    let mut builder = SignatureBuilder::new()
        .include(ClassFilter::new(include).context("Invalid --include pattern")?)
        .exclude(ClassFilter::new(exclude).context("Invalid --exclude pattern")?);
    for base in bases {
        let db = read_database(open(base)?)
            .with_context(|| format!("Could not read base signatures: {}", base.display()))?;
        builder = builder.with_base(db);
    }

    let mut bytes = Vec::new();
    let report = builder.build_to_writer(paths, &mut bytes)?;
    write_atomically(output, &bytes)?;

    Ok(BuildResult {
        output: output.to_string_lossy().to_string(),
        classes_found: report.classes_found,
        classes_written: report.classes_written,
        sha256: report.sha256,
        duration_ms: start.elapsed().as_millis() as u64,
    })
}

fn check(checker: &SignatureChecker, signature: &Path, paths: &[PathBuf]) -> Result<CheckResult> {
    let start = Instant::now();
    let sink = CollectingSink::new();
    let outcome = checker.scan(paths, &sink)?;

    let mut diagnostics = sink.into_diagnostics();
    diagnostics.sort_by(|a, b| a.unit.cmp(&b.unit).then(a.line.cmp(&b.line)));
    for d in &diagnostics {
        TracingSink.report(d.clone());
    }

    Ok(CheckResult {
        signature: signature.to_string_lossy().to_string(),
        units_scanned: outcome.units_scanned,
        violations_found: outcome.violations_found,
        duration_ms: start.elapsed().as_millis() as u64,
        diagnostics,
    })
}

fn merge(inputs: &[PathBuf], output: &Path) -> Result<MergeResult> {
    let start = Instant::now();
    let readers = inputs.iter().map(|p| open(p)).collect::<Result<Vec<_>>>()?;

    let mut bytes = Vec::new();
    let merged = merge_streams(readers, &mut bytes).context("Failed to merge signature databases")?;
    write_atomically(output, &bytes)?;

    Ok(MergeResult {
        output: output.to_string_lossy().to_string(),
        inputs: inputs.len(),
        classes: merged.len(),
        sha256: hash_content(&bytes),
        duration_ms: start.elapsed().as_millis() as u64,
    })
}
