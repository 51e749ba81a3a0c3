//! `drg import` - reconcile a weekly snapshot file into the roster.

use std::path::PathBuf;

use drg_recon::report::ChangeKind;
use drg_recon::{ImportMode, ReconcileOptions, Reconciler, ReconciliationReport, SnapshotParser};

use crate::exit_codes::EXIT_IMPORT_ROW_ERRORS;
use crate::{print_json, CliError, Context};

pub struct ImportArgs {
    pub file: PathBuf,
    /// None = settings `import.mode`
    pub mode: Option<ImportMode>,
    /// None = settings `import.has_header`
    pub has_header: Option<bool>,
    /// Forces change recording on; otherwise settings decide.
    pub record_changes: bool,
    pub json: bool,
}

pub fn cmd_import(ctx: &Context, args: ImportArgs) -> Result<(), CliError> {
    let mut config = ctx.settings.import.clone();
    if let Some(mode) = args.mode {
        config.mode = mode;
    }
    if let Some(has_header) = args.has_header {
        config.has_header = has_header;
    }
    config.record_changes |= args.record_changes;

    let parser = SnapshotParser::new(&config).map_err(CliError::config)?;
    let rows = drg_io::csv::read_import(&args.file, &parser).map_err(CliError::usage)?;

    let store = ctx.open_store()?;
    let options = ReconcileOptions {
        record_changes: config.record_changes,
        ..ReconcileOptions::default()
    };
    let report = Reconciler::with_options(&store, options)
        .reconcile(rows, config.mode)
        .map_err(CliError::reconcile)?;

    if args.json {
        print_json(&report)?;
    } else {
        print_report(&report);
    }

    if !report.errors.is_empty() {
        return Err(CliError::new(
            EXIT_IMPORT_ROW_ERRORS,
            format!("{} row(s) rejected; the rest of the import was applied", report.errors.len()),
        ));
    }
    Ok(())
}

fn print_report(report: &ReconciliationReport) {
    println!("{}", report.summary_line());

    for change in &report.changes {
        let tag = match change.kind {
            ChangeKind::Inserted => "+",
            ChangeKind::Updated => "~",
            ChangeKind::Deleted => "-",
            ChangeKind::Unchanged => continue,
        };
        println!(
            "  {tag} {:<16} {:<20} level {:+}  power {:+}",
            change.key.as_str(),
            change.display_name,
            change.level_delta,
            change.power_delta,
        );
    }

    for warning in &report.warnings {
        eprintln!(
            "warning: key '{}' on line {} overrides line {}",
            warning.key, warning.line, warning.overridden_line,
        );
    }
    for error in &report.errors {
        eprintln!("skipped {error}");
    }
    if report.change_log_entries > 0 {
        println!("{} change log entries recorded", report.change_log_entries);
    }
}
