//! Check command - analyze boundary files against the restriction dataset.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Serialize;
use tokio_util::sync::CancellationToken;

use interdictus::analysis::{
    AnalysisProgress, AnalysisReport, Analyzer, LabelOrdering, Verdict,
};
use interdictus::boundary::load_boundary_file;
use interdictus::catalog::LayerCatalog;
use interdictus::overlay::ReportMode;

use crate::error::{CliError, EXIT_ALERT, EXIT_PARTIAL};
use crate::runner::CliRunner;

/// Arguments for the check command.
#[derive(Default)]
pub struct CheckArgs {
    pub files: Vec<PathBuf>,
    pub dataset: Option<PathBuf>,
    pub detail: bool,
    pub json: bool,
    pub threads: Option<usize>,
    pub ordering: Option<LabelOrdering>,
    pub debug: bool,
}

/// JSON document emitted per boundary file.
#[derive(Serialize)]
struct FileReport<'a> {
    file: String,
    members: usize,
    discarded: usize,
    complete: bool,
    #[serde(flatten)]
    report: &'a AnalysisReport,
}

/// Combined result of checking one or more files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum CheckOutcome {
    /// Every layer was checked and none overlapped.
    Clear,
    /// No overlaps among the checked layers, but some layers were skipped.
    Partial,
    /// At least one file overlapped a restricted layer.
    Alert,
}

impl CheckOutcome {
    fn of(report: &AnalysisReport) -> Self {
        match report.verdict {
            Verdict::Alert => CheckOutcome::Alert,
            Verdict::Clear if report.is_complete() => CheckOutcome::Clear,
            Verdict::Clear => CheckOutcome::Partial,
        }
    }

    /// Process exit status: 0 clear, 2 alert, 3 partial coverage.
    pub fn exit_code(self) -> i32 {
        match self {
            CheckOutcome::Clear => 0,
            CheckOutcome::Partial => EXIT_PARTIAL,
            CheckOutcome::Alert => EXIT_ALERT,
        }
    }
}

/// Run the check command.
///
/// Returns the combined outcome: ALERT when any file alerts, otherwise
/// partial when any file had skipped layers.
pub fn run(args: CheckArgs) -> Result<CheckOutcome, CliError> {
    let runner = CliRunner::with_debug(args.debug)?;
    runner.log_startup("check");

    let mut analysis = runner.config().analysis_config();
    if let Some(threads) = args.threads {
        if threads == 0 {
            return Err(CliError::Config("--threads must be at least 1".to_string()));
        }
        analysis.threads = threads;
    }
    if args.detail {
        analysis.mode = ReportMode::Feature;
    }
    if let Some(ordering) = args.ordering {
        analysis.ordering = ordering;
    }

    let catalog = runner.open_catalog(args.dataset.as_deref())?;

    let mut analyzer = Analyzer::new(analysis, runner.config().label_rules());
    let show_progress = !args.json && atty::is(atty::Stream::Stderr);
    if show_progress {
        analyzer = analyzer.with_progress(Arc::new(print_progress));
    }

    let cancel = CancellationToken::new();
    let mut combined = CheckOutcome::Clear;

    for (idx, file) in args.files.iter().enumerate() {
        let set = load_boundary_file(file).map_err(|error| CliError::Boundary {
            path: file.clone(),
            error,
        })?;

        let report = analyzer.run(&set, &catalog, &cancel)?;
        if show_progress {
            eprint!("\r\x1b[2K");
        }

        combined = combined.max(CheckOutcome::of(&report));

        if args.json {
            let doc = FileReport {
                file: file.display().to_string(),
                members: set.len(),
                discarded: set.discarded(),
                complete: report.is_complete(),
                report: &report,
            };
            println!("{}", serde_json::to_string_pretty(&doc)?);
        } else {
            if idx > 0 {
                println!();
            }
            print_report(file, &set, &report, &catalog, args.detail);
        }
    }

    Ok(combined)
}

fn print_progress(progress: AnalysisProgress) {
    let mut stderr = std::io::stderr();
    let _ = write!(
        stderr,
        "\rChecking layers: {}/{} ({}%)",
        progress.layers_complete,
        progress.layers_total,
        progress.percent()
    );
    let _ = stderr.flush();
}

fn print_report(
    file: &Path,
    set: &interdictus::geometry::GeometrySet,
    report: &AnalysisReport,
    catalog: &dyn LayerCatalog,
    detail: bool,
) {
    println!("Boundary: {}", file.display());
    if set.discarded() > 0 {
        println!(
            "  {} geometries ({} invalid discarded)",
            set.len(),
            set.discarded()
        );
    } else {
        println!("  {} geometries", set.len());
    }
    println!("Dataset:  {}", catalog.describe());
    println!(
        "  {} layers checked, {} skipped",
        report.layers_checked,
        report.skipped.len()
    );
    println!();

    if !report.table.is_empty() {
        let width = report
            .table
            .iter()
            .map(|row| row.label.as_str().chars().count())
            .max()
            .unwrap_or(0)
            .max("Category".len());
        println!("{:<width$}  Status", "Category", width = width);
        println!("{:-<width$}  -------", "", width = width);
        for row in &report.table {
            println!("{:<width$}  {}", row.label, row.status, width = width);
        }
        println!();
    }

    if detail && !report.hits.is_empty() {
        println!("Intersecting layers:");
        for hit in &report.hits {
            println!("  {} ({})", hit.layer, hit.label);
            for m in &hit.matches {
                println!(
                    "    boundary #{} x feature #{}: overlap {:.6} sq deg",
                    m.member, m.feature, m.overlap_area
                );
            }
        }
        println!();
    }

    match report.verdict {
        Verdict::Alert => {
            println!("Verdict: ALERT");
            let labels: Vec<&str> = report.labels.iter().map(|l| l.as_str()).collect();
            println!("  Intersects: {}", labels.join(", "));
        }
        Verdict::Clear if report.is_complete() => println!("Verdict: CLEAR"),
        Verdict::Clear => println!(
            "Verdict: CLEAR for checked layers only ({} not checked)",
            report.skipped.len()
        ),
    }

    if !report.is_complete() {
        println!();
        println!(
            "Warning: coverage is incomplete, {} layer(s) were skipped:",
            report.skipped.len()
        );
        for skipped in &report.skipped {
            println!(
                "  {} ({}): {} - {}",
                skipped.layer_id, skipped.label, skipped.reason, skipped.detail
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use interdictus::analysis::{LayerOutcome, SkipReason, SkippedLayer};
    use interdictus::labels::CanonicalLabel;

    fn clear(id: &str) -> LayerOutcome {
        LayerOutcome::Clear {
            layer_id: id.to_string(),
            label: CanonicalLabel::new(id),
        }
    }

    fn skipped(id: &str) -> LayerOutcome {
        LayerOutcome::Skipped(SkippedLayer {
            layer_id: id.to_string(),
            label: CanonicalLabel::new(id),
            reason: SkipReason::LoadFailed,
            detail: "unreadable".to_string(),
        })
    }

    #[test]
    fn test_skipped_layers_make_clear_partial() {
        let full = AnalysisReport::aggregate(vec![clear("ti")], LabelOrdering::default());
        assert_eq!(CheckOutcome::of(&full), CheckOutcome::Clear);
        assert_eq!(CheckOutcome::of(&full).exit_code(), 0);

        let partial = AnalysisReport::aggregate(
            vec![clear("ti"), skipped("uc_federal")],
            LabelOrdering::default(),
        );
        assert_eq!(CheckOutcome::of(&partial), CheckOutcome::Partial);
        assert_eq!(CheckOutcome::of(&partial).exit_code(), EXIT_PARTIAL);
    }

    #[test]
    fn test_alert_dominates_partial() {
        assert_eq!(
            CheckOutcome::Partial.max(CheckOutcome::Alert).exit_code(),
            EXIT_ALERT
        );
        assert_eq!(CheckOutcome::Clear.max(CheckOutcome::Partial), CheckOutcome::Partial);
    }
}
