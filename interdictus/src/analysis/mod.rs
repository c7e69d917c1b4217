//! Analysis orchestration.
//!
//! An [`Analyzer`] takes a loaded [`GeometrySet`] and a [`LayerCatalog`],
//! fans the per-layer work (load, filter, overlay) out over a dedicated
//! rayon pool, and merges the independent per-layer outcomes into one
//! [`AnalysisReport`].
//!
//! Failures are split in two classes:
//!
//! - fatal: the boundary cannot be loaded, the catalog cannot be listed, or
//!   the run is cancelled. These surface as [`AnalysisError`].
//! - per layer: load errors, unsupported coordinate systems, timeouts and
//!   panics. These become [`SkippedLayer`] entries and the run continues.

mod progress;
mod report;

pub use progress::{AnalysisPhase, AnalysisProgress, AnalysisProgressCallback};
pub use report::{
    AnalysisReport, LabelOrdering, LabelStatus, LayerOutcome, SkipReason, SkippedLayer,
    TableRow, Verdict,
};

use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use rayon::prelude::*;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::boundary::{load_boundary, LoadError};
use crate::catalog::{CatalogError, LayerCatalog, LayerFailure, LayerLoadError};
use crate::geometry::GeometrySet;
use crate::labels::LabelRules;
use crate::overlay::{
    intersect_layer, Interrupted, LayerBudget, LayerHit, PreparedSet, ReportMode,
};

/// Default per-layer time budget.
pub const DEFAULT_LAYER_TIMEOUT: Duration = Duration::from_secs(120);

/// Errors that abort a whole analysis run.
#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error("Could not process the submitted file: {0}")]
    Load(#[from] LoadError),

    #[error("Could not read the restriction catalog: {0}")]
    Catalog(#[from] CatalogError),

    #[error("Analysis was cancelled")]
    Cancelled,

    #[error("Failed to start worker pool: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),
}

/// Tunables of an analysis run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnalysisConfig {
    /// Worker threads for the per-layer fan-out.
    pub threads: usize,
    /// Time budget per layer; `None` disables it.
    pub layer_timeout: Option<Duration>,
    pub mode: ReportMode,
    pub ordering: LabelOrdering,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            threads: default_threads(),
            layer_timeout: Some(DEFAULT_LAYER_TIMEOUT),
            mode: ReportMode::default(),
            ordering: LabelOrdering::default(),
        }
    }
}

/// Available parallelism, at least 1.
pub fn default_threads() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}

/// Runs analyses against restriction catalogs.
pub struct Analyzer {
    config: AnalysisConfig,
    rules: LabelRules,
    progress: Option<AnalysisProgressCallback>,
}

impl Analyzer {
    pub fn new(config: AnalysisConfig, rules: LabelRules) -> Self {
        Self {
            config,
            rules,
            progress: None,
        }
    }

    /// Report progress through `callback`.
    pub fn with_progress(mut self, callback: AnalysisProgressCallback) -> Self {
        self.progress = Some(callback);
        self
    }

    pub fn config(&self) -> &AnalysisConfig {
        &self.config
    }

    pub fn rules(&self) -> &LabelRules {
        &self.rules
    }

    /// Load a boundary file and analyze it.
    pub fn analyze_boundary(
        &self,
        bytes: &[u8],
        filename_hint: &str,
        catalog: &dyn LayerCatalog,
        cancel: &CancellationToken,
    ) -> Result<AnalysisReport, AnalysisError> {
        let set = load_boundary(bytes, filename_hint)?;
        self.run(&set, catalog, cancel)
    }

    /// Analyze a loaded geometry set against every layer of `catalog`.
    pub fn run(
        &self,
        set: &GeometrySet,
        catalog: &dyn LayerCatalog,
        cancel: &CancellationToken,
    ) -> Result<AnalysisReport, AnalysisError> {
        let started = Instant::now();
        self.report(AnalysisProgress::listing());

        let layer_ids = catalog.list_layers()?;
        let total = layer_ids.len();
        tracing::info!(
            catalog = %catalog.describe(),
            layers = total,
            members = set.len(),
            threads = self.config.threads,
            mode = %self.config.mode,
            "Starting analysis"
        );

        let prepared = PreparedSet::new(set);
        let completed = AtomicUsize::new(0);

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.config.threads.max(1))
            .thread_name(|i| format!("interdictus-layer-{i}"))
            .build()?;

        let outcomes: Vec<Option<LayerOutcome>> = pool.install(|| {
            layer_ids
                .par_iter()
                .map(|id| {
                    if cancel.is_cancelled() {
                        return None;
                    }
                    self.report(AnalysisProgress::layer(
                        id,
                        completed.load(Ordering::Relaxed),
                        total,
                    ));

                    let outcome = self.process_layer(&prepared, catalog, id, cancel);

                    let done = completed.fetch_add(1, Ordering::Relaxed) + 1;
                    self.report(AnalysisProgress::layer(id, done, total));
                    outcome
                })
                .collect()
        });

        if cancel.is_cancelled() || outcomes.iter().any(Option::is_none) {
            tracing::warn!(
                completed = completed.load(Ordering::Relaxed),
                total,
                "Analysis cancelled"
            );
            return Err(AnalysisError::Cancelled);
        }

        let report = AnalysisReport::aggregate(
            outcomes.into_iter().flatten().collect(),
            self.config.ordering,
        );
        self.report(AnalysisProgress::complete(total));

        tracing::info!(
            verdict = %report.verdict,
            hits = report.hits.len(),
            skipped = report.skipped.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Analysis complete"
        );
        Ok(report)
    }

    /// Load and overlay one layer. `None` means the run was cancelled.
    fn process_layer(
        &self,
        prepared: &PreparedSet,
        catalog: &dyn LayerCatalog,
        id: &str,
        cancel: &CancellationToken,
    ) -> Option<LayerOutcome> {
        let label = self.rules.normalize(id);
        let budget = LayerBudget::new(self.config.layer_timeout, cancel.clone());
        let started = Instant::now();

        type Attempt = Result<Result<Option<LayerHit>, Interrupted>, LayerLoadError>;
        let result = panic::catch_unwind(AssertUnwindSafe(|| -> Attempt {
            let layer = catalog.load_layer(id)?;
            // Loading can take most of the budget on large layers.
            if let Err(interrupted) = budget.check() {
                return Ok(Err(interrupted));
            }
            Ok(intersect_layer(
                prepared,
                &layer,
                &label,
                self.config.mode,
                &budget,
            ))
        }));

        let skip = |reason: SkipReason, detail: String| {
            tracing::warn!(layer = %id, reason = %reason, detail = %detail, "Skipping layer");
            Some(LayerOutcome::Skipped(SkippedLayer {
                layer_id: id.to_string(),
                label: label.clone(),
                reason,
                detail,
            }))
        };

        let outcome = match result {
            Ok(Ok(Ok(Some(hit)))) => Some(LayerOutcome::Hit(hit)),
            Ok(Ok(Ok(None))) => Some(LayerOutcome::Clear {
                layer_id: id.to_string(),
                label: label.clone(),
            }),
            Ok(Ok(Err(Interrupted::Cancelled))) => None,
            Ok(Ok(Err(Interrupted::TimedOut))) => {
                let limit = self.config.layer_timeout.unwrap_or_default();
                skip(
                    SkipReason::TimedOut,
                    format!("exceeded {}s budget", limit.as_secs()),
                )
            }
            Ok(Err(e)) => {
                let reason = match e.failure {
                    LayerFailure::Reprojection(_) => SkipReason::Reprojection,
                    _ => SkipReason::LoadFailed,
                };
                skip(reason, e.failure.to_string())
            }
            Err(payload) => skip(SkipReason::Panicked, panic_message(payload.as_ref())),
        };

        tracing::debug!(
            layer = %id,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Layer processed"
        );
        outcome
    }

    fn report(&self, progress: AnalysisProgress) {
        if let Some(cb) = &self.progress {
            cb(progress);
        }
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "panic while processing layer".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{DatasetFingerprint, MemoryCatalog, RestrictionLayer};
    use crate::geometry::Crs;
    use crate::labels::{INDIGENOUS_LAND, PUBLIC_FOREST_REGISTRY};
    use geo::{polygon, Geometry};
    use std::sync::{Arc, Mutex};

    fn square(x: f64, y: f64, size: f64) -> Geometry<f64> {
        Geometry::Polygon(polygon![
            (x: x, y: y),
            (x: x + size, y: y),
            (x: x + size, y: y + size),
            (x: x, y: y + size),
            (x: x, y: y),
        ])
    }

    fn user_set() -> GeometrySet {
        GeometrySet::from_source(vec![square(0.0, 0.0, 1.0)], Crs::Wgs84).unwrap()
    }

    fn analyzer(threads: usize) -> Analyzer {
        Analyzer::new(
            AnalysisConfig {
                threads,
                ..AnalysisConfig::default()
            },
            LabelRules::default(),
        )
    }

    /// Catalog whose named layer panics on load.
    struct Panicking(MemoryCatalog);

    impl LayerCatalog for Panicking {
        fn list_layers(&self) -> Result<Vec<String>, CatalogError> {
            let mut ids = self.0.list_layers()?;
            ids.push("explodes".to_string());
            Ok(ids)
        }

        fn load_layer(&self, id: &str) -> Result<Arc<RestrictionLayer>, LayerLoadError> {
            if id == "explodes" {
                panic!("corrupt index");
            }
            self.0.load_layer(id)
        }

        fn fingerprint(&self) -> Option<DatasetFingerprint> {
            None
        }

        fn describe(&self) -> String {
            "panicking".to_string()
        }
    }

    #[test]
    fn test_overlapping_indigenous_land_alerts() {
        let catalog =
            MemoryCatalog::new().with_layer("terra_indigena_xx", vec![square(0.5, 0.5, 1.0)]);
        let report = analyzer(2)
            .run(&user_set(), &catalog, &CancellationToken::new())
            .unwrap();
        assert_eq!(report.verdict, Verdict::Alert);
        assert_eq!(report.labels.len(), 1);
        assert_eq!(report.labels[0].as_str(), INDIGENOUS_LAND);
        assert!(report.is_complete());
    }

    #[test]
    fn test_distant_registry_is_clear() {
        let catalog = MemoryCatalog::new().with_layer("cnfp_pa", vec![square(10.0, 10.0, 1.0)]);
        let report = analyzer(1)
            .run(&user_set(), &catalog, &CancellationToken::new())
            .unwrap();
        assert_eq!(report.verdict, Verdict::Clear);
        assert_eq!(report.layers_checked, 1);
        assert_eq!(
            report.table[0].label.as_str(),
            format!("{PUBLIC_FOREST_REGISTRY} (PA)")
        );
    }

    #[test]
    fn test_failing_layer_is_skipped() {
        let catalog = MemoryCatalog::new()
            .with_layer("ti", vec![square(0.5, 0.5, 1.0)])
            .with_failing_layer("uc_federal", "corrupt table")
            .with_layer("cnfp_pa", vec![square(10.0, 10.0, 1.0)]);
        let report = analyzer(3)
            .run(&user_set(), &catalog, &CancellationToken::new())
            .unwrap();
        assert_eq!(report.verdict, Verdict::Alert);
        assert_eq!(report.skipped_ids(), vec!["uc_federal"]);
        assert_eq!(report.skipped[0].reason, SkipReason::LoadFailed);
        assert_eq!(report.layers_checked, 2);
    }

    #[test]
    fn test_unsupported_crs_layer_is_skipped() {
        let catalog = MemoryCatalog::new().with_projected_layer(
            "ti_custom",
            vec![square(0.0, 0.0, 1.0)],
            Crs::from_epsg(2000),
        );
        let report = analyzer(1)
            .run(&user_set(), &catalog, &CancellationToken::new())
            .unwrap();
        assert_eq!(report.skipped[0].reason, SkipReason::Reprojection);
        assert_eq!(report.verdict, Verdict::Clear);
        assert!(!report.is_complete());
    }

    #[test]
    fn test_panicking_layer_is_isolated() {
        let catalog =
            Panicking(MemoryCatalog::new().with_layer("ti", vec![square(0.5, 0.5, 1.0)]));
        let report = analyzer(2)
            .run(&user_set(), &catalog, &CancellationToken::new())
            .unwrap();
        assert_eq!(report.verdict, Verdict::Alert);
        assert_eq!(report.skipped[0].layer_id, "explodes");
        assert_eq!(report.skipped[0].reason, SkipReason::Panicked);
        assert_eq!(report.skipped[0].detail, "corrupt index");
    }

    #[test]
    fn test_zero_timeout_skips_layers() {
        let catalog = MemoryCatalog::new().with_layer("ti", vec![square(0.5, 0.5, 1.0)]);
        let analyzer = Analyzer::new(
            AnalysisConfig {
                threads: 1,
                layer_timeout: Some(Duration::ZERO),
                ..AnalysisConfig::default()
            },
            LabelRules::default(),
        );
        let report = analyzer
            .run(&user_set(), &catalog, &CancellationToken::new())
            .unwrap();
        assert_eq!(report.skipped[0].reason, SkipReason::TimedOut);
        assert_eq!(report.verdict, Verdict::Clear);
    }

    #[test]
    fn test_huge_timeout_runs_without_deadline() {
        let catalog = MemoryCatalog::new().with_layer("ti", vec![square(0.5, 0.5, 1.0)]);
        let analyzer = Analyzer::new(
            AnalysisConfig {
                threads: 2,
                layer_timeout: Some(Duration::from_secs(u64::MAX)),
                ..AnalysisConfig::default()
            },
            LabelRules::default(),
        );
        let report = analyzer
            .run(&user_set(), &catalog, &CancellationToken::new())
            .unwrap();
        assert_eq!(report.verdict, Verdict::Alert);
        assert!(report.is_complete());
    }

    #[test]
    fn test_cancelled_run_errors() {
        let catalog = MemoryCatalog::new().with_layer("ti", vec![square(0.5, 0.5, 1.0)]);
        let token = CancellationToken::new();
        token.cancel();
        let err = analyzer(1).run(&user_set(), &catalog, &token).unwrap_err();
        assert!(matches!(err, AnalysisError::Cancelled));
    }

    #[test]
    fn test_progress_reaches_completion() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let catalog = MemoryCatalog::new()
            .with_layer("a", vec![square(5.0, 5.0, 1.0)])
            .with_layer("b", vec![square(6.0, 6.0, 1.0)]);
        analyzer(2)
            .with_progress(Arc::new(move |p| sink.lock().unwrap().push(p)))
            .run(&user_set(), &catalog, &CancellationToken::new())
            .unwrap();

        let seen = seen.lock().unwrap();
        assert_eq!(seen.first().map(|p| p.phase), Some(AnalysisPhase::Listing));
        assert_eq!(seen.last(), Some(&AnalysisProgress::complete(2)));
    }

    #[test]
    fn test_empty_catalog_is_clear() {
        let report = analyzer(1)
            .run(&user_set(), &MemoryCatalog::new(), &CancellationToken::new())
            .unwrap();
        assert_eq!(report.verdict, Verdict::Clear);
        assert!(report.is_complete());
        assert!(report.table.is_empty());
    }

    #[test]
    fn test_analyze_boundary_rejects_empty_document() {
        let kml = r#"<kml xmlns="http://www.opengis.net/kml/2.2"><Document/></kml>"#;
        let err = analyzer(1)
            .analyze_boundary(
                kml.as_bytes(),
                "area.kml",
                &MemoryCatalog::new(),
                &CancellationToken::new(),
            )
            .unwrap_err();
        assert!(matches!(err, AnalysisError::Load(LoadError::NoGeometry)));
    }
}
