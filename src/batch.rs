use crate::assets::AssetDirs;
use crate::banner::{BannerJob, Compositor};
use crate::error::BannerPressError;
use crate::inputs::{OverlayInputs, OverlayRole, TextInputs};
use crate::layout::{LayoutDocument, LayoutSource};
use crate::segment::SegmentCatalog;
use chrono::NaiveDateTime;
use serde_json::json;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

pub const PROGRESS_START: f32 = 0.1;
pub const PROGRESS_GENERATION_SPAN: f32 = 0.9;
pub const PROGRESS_FINISHING: f32 = 0.95;

/// Receives coarse progress fractions in `[0, 1]` with a short stage label.
pub trait ProgressSink: Sync {
    fn report(&self, fraction: f32, stage: &str);
}

impl<F> ProgressSink for F
where
    F: Fn(f32, &str) + Sync,
{
    fn report(&self, fraction: f32, stage: &str) {
        self(fraction, stage)
    }
}

/// Progress sink that drops every report.
pub struct NoProgress;

impl ProgressSink for NoProgress {
    fn report(&self, _fraction: f32, _stage: &str) {}
}

/// Enumerates the overlay source files that belong to a segment.
pub trait SegmentSources: Sync {
    fn sources_for(&self, segment: &str) -> Result<Vec<PathBuf>, BannerPressError>;
}

impl<F> SegmentSources for F
where
    F: Fn(&str) -> Vec<PathBuf> + Sync,
{
    fn sources_for(&self, segment: &str) -> Result<Vec<PathBuf>, BannerPressError> {
        Ok(self(segment))
    }
}

/// `round(value, 2)` for progress fractions.
pub(crate) fn round2(value: f32) -> f32 {
    (value * 100.0).round() / 100.0
}

pub fn banner_filename(segment: &str, index: usize, stamp: NaiveDateTime) -> String {
    format!("{segment}_{index}_{}.png", stamp.format("%d%m%H%M%S"))
}

/// One batch: every template crossed with every segment and every source
/// file of that segment. Each source file becomes the actor overlay of its
/// banner.
#[derive(Debug, Clone, Default)]
pub struct BatchRequest {
    pub templates: Vec<String>,
    pub segments: Vec<String>,
    pub overlays: OverlayInputs,
    pub texts: TextInputs,
    /// Fixed filename timestamp. Local time at each banner when unset.
    pub timestamp: Option<NaiveDateTime>,
}

impl BatchRequest {
    pub fn new<T, S>(templates: T, segments: S) -> Self
    where
        T: IntoIterator,
        T::Item: Into<String>,
        S: IntoIterator,
        S::Item: Into<String>,
    {
        Self {
            templates: templates.into_iter().map(Into::into).collect(),
            segments: segments.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }

    pub fn with_overlays(mut self, overlays: OverlayInputs) -> Self {
        self.overlays = overlays;
        self
    }

    pub fn with_texts(mut self, texts: TextInputs) -> Self {
        self.texts = texts;
        self
    }

    pub fn with_timestamp(mut self, stamp: NaiveDateTime) -> Self {
        self.timestamp = Some(stamp);
        self
    }

    /// Rejects the request before any file I/O.
    pub fn validate(&self) -> Result<(), BannerPressError> {
        if self.templates.is_empty() {
            return Err(BannerPressError::Validation(
                "Please select at least one banner template.".to_string(),
            ));
        }
        if self.segments.is_empty() {
            return Err(BannerPressError::Validation(
                "Please select at least one visual segment.".to_string(),
            ));
        }
        if self.templates.iter().any(|name| name.trim().is_empty()) {
            return Err(BannerPressError::Validation(
                "Banner template names must not be empty.".to_string(),
            ));
        }
        if self.segments.iter().any(|name| name.trim().is_empty()) {
            return Err(BannerPressError::Validation(
                "Visual segment names must not be empty.".to_string(),
            ));
        }
        Ok(())
    }

    /// [`BatchRequest::validate`] plus a check that every segment is defined
    /// in `catalog`.
    pub fn validate_against(&self, catalog: &SegmentCatalog) -> Result<(), BannerPressError> {
        self.validate()?;
        for segment in &self.segments {
            catalog.profile(segment)?;
        }
        Ok(())
    }
}

#[derive(Debug)]
pub struct BannerFailure {
    pub template: String,
    pub segment: String,
    pub source: PathBuf,
    pub error: BannerPressError,
}

#[derive(Debug, Default)]
pub struct BatchReport {
    pub expected: usize,
    pub completed: usize,
    /// Output paths in generation order.
    pub outputs: Vec<PathBuf>,
    pub failures: Vec<BannerFailure>,
}

impl BatchReport {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty() && self.completed == self.expected
    }
}

struct BannerTask {
    /// 1-based position across the whole batch; also the filename counter.
    index: usize,
    template: String,
    segment: String,
    source: PathBuf,
    background: PathBuf,
    layout: Result<Arc<LayoutDocument>, Arc<BannerPressError>>,
}

enum TaskResult {
    Done(PathBuf),
    Failed(BannerFailure),
}

fn plan_tasks(
    request: &BatchRequest,
    layouts: &dyn LayoutSource,
    sources: &dyn SegmentSources,
    dirs: &AssetDirs,
) -> Result<Vec<BannerTask>, BannerPressError> {
    let mut segment_files = Vec::with_capacity(request.segments.len());
    for segment in &request.segments {
        segment_files.push((segment.as_str(), sources.sources_for(segment)?));
    }

    let mut tasks = Vec::new();
    for template in &request.templates {
        let layout = layouts
            .layout(template)
            .map(Arc::new)
            .map_err(Arc::new);
        let background = dirs.background_path(template);
        for (segment, files) in &segment_files {
            for source in files {
                tasks.push(BannerTask {
                    index: tasks.len() + 1,
                    template: template.clone(),
                    segment: segment.to_string(),
                    source: source.clone(),
                    background: background.clone(),
                    layout: layout.clone(),
                });
            }
        }
    }
    Ok(tasks)
}

impl Compositor<'_> {
    pub(crate) fn run_batch(
        &self,
        request: &BatchRequest,
        layouts: &dyn LayoutSource,
        sources: &dyn SegmentSources,
        dirs: &AssetDirs,
        parallel: bool,
        progress: &dyn ProgressSink,
    ) -> Result<BatchReport, BannerPressError> {
        request.validate()?;
        progress.report(PROGRESS_START, "Checking banner configuration and assets");

        let tasks = plan_tasks(request, layouts, sources, dirs)?;
        let total = tasks.len();
        let output_dir = dirs.generated_dir();
        if total > 0 {
            std::fs::create_dir_all(&output_dir)?;
        }
        if let Some(debug) = self.debug {
            debug.log_event(
                "batch.start",
                json!({
                    "templates": request.templates,
                    "segments": request.segments,
                    "expected": total,
                }),
            );
        }

        // Held across the count and the report so fractions never go backwards.
        let finished = Mutex::new(0usize);
        let run_one = |task: &BannerTask| -> (usize, TaskResult) {
            let result = self.run_task(task, request, &output_dir);
            let mut done = finished.lock().unwrap_or_else(PoisonError::into_inner);
            *done += 1;
            progress.report(
                round2(*done as f32 / total as f32 * PROGRESS_GENERATION_SPAN),
                "Generating banners",
            );
            (task.index, result)
        };

        let mut results: Vec<(usize, TaskResult)> = if parallel {
            use rayon::prelude::*;
            tasks.par_iter().map(run_one).collect()
        } else {
            tasks.iter().map(run_one).collect()
        };
        results.sort_by_key(|(idx, _)| *idx);

        let mut report = BatchReport {
            expected: total,
            ..BatchReport::default()
        };
        for (_, result) in results {
            match result {
                TaskResult::Done(path) => report.outputs.push(path),
                TaskResult::Failed(failure) => report.failures.push(failure),
            }
        }
        report.completed = report.outputs.len();

        progress.report(PROGRESS_FINISHING, "Almost done");
        if let Some(debug) = self.debug {
            debug.increment("batch.completed", report.completed as u64);
            debug.increment("batch.failed", report.failures.len() as u64);
            debug.emit_summary("batch");
            debug.flush();
        }
        if let Some(perf) = self.perf {
            perf.flush();
        }
        progress.report(1.0, "Done");
        Ok(report)
    }

    fn run_task(&self, task: &BannerTask, request: &BatchRequest, output_dir: &Path) -> TaskResult {
        let fail = |error: BannerPressError| {
            TaskResult::Failed(BannerFailure {
                template: task.template.clone(),
                segment: task.segment.clone(),
                source: task.source.clone(),
                error,
            })
        };
        let layout = match &task.layout {
            Ok(layout) => layout,
            Err(err) => return fail(err.duplicate()),
        };
        let stamp = request
            .timestamp
            .unwrap_or_else(|| chrono::Local::now().naive_local());
        let output = output_dir.join(banner_filename(&task.segment, task.index, stamp));
        let overlays = request
            .overlays
            .clone()
            .with(OverlayRole::Actor, task.source.clone());
        let job = BannerJob {
            background: &task.background,
            layout,
            overlays: &overlays,
            texts: &request.texts,
            output: &output,
        };
        match self.compose(task.index, job) {
            Ok(outcome) => TaskResult::Done(outcome.output),
            Err(err) => fail(err),
        }
    }
}
