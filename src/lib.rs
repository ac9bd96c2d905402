mod annotation;
mod assets;
mod banner;
mod batch;
mod debug;
mod error;
mod font;
mod inputs;
mod layout;
mod perf;
mod raster;
mod segment;
mod text;
mod types;

pub use annotation::{BoundingBox, apply_annotations, region_color, to_annotations};
pub use assets::{
    ARTEFACTS_DIR_ENV, AssetDirs, AssetKind, BackgroundRemover, GallerySelection,
    PrefixFileFinder, PreprocessReport, find_files_with_prefix, pending_preprocess,
    preprocess_library,
};
pub use banner::{BannerJob, BannerOutcome, BannerStage, ComposeOptions, RegionPolicy};
pub use batch::{
    BannerFailure, BatchReport, BatchRequest, NoProgress, ProgressSink, SegmentSources,
    banner_filename,
};
pub use bannerpress_style_contract::{
    CONTRACT_ID as STYLE_CONTRACT_ID, CONTRACT_VERSION as STYLE_CONTRACT_VERSION,
    contract_fingerprint_sha256 as style_contract_fingerprint,
};
pub use error::BannerPressError;
pub use font::TextMeasure;
pub use inputs::{
    Alignment, FontRole, OverlayInputs, OverlayRole, TextInputs, TextMode, TextRole, TextStyle,
};
pub use layout::{
    BackgroundSize, LayoutCatalog, LayoutDocument, LayoutSource, Region, UpsertOutcome,
};
pub use raster::{OverlayPlacement, PasteMode, paste, place_overlay, plan_overlay, thumbnail};
pub use segment::{SegmentCatalog, SegmentProfile};
pub use text::{
    MULTILINE_MAX_SIZE, MULTILINE_MIN_SIZE, MultiLineFit, PlacedLine, TextLayout, fit_multiline,
    fit_single_line, layout_text, wrap_words,
};
pub use types::{BoxRect, Rect, Rgb};

use banner::Compositor;
use debug::DebugLogger;
use font::FontRegistry;
use perf::PerfLogger;
use std::path::{Path, PathBuf};
use std::sync::Arc;

pub struct BannerPress {
    font_registry: Arc<FontRegistry>,
    options: ComposeOptions,
    parallel: bool,
    debug: Option<Arc<DebugLogger>>,
    perf: Option<Arc<PerfLogger>>,
}

#[derive(Clone)]
pub struct BannerPressBuilder {
    font_dirs: Vec<PathBuf>,
    font_files: Vec<PathBuf>,
    role_fonts: Vec<(FontRole, PathBuf)>,
    system_fonts: bool,
    allow_missing_fonts: bool,
    options: ComposeOptions,
    parallel: bool,
    debug_path: Option<PathBuf>,
    perf_path: Option<PathBuf>,
}

impl BannerPress {
    pub fn builder() -> BannerPressBuilder {
        BannerPressBuilder::new()
    }

    fn compositor(&self) -> Compositor<'_> {
        Compositor {
            fonts: &self.font_registry,
            options: self.options,
            debug: self.debug.as_deref(),
            perf: self.perf.as_deref(),
        }
    }

    fn emit_debug_summary(&self, context: &str) {
        if let Some(logger) = self.debug.as_deref() {
            logger.emit_summary(context);
            logger.flush();
        }
        if let Some(perf) = self.perf.as_deref() {
            perf.flush();
        }
    }

    pub fn options(&self) -> ComposeOptions {
        self.options
    }

    /// Name of the face bound to `role`, if any.
    pub fn resolved_font(&self, role: FontRole) -> Option<&str> {
        self.font_registry.role_font(role).map(|font| font.name.as_str())
    }

    pub fn resolved_font_path(&self, role: FontRole) -> Option<&Path> {
        self.font_registry
            .role_font(role)
            .and_then(|font| font.path.as_deref())
    }

    /// Whether a registered face answers to `name`: its file stem, family,
    /// full or PostScript name, compared case-insensitively.
    pub fn has_font(&self, name: &str) -> bool {
        self.font_registry.resolve(name).is_some()
    }

    /// Size, wrapping and position `text` would get in `rect` for `role`,
    /// without drawing anything.
    pub fn text_layout(
        &self,
        role: TextRole,
        text: &str,
        rect: Rect,
    ) -> Result<TextLayout, BannerPressError> {
        let style = role.style();
        let handle = self.font_registry.handle(style.font)?;
        Ok(layout_text(text, &style, rect, &handle))
    }

    /// Builds one banner from `background` into `output`.
    pub fn compose_banner(
        &self,
        background: impl AsRef<Path>,
        layout: &LayoutDocument,
        overlays: &OverlayInputs,
        texts: &TextInputs,
        output: impl AsRef<Path>,
    ) -> Result<BannerOutcome, BannerPressError> {
        let job = BannerJob {
            background: background.as_ref(),
            layout,
            overlays,
            texts,
            output: output.as_ref(),
        };
        let result = self.compositor().compose(0, job);
        self.emit_debug_summary("banner");
        result
    }

    /// Generates every banner of `request`. Per-banner failures land in the
    /// report; only validation and source enumeration errors abort.
    pub fn generate_batch(
        &self,
        request: &BatchRequest,
        layouts: &dyn LayoutSource,
        sources: &dyn SegmentSources,
        dirs: &AssetDirs,
        progress: &dyn ProgressSink,
    ) -> Result<BatchReport, BannerPressError> {
        self.compositor()
            .run_batch(request, layouts, sources, dirs, self.parallel, progress)
    }

    /// [`BannerPress::generate_batch`] with segment sources taken from the
    /// processed actor folder of `dirs`.
    pub fn generate_library_batch(
        &self,
        request: &BatchRequest,
        layouts: &dyn LayoutSource,
        dirs: &AssetDirs,
        progress: &dyn ProgressSink,
    ) -> Result<BatchReport, BannerPressError> {
        let finder = PrefixFileFinder::for_processed_actors(dirs);
        self.generate_batch(request, layouts, &finder, dirs, progress)
    }

    /// [`BannerPress::generate_library_batch`] restricted to segments defined
    /// in `segments`. An unknown segment fails validation before any I/O.
    pub fn generate_segment_batch(
        &self,
        request: &BatchRequest,
        layouts: &dyn LayoutSource,
        segments: &SegmentCatalog,
        dirs: &AssetDirs,
        progress: &dyn ProgressSink,
    ) -> Result<BatchReport, BannerPressError> {
        request.validate_against(segments)?;
        self.generate_library_batch(request, layouts, dirs, progress)
    }
}

impl Default for BannerPressBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl BannerPressBuilder {
    pub fn new() -> Self {
        Self {
            font_dirs: Vec::new(),
            font_files: Vec::new(),
            role_fonts: Vec::new(),
            system_fonts: true,
            allow_missing_fonts: false,
            options: ComposeOptions::default(),
            parallel: false,
            debug_path: None,
            perf_path: None,
        }
    }

    pub fn register_font_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.font_dirs.push(path.into());
        self
    }

    pub fn register_font_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.font_files.push(path.into());
        self
    }

    /// Binds `role` to a specific font file, bypassing name lookup.
    pub fn font_for_role(mut self, role: FontRole, path: impl Into<PathBuf>) -> Self {
        self.role_fonts.push((role, path.into()));
        self
    }

    // Search the OS font folders and BANNERPRESS_FONT_DIR for unbound roles.
    pub fn system_fonts(mut self, enabled: bool) -> Self {
        self.system_fonts = enabled;
        self
    }

    // Unresolved roles fall back to approximate metrics and their text is
    // laid out but not drawn. Off by default: such text is a Font error.
    pub fn allow_missing_fonts(mut self, allowed: bool) -> Self {
        self.allow_missing_fonts = allowed;
        self
    }

    pub fn paste_mode(mut self, mode: PasteMode) -> Self {
        self.options.paste_mode = mode;
        self
    }

    pub fn region_policy(mut self, policy: RegionPolicy) -> Self {
        self.options.region_policy = policy;
        self
    }

    // Drop alpha from the finished PNG.
    pub fn flatten_output(mut self, enabled: bool) -> Self {
        self.options.flatten_output = enabled;
        self
    }

    // Banners of a batch run on the rayon pool; steps within a banner stay ordered.
    pub fn parallel(mut self, enabled: bool) -> Self {
        self.parallel = enabled;
        self
    }

    pub fn debug_log(mut self, path: impl Into<PathBuf>) -> Self {
        self.debug_path = Some(path.into());
        self
    }

    pub fn perf_log(mut self, path: impl Into<PathBuf>) -> Self {
        self.perf_path = Some(path.into());
        self
    }

    pub fn build(self) -> Result<BannerPress, BannerPressError> {
        let mut registry = FontRegistry::new();
        registry.set_allow_missing(self.allow_missing_fonts);
        for dir in &self.font_dirs {
            registry.register_dir(dir);
        }
        for file in &self.font_files {
            registry.register_file(file)?;
        }
        for (role, file) in &self.role_fonts {
            registry.assign_role_file(*role, file)?;
        }
        registry.resolve_roles(self.system_fonts);

        let debug = if let Some(path) = self.debug_path {
            Some(Arc::new(DebugLogger::new(path)?))
        } else {
            None
        };
        let perf = if let Some(path) = self.perf_path {
            Some(Arc::new(PerfLogger::new(path)?))
        } else {
            None
        };
        Ok(BannerPress {
            font_registry: Arc::new(registry),
            options: self.options,
            parallel: self.parallel,
            debug,
            perf,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgba, RgbaImage};
    use std::sync::Mutex;

    fn write_png(path: &Path, image: &RgbaImage) {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).unwrap();
        }
        image.save_with_format(path, image::ImageFormat::Png).unwrap();
    }

    fn offline_engine() -> BannerPress {
        BannerPress::builder()
            .system_fonts(false)
            .allow_missing_fonts(true)
            .build()
            .unwrap()
    }

    fn stamp() -> chrono::NaiveDateTime {
        chrono::NaiveDate::from_ymd_opt(2024, 12, 31)
            .unwrap()
            .and_hms_opt(23, 59, 58)
            .unwrap()
    }

    #[test]
    fn square_logo_lands_centered_in_its_region() {
        let dir = tempfile::tempdir().unwrap();
        let background = dir.path().join("bg.png");
        let logo = dir.path().join("logo.png");
        let output = dir.path().join("banner.png");
        write_png(&background, &RgbaImage::from_pixel(160, 90, Rgba([255, 255, 255, 255])));
        write_png(&logo, &RgbaImage::from_pixel(200, 200, Rgba([200, 0, 0, 255])));

        let layout = LayoutDocument::new("summer")
            .with_background_size(160, 90)
            .with_region("logo_position", Rect::new(10, 10, 100, 50));
        let overlays = OverlayInputs::new().with(OverlayRole::Logo, &logo);
        let engine = offline_engine();
        let outcome = engine
            .compose_banner(&background, &layout, &overlays, &TextInputs::new(), &output)
            .unwrap();
        assert_eq!(outcome.overlays_placed, vec![OverlayRole::Logo]);

        let rendered = image::open(&output).unwrap().to_rgb8();
        assert_eq!(rendered.get_pixel(35, 10).0, [200, 0, 0]);
        assert_eq!(rendered.get_pixel(84, 59).0, [200, 0, 0]);
        assert_eq!(rendered.get_pixel(34, 10).0, [255, 255, 255]);
        assert_eq!(rendered.get_pixel(85, 30).0, [255, 255, 255]);
        assert_eq!(rendered.get_pixel(50, 60).0, [255, 255, 255]);
    }

    #[test]
    fn action_text_shrinks_and_anchors_at_region_center() {
        let engine = offline_engine();
        let layout = engine
            .text_layout(TextRole::Action, "BUY NOW", Rect::new(0, 0, 120, 40))
            .unwrap();
        assert_eq!(layout.size, 16);
        assert_eq!(layout.anchor, Some((60, 20)));
        assert!(layout.lines[0].width <= 70);
    }

    #[test]
    fn strict_engine_without_fonts_rejects_text() {
        let engine = BannerPress::builder().system_fonts(false).build().unwrap();
        assert!(matches!(
            engine.text_layout(TextRole::Tagline, "hello", Rect::new(0, 0, 300, 50)),
            Err(BannerPressError::Font(_))
        ));
    }

    #[test]
    fn builder_rejects_non_font_files() {
        let dir = tempfile::tempdir().unwrap();
        let bogus = dir.path().join("notes.txt");
        std::fs::write(&bogus, b"not a font").unwrap();
        assert!(matches!(
            BannerPress::builder().system_fonts(false).register_font_file(&bogus).build(),
            Err(BannerPressError::Font(_))
        ));
        let broken = dir.path().join("broken.ttf");
        std::fs::write(&broken, b"not a font either").unwrap();
        assert!(matches!(
            BannerPress::builder()
                .system_fonts(false)
                .font_for_role(FontRole::MonoBold, &broken)
                .build(),
            Err(BannerPressError::Font(_))
        ));
        let engine = BannerPress::builder()
            .system_fonts(false)
            .register_font_dir(dir.path())
            .build()
            .unwrap();
        assert!(!engine.has_font("broken"));
        assert_eq!(engine.resolved_font_path(FontRole::MonoBold), None);
    }

    #[test]
    fn repeated_runs_are_byte_identical() {
        let dir = tempfile::tempdir().unwrap();
        let background = dir.path().join("bg.png");
        let actor = dir.path().join("actor.png");
        write_png(&background, &RgbaImage::from_pixel(300, 150, Rgba([20, 40, 60, 255])));
        let mut cutout = RgbaImage::new(90, 120);
        for (x, y, px) in cutout.enumerate_pixels_mut() {
            if (x as i32 - 45).pow(2) + (y as i32 - 60).pow(2) < 40 * 40 {
                *px = Rgba([(x * 2) as u8, (y * 2) as u8, 128, 255]);
            }
        }
        write_png(&actor, &cutout);
        let layout = LayoutDocument::new("t").with_region("actor_position", Rect::new(150, 0, 150, 150));
        let overlays = OverlayInputs::new().with(OverlayRole::Actor, &actor);
        let engine = offline_engine();

        let a = dir.path().join("a.png");
        let b = dir.path().join("b.png");
        engine
            .compose_banner(&background, &layout, &overlays, &TextInputs::new(), &a)
            .unwrap();
        engine
            .compose_banner(&background, &layout, &overlays, &TextInputs::new(), &b)
            .unwrap();
        assert_eq!(std::fs::read(&a).unwrap(), std::fs::read(&b).unwrap());
        // Transparent corners of the cut-out leave the background visible.
        let rendered = image::open(&a).unwrap().to_rgb8();
        assert_eq!(rendered.get_pixel(170, 5).0, [20, 40, 60]);
    }

    #[test]
    fn seeded_catalog_drives_a_library_batch() {
        let dir = tempfile::tempdir().unwrap();
        let dirs = AssetDirs::new(dir.path().join("artefacts"));
        for template in ["summer", "winter"] {
            write_png(
                &dirs.background_path(template),
                &RgbaImage::from_pixel(64, 32, Rgba([255, 255, 255, 255])),
            );
        }
        for segment in ["family", "students", "seniors"] {
            write_png(
                &dirs.processed_actor_path(&format!("{segment}_01.png")),
                &RgbaImage::from_pixel(16, 16, Rgba([0, 0, 0, 255])),
            );
        }
        let seed = r#"{"banner_template":[
            {"bannertemplate":"summer","background_size":{"width":64,"height":32},
             "actor_position":{"x":0,"y":0,"width":32,"height":32,"color":"rgb(255, 0, 0)"},
             "text_action_position":{"x":32,"y":0,"width":32,"height":32}},
            {"bannertemplate":"winter",
             "actor_position":{"x":32,"y":0,"width":32,"height":32,"color":[0,0,255]}}
        ]}"#;
        let catalog = LayoutCatalog::from_seed_json(seed).unwrap();
        let log = dir.path().join("debug.jsonl");
        let perf = dir.path().join("perf.log");
        let engine = BannerPress::builder()
            .system_fonts(false)
            .allow_missing_fonts(true)
            .debug_log(&log)
            .perf_log(&perf)
            .parallel(true)
            .build()
            .unwrap();
        let request = BatchRequest::new(["summer", "winter"], ["family", "students", "seniors"])
            .with_texts(TextInputs::new().with(TextRole::Action, "GO"))
            .with_timestamp(stamp());
        let seen = Mutex::new(Vec::new());
        let progress = |fraction: f32, _: &str| seen.lock().unwrap().push(fraction);
        let report = engine
            .generate_library_batch(&request, &catalog, &dirs, &progress)
            .unwrap();

        assert_eq!(report.expected, 6);
        assert_eq!(report.completed, 6);
        assert!(report.failures.is_empty());
        assert!(report.outputs[3].ends_with("Banner_Generated/family_4_3112235958.png"));
        let fractions = seen.lock().unwrap().clone();
        assert_eq!(fractions.iter().filter(|f| **f >= 1.0).count(), 1);
        assert_eq!(fractions.last(), Some(&1.0));

        let events: Vec<serde_json::Value> = std::fs::read_to_string(&log)
            .unwrap()
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect();
        let summary = events.last().unwrap();
        assert_eq!(summary["type"], "debug.summary");
        assert_eq!(summary["counts"]["banner.done"], 6);
        assert_eq!(summary["counts"]["overlay.placed"], 6);
        assert_eq!(summary["counts"]["text.fitted"], 3);
        let perf_lines = std::fs::read_to_string(&perf).unwrap();
        assert!(perf_lines.contains("\"banner.total\""));
    }

    #[test]
    fn segment_batch_checks_the_segment_catalog_first() {
        let dir = tempfile::tempdir().unwrap();
        let dirs = AssetDirs::new(dir.path().join("artefacts"));
        write_png(
            &dirs.background_path("summer"),
            &RgbaImage::from_pixel(32, 16, Rgba([255, 255, 255, 255])),
        );
        write_png(
            &dirs.processed_actor_path("family_01.png"),
            &RgbaImage::from_pixel(8, 8, Rgba([0, 0, 0, 255])),
        );
        let mut layouts = LayoutCatalog::new();
        layouts.upsert(
            LayoutDocument::new("summer").with_region("actor_position", Rect::new(0, 0, 16, 16)),
        );
        let mut segments = SegmentCatalog::new();
        segments.create(SegmentProfile::new("family")).unwrap();
        let engine = offline_engine();

        let seen = Mutex::new(Vec::new());
        let progress = |fraction: f32, _: &str| seen.lock().unwrap().push(fraction);
        let unknown = BatchRequest::new(["summer"], ["seniors"]).with_timestamp(stamp());
        let err = engine
            .generate_segment_batch(&unknown, &layouts, &segments, &dirs, &progress)
            .unwrap_err();
        assert!(matches!(err, BannerPressError::Validation(_)));
        assert!(seen.lock().unwrap().is_empty());
        assert!(!dirs.generated_dir().exists());

        let known = BatchRequest::new(["summer"], ["family"]).with_timestamp(stamp());
        let report = engine
            .generate_segment_batch(&known, &layouts, &segments, &dirs, &progress)
            .unwrap();
        assert!(report.is_clean());
        assert_eq!(report.completed, 1);
    }

    #[test]
    fn annotations_round_trip_through_a_catalog() {
        let mut catalog = LayoutCatalog::new();
        let doc = LayoutDocument::new("summer")
            .with_background_size(1200, 628)
            .with_region("logo_position", Rect::new(10, 10, 100, 50));
        assert_eq!(catalog.upsert(doc), UpsertOutcome::Created);

        let mut edited = catalog.get("summer").unwrap().clone();
        let mut boxes = to_annotations(&edited);
        boxes[0].xmax = 310;
        apply_annotations(&mut edited, &boxes).unwrap();
        assert_eq!(catalog.upsert(edited), UpsertOutcome::Updated);

        let reloaded = LayoutCatalog::from_seed_json(&catalog.to_seed_json()).unwrap();
        let logo = reloaded.get("summer").unwrap().region("logo_position").unwrap();
        assert_eq!(logo.rect, Rect::new(10, 10, 300, 50));
        assert_eq!(logo.color, Some(Rgb(66, 133, 244)));
    }

    #[test]
    fn system_font_text_changes_pixels_inside_its_region() {
        let engine = BannerPress::builder().build().unwrap();
        if engine.resolved_font(FontRole::MonoBold).is_none() {
            return;
        }
        let dir = tempfile::tempdir().unwrap();
        let background = dir.path().join("bg.png");
        let output = dir.path().join("out.png");
        write_png(&background, &RgbaImage::from_pixel(240, 80, Rgba([0, 0, 0, 255])));
        let region = Rect::new(0, 0, 240, 80);
        let layout = LayoutDocument::new("t").with_region("text_action_position", region);
        let texts = TextInputs::new().with(TextRole::Action, "BUY NOW");
        let outcome = engine
            .compose_banner(&background, &layout, &OverlayInputs::new(), &texts, &output)
            .unwrap();
        assert_eq!(outcome.texts_drawn, vec![TextRole::Action]);
        let rendered = image::open(&output).unwrap().to_rgb8();
        let lit = rendered.pixels().filter(|px| px.0[0] > 128).count();
        assert!(lit > 0);
        let outside = rendered
            .enumerate_pixels()
            .filter(|(x, _, px)| (*x < 25 || *x >= 215) && px.0[0] > 0)
            .count();
        assert_eq!(outside, 0);
    }
}
