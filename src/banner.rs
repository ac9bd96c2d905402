use crate::debug::DebugLogger;
use crate::error::BannerPressError;
use crate::font::FontRegistry;
use crate::inputs::{OverlayInputs, OverlayRole, TextInputs, TextRole};
use crate::layout::LayoutDocument;
use crate::perf::PerfLogger;
use crate::raster::{self, PasteMode};
use crate::text::layout_text;
use crate::types::Rect;
use image::RgbaImage;
use serde_json::json;
use std::path::{Path, PathBuf};
use std::time::Instant;

/// What happens to a region that does not fit inside the background.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RegionPolicy {
    /// Cut the region down to the image bounds. A region with nothing left
    /// inside the image is still an error.
    #[default]
    Clamp,
    Reject,
}

impl RegionPolicy {
    pub fn resolve(self, label: &str, rect: Rect, width: u32, height: u32) -> Result<Rect, BannerPressError> {
        if rect.fits_within(width, height) {
            return Ok(rect);
        }
        let clamped = match self {
            RegionPolicy::Clamp => rect.clamped_to(width, height),
            RegionPolicy::Reject => None,
        };
        clamped.ok_or_else(|| {
            BannerPressError::InvalidRegion(format!(
                "{label} ({},{} {}x{}) exceeds background {}x{}",
                rect.x, rect.y, rect.width, rect.height, width, height
            ))
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum BannerStage {
    Init,
    OverlaysApplied,
    TextApplied,
    Done,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ComposeOptions {
    pub paste_mode: PasteMode,
    pub region_policy: RegionPolicy,
    pub flatten_output: bool,
}

impl Default for ComposeOptions {
    fn default() -> Self {
        Self {
            paste_mode: PasteMode::MaskCutover,
            region_policy: RegionPolicy::Clamp,
            flatten_output: true,
        }
    }
}

/// Everything one banner is built from.
#[derive(Debug, Clone, Copy)]
pub struct BannerJob<'a> {
    pub background: &'a Path,
    pub layout: &'a LayoutDocument,
    pub overlays: &'a OverlayInputs,
    pub texts: &'a TextInputs,
    pub output: &'a Path,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BannerOutcome {
    pub output: PathBuf,
    pub stage: BannerStage,
    pub overlays_placed: Vec<OverlayRole>,
    pub texts_drawn: Vec<TextRole>,
}

pub(crate) struct Compositor<'a> {
    pub(crate) fonts: &'a FontRegistry,
    pub(crate) options: ComposeOptions,
    pub(crate) debug: Option<&'a DebugLogger>,
    pub(crate) perf: Option<&'a PerfLogger>,
}

/// Per-banner file state. Every step reads the current image from disk and
/// writes it back to the output path; until a step has written, the current
/// image is the background.
struct BannerRun<'a> {
    job: BannerJob<'a>,
    id: usize,
    written: bool,
    stage: BannerStage,
    overlays_placed: Vec<OverlayRole>,
    texts_drawn: Vec<TextRole>,
}

impl<'a> BannerRun<'a> {
    fn current_path(&self) -> &'a Path {
        if self.written {
            self.job.output
        } else {
            self.job.background
        }
    }

    fn load_current(&self) -> Result<RgbaImage, BannerPressError> {
        raster::load_rgba(self.current_path())
    }

    fn store(&mut self, image: &RgbaImage) -> Result<(), BannerPressError> {
        raster::save_png(image, self.job.output, false)?;
        self.written = true;
        Ok(())
    }

    fn advance(&mut self, next: BannerStage) {
        debug_assert!(next > self.stage);
        self.stage = next;
    }
}

impl Compositor<'_> {
    fn log(&self, kind: &str, fields: serde_json::Value) {
        if let Some(debug) = self.debug {
            debug.log_event(kind, fields);
        }
    }

    fn span(&self, name: &str, id: usize, started: Instant) {
        if let Some(perf) = self.perf {
            perf.log_span_ms(name, Some(id), started.elapsed().as_secs_f64() * 1000.0);
        }
    }

    /// Runs one banner through INIT -> OVERLAYS_APPLIED -> TEXT_APPLIED -> DONE.
    pub(crate) fn compose(&self, id: usize, job: BannerJob<'_>) -> Result<BannerOutcome, BannerPressError> {
        let started = Instant::now();
        self.log(
            "banner.start",
            json!({
                "banner": id,
                "template": job.layout.name(),
                "background": job.background.display().to_string(),
                "output": job.output.display().to_string(),
            }),
        );
        let mut run = BannerRun {
            job,
            id,
            written: false,
            stage: BannerStage::Init,
            overlays_placed: Vec::new(),
            texts_drawn: Vec::new(),
        };
        match self.run_steps(&mut run) {
            Ok(()) => {
                self.span("banner.total", id, started);
                if let Some(perf) = self.perf {
                    perf.log_counts(
                        "banner",
                        Some(id),
                        &[
                            ("overlays", run.overlays_placed.len() as u64),
                            ("texts", run.texts_drawn.len() as u64),
                        ],
                    );
                }
                self.log(
                    "banner.done",
                    json!({
                        "banner": id,
                        "output": run.job.output.display().to_string(),
                        "overlays": run.overlays_placed.len(),
                        "texts": run.texts_drawn.len(),
                    }),
                );
                Ok(BannerOutcome {
                    output: run.job.output.to_path_buf(),
                    stage: run.stage,
                    overlays_placed: run.overlays_placed,
                    texts_drawn: run.texts_drawn,
                })
            }
            Err(err) => {
                self.log(
                    "banner.failed",
                    json!({
                        "banner": id,
                        "stage": format!("{:?}", run.stage),
                        "error": err.to_string(),
                    }),
                );
                Err(err)
            }
        }
    }

    fn run_steps(&self, run: &mut BannerRun<'_>) -> Result<(), BannerPressError> {
        let t_overlays = Instant::now();
        for role in OverlayRole::ALL {
            self.apply_overlay(run, role)?;
        }
        run.advance(BannerStage::OverlaysApplied);
        self.span("banner.overlays", run.id, t_overlays);

        let t_text = Instant::now();
        for role in TextRole::ALL {
            self.apply_text(run, role)?;
        }
        run.advance(BannerStage::TextApplied);
        self.span("banner.text", run.id, t_text);

        if !run.written || self.options.flatten_output {
            let image = run.load_current()?;
            raster::save_png(&image, run.job.output, self.options.flatten_output)?;
            run.written = true;
        }
        run.advance(BannerStage::Done);
        Ok(())
    }

    fn apply_overlay(&self, run: &mut BannerRun<'_>, role: OverlayRole) -> Result<(), BannerPressError> {
        let region = run.job.layout.overlay_region(role);
        let source = run.job.overlays.get(role);
        let (Some(region), Some(source)) = (region, source) else {
            self.log(
                "overlay.skipped",
                json!({
                    "banner": run.id,
                    "role": role.key(),
                    "has_region": region.is_some(),
                    "has_input": source.is_some(),
                }),
            );
            return Ok(());
        };
        let mut canvas = run.load_current()?;
        let target = self.options.region_policy.resolve(
            role.region_label(),
            region,
            canvas.width(),
            canvas.height(),
        )?;
        let overlay = raster::load_rgba(source)?;
        let placement = raster::place_overlay(&mut canvas, &overlay, target, self.options.paste_mode);
        run.store(&canvas)?;
        run.overlays_placed.push(role);
        self.log(
            "overlay.placed",
            json!({
                "banner": run.id,
                "role": role.key(),
                "source": source.display().to_string(),
                "x": placement.x,
                "y": placement.y,
                "width": placement.width,
                "height": placement.height,
            }),
        );
        Ok(())
    }

    fn apply_text(&self, run: &mut BannerRun<'_>, role: TextRole) -> Result<(), BannerPressError> {
        let region = run.job.layout.text_region(role);
        let text = run.job.texts.get(role);
        let (Some(region), Some(text)) = (region, text) else {
            self.log(
                "text.skipped",
                json!({
                    "banner": run.id,
                    "role": role.key(),
                    "has_region": region.is_some(),
                    "has_input": text.is_some(),
                }),
            );
            return Ok(());
        };
        let style = role.style();
        let handle = self.fonts.handle(style.font)?;
        let mut canvas = run.load_current()?;
        let target = self.options.region_policy.resolve(
            role.region_label(),
            region,
            canvas.width(),
            canvas.height(),
        )?;
        let layout = layout_text(text, &style, target, &handle);
        self.log(
            "text.fitted",
            json!({
                "banner": run.id,
                "role": role.key(),
                "size": layout.size,
                "lines": layout.lines.len(),
                "anchor": layout.anchor,
                "approximate": handle.is_approximate(),
            }),
        );
        let Some(font) = handle.font() else {
            self.log(
                "text.skipped",
                json!({
                    "banner": run.id,
                    "role": role.key(),
                    "reason": "font role unresolved",
                    "font_role": style.font.id(),
                }),
            );
            return Ok(());
        };
        let glyphs = raster::draw_text(&mut canvas, &layout, style.color, font)?;
        if let Some(debug) = self.debug {
            debug.increment("text.glyphs", glyphs as u64);
        }
        run.store(&canvas)?;
        run.texts_drawn.push(role);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;

    fn write_png(path: &Path, image: &RgbaImage) {
        image.save_with_format(path, image::ImageFormat::Png).unwrap();
    }

    fn approx_fonts() -> FontRegistry {
        let mut fonts = FontRegistry::new();
        fonts.set_allow_missing(true);
        fonts
    }

    #[test]
    fn clamp_cuts_region_and_reject_refuses_it() {
        let rect = Rect::new(150, 80, 100, 50);
        assert_eq!(
            RegionPolicy::Clamp.resolve("logo_position", rect, 200, 100).unwrap(),
            Rect::new(150, 80, 50, 20)
        );
        assert!(matches!(
            RegionPolicy::Reject.resolve("logo_position", rect, 200, 100),
            Err(BannerPressError::InvalidRegion(_))
        ));
        assert!(matches!(
            RegionPolicy::Clamp.resolve("logo_position", Rect::new(300, 0, 10, 10), 200, 100),
            Err(BannerPressError::InvalidRegion(_))
        ));
        let inside = Rect::new(0, 0, 200, 100);
        assert_eq!(RegionPolicy::Reject.resolve("x", inside, 200, 100).unwrap(), inside);
    }

    #[test]
    fn overlays_layer_in_fixed_order_onto_output() {
        let dir = tempfile::tempdir().unwrap();
        let background = dir.path().join("bg.png");
        let actor = dir.path().join("actor.png");
        let logo = dir.path().join("logo.png");
        let output = dir.path().join("out.png");
        write_png(&background, &RgbaImage::from_pixel(40, 20, Rgba([255, 255, 255, 255])));
        write_png(&actor, &RgbaImage::from_pixel(10, 10, Rgba([255, 0, 0, 255])));
        write_png(&logo, &RgbaImage::from_pixel(10, 10, Rgba([0, 0, 255, 255])));

        // Both regions cover the same square; logo is applied after actor.
        let layout = LayoutDocument::new("t")
            .with_region("actor_position", Rect::new(0, 0, 20, 20))
            .with_region("logo_position", Rect::new(0, 0, 20, 20));
        let overlays = OverlayInputs::new()
            .with(OverlayRole::Logo, &logo)
            .with(OverlayRole::Actor, &actor);
        let texts = TextInputs::new();
        let fonts = approx_fonts();
        let compositor = Compositor {
            fonts: &fonts,
            options: ComposeOptions::default(),
            debug: None,
            perf: None,
        };
        let outcome = compositor
            .compose(
                0,
                BannerJob {
                    background: &background,
                    layout: &layout,
                    overlays: &overlays,
                    texts: &texts,
                    output: &output,
                },
            )
            .unwrap();
        assert_eq!(outcome.stage, BannerStage::Done);
        assert_eq!(outcome.overlays_placed, vec![OverlayRole::Actor, OverlayRole::Logo]);

        let rendered = image::open(&output).unwrap();
        assert_eq!(rendered.color(), image::ColorType::Rgb8);
        let rendered = rendered.to_rgba8();
        assert_eq!(rendered.get_pixel(10, 10).0, [0, 0, 255, 255]);
        assert_eq!(rendered.get_pixel(30, 10).0, [255, 255, 255, 255]);
        // Background file is never modified.
        let bg = image::open(&background).unwrap().to_rgba8();
        assert_eq!(bg.get_pixel(10, 10).0, [255, 255, 255, 255]);
    }

    #[test]
    fn nothing_applicable_still_writes_background() {
        let dir = tempfile::tempdir().unwrap();
        let background = dir.path().join("bg.png");
        let output = dir.path().join("out.png");
        write_png(&background, &RgbaImage::from_pixel(8, 8, Rgba([10, 20, 30, 255])));
        let layout = LayoutDocument::new("t").with_region("logo_position", Rect::new(0, 0, 4, 4));
        // Logo region without a logo input, actor input without a region.
        let overlays = OverlayInputs::new().with(OverlayRole::Actor, dir.path().join("missing.png"));
        let texts = TextInputs::new().with(TextRole::Action, "BUY NOW");
        let fonts = approx_fonts();
        let options = ComposeOptions {
            flatten_output: false,
            ..ComposeOptions::default()
        };
        let compositor = Compositor {
            fonts: &fonts,
            options,
            debug: None,
            perf: None,
        };
        let outcome = compositor
            .compose(
                3,
                BannerJob {
                    background: &background,
                    layout: &layout,
                    overlays: &overlays,
                    texts: &texts,
                    output: &output,
                },
            )
            .unwrap();
        assert!(outcome.overlays_placed.is_empty());
        assert!(outcome.texts_drawn.is_empty());
        let rendered = image::open(&output).unwrap().to_rgba8();
        assert_eq!(rendered.get_pixel(7, 7).0, [10, 20, 30, 255]);
    }

    #[test]
    fn unreadable_overlay_fails_banner_and_logs_it() {
        let dir = tempfile::tempdir().unwrap();
        let background = dir.path().join("bg.png");
        let output = dir.path().join("out.png");
        let log_path = dir.path().join("debug.jsonl");
        write_png(&background, &RgbaImage::from_pixel(8, 8, Rgba([0, 0, 0, 255])));
        let layout = LayoutDocument::new("t").with_region("logo_position", Rect::new(0, 0, 4, 4));
        let overlays = OverlayInputs::new().with(OverlayRole::Logo, dir.path().join("nope.png"));
        let texts = TextInputs::new();
        let fonts = approx_fonts();
        let debug = DebugLogger::new(&log_path).unwrap();
        let compositor = Compositor {
            fonts: &fonts,
            options: ComposeOptions::default(),
            debug: Some(&debug),
            perf: None,
        };
        let err = compositor
            .compose(
                1,
                BannerJob {
                    background: &background,
                    layout: &layout,
                    overlays: &overlays,
                    texts: &texts,
                    output: &output,
                },
            )
            .unwrap_err();
        assert!(matches!(err, BannerPressError::Io(_)));
        debug.flush();
        let log = std::fs::read_to_string(&log_path).unwrap();
        assert!(log.lines().next().unwrap().contains("\"banner.start\""));
        assert!(log.lines().last().unwrap().contains("\"banner.failed\""));
    }

    #[test]
    fn text_without_resolved_font_is_an_error_unless_allowed() {
        let dir = tempfile::tempdir().unwrap();
        let background = dir.path().join("bg.png");
        let output = dir.path().join("out.png");
        write_png(&background, &RgbaImage::from_pixel(120, 40, Rgba([0, 0, 0, 255])));
        let layout =
            LayoutDocument::new("t").with_region("text_action_position", Rect::new(0, 0, 120, 40));
        let overlays = OverlayInputs::new();
        let texts = TextInputs::new().with(TextRole::Action, "BUY NOW");
        let strict = FontRegistry::new();
        let compositor = Compositor {
            fonts: &strict,
            options: ComposeOptions::default(),
            debug: None,
            perf: None,
        };
        let job = BannerJob {
            background: &background,
            layout: &layout,
            overlays: &overlays,
            texts: &texts,
            output: &output,
        };
        assert!(matches!(compositor.compose(0, job), Err(BannerPressError::Font(_))));

        let relaxed = approx_fonts();
        let compositor = Compositor {
            fonts: &relaxed,
            options: ComposeOptions::default(),
            debug: None,
            perf: None,
        };
        let outcome = compositor.compose(0, job).unwrap();
        assert!(outcome.texts_drawn.is_empty());
        assert!(output.exists());
    }
}
