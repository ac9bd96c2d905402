use crate::batch::{PROGRESS_FINISHING, PROGRESS_START, ProgressSink, SegmentSources, round2};
use crate::error::BannerPressError;
use crate::raster;
use image::RgbaImage;
use std::collections::HashSet;
use std::path::{Path, PathBuf};

pub const ARTEFACTS_DIR_ENV: &str = "BANNERPRESS_ARTEFACTS_DIR";
pub const DEFAULT_ARTEFACTS_DIR: &str = "./artefacts";
pub const PROCESSED_PREFIX: &str = "NoBg_";
pub const MASK_PREFIX: &str = "Mask_";
pub const GALLERY_EXTENSIONS: [&str; 5] = ["jpg", "jpeg", "png", "gif", "bmp"];
pub const THUMBNAIL_SIZE: u32 = 200;

/// Folders of the asset library.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssetKind {
    Actor,
    ProcessedActor,
    Background,
    Logo,
    Graphic,
    Generated,
}

impl AssetKind {
    pub const ALL: [AssetKind; 6] = [
        AssetKind::Actor,
        AssetKind::ProcessedActor,
        AssetKind::Background,
        AssetKind::Logo,
        AssetKind::Graphic,
        AssetKind::Generated,
    ];

    pub fn dir_name(&self) -> &'static str {
        match self {
            AssetKind::Actor => "Actors",
            AssetKind::ProcessedActor => "Actors_Processed",
            AssetKind::Background => "Background",
            AssetKind::Logo => "Logo",
            AssetKind::Graphic => "Graphics",
            AssetKind::Generated => "Banner_Generated",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AssetKind::Actor => "actor",
            AssetKind::ProcessedActor => "processed_actor",
            AssetKind::Background => "background",
            AssetKind::Logo => "logo",
            AssetKind::Graphic => "graphic",
            AssetKind::Generated => "generated",
        }
    }

    pub fn from_str(raw: &str) -> Option<Self> {
        let raw = raw.trim().to_ascii_lowercase();
        Self::ALL.into_iter().find(|kind| kind.as_str() == raw)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssetDirs {
    root: PathBuf,
}

impl AssetDirs {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Root from `BANNERPRESS_ARTEFACTS_DIR`, else `./artefacts`.
    pub fn from_env() -> Self {
        match std::env::var_os(ARTEFACTS_DIR_ENV) {
            Some(value) if !value.is_empty() => Self::new(value),
            _ => Self::new(DEFAULT_ARTEFACTS_DIR),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn dir(&self, kind: AssetKind) -> PathBuf {
        self.root.join(kind.dir_name())
    }

    pub fn background_path(&self, template: &str) -> PathBuf {
        self.dir(AssetKind::Background).join(format!("{template}.png"))
    }

    pub fn generated_dir(&self) -> PathBuf {
        self.dir(AssetKind::Generated)
    }

    /// Where the cut-out of the actor file `file_name` lives.
    pub fn processed_actor_path(&self, file_name: &str) -> PathBuf {
        self.dir(AssetKind::ProcessedActor)
            .join(format!("{PROCESSED_PREFIX}{file_name}"))
    }

    pub fn mask_path(&self, file_name: &str) -> PathBuf {
        self.dir(AssetKind::ProcessedActor)
            .join(format!("{MASK_PREFIX}{file_name}"))
    }

    pub fn create_all(&self) -> Result<(), BannerPressError> {
        for kind in AssetKind::ALL {
            std::fs::create_dir_all(self.dir(kind))?;
        }
        Ok(())
    }
}

/// Recursive file lookup by file-name prefix, sorted by path. A missing
/// directory yields no files.
pub fn find_files_with_prefix(dir: &Path, prefix: &str) -> Result<Vec<PathBuf>, BannerPressError> {
    let mut out = Vec::new();
    walk_files(dir, &mut |path| {
        if file_name_of(path).is_some_and(|name| name.starts_with(prefix)) {
            out.push(path.to_path_buf());
        }
    })?;
    out.sort();
    Ok(out)
}

fn walk_files(dir: &Path, visit: &mut dyn FnMut(&Path)) -> Result<(), BannerPressError> {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(()),
        Err(err) => return Err(err.into()),
    };
    for entry in entries {
        let path = entry?.path();
        if path.is_dir() {
            walk_files(&path, visit)?;
        } else if path.is_file() {
            visit(&path);
        }
    }
    Ok(())
}

fn file_name_of(path: &Path) -> Option<&str> {
    path.file_name().and_then(|name| name.to_str())
}

fn has_extension(path: &Path, extensions: &[&str]) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| extensions.iter().any(|e| e.eq_ignore_ascii_case(ext)))
}

/// Segment source lookup: files named `{prefix}{segment}*` under one folder.
#[derive(Debug, Clone)]
pub struct PrefixFileFinder {
    dir: PathBuf,
    prefix: String,
}

impl PrefixFileFinder {
    pub fn new(dir: impl Into<PathBuf>, prefix: impl Into<String>) -> Self {
        Self {
            dir: dir.into(),
            prefix: prefix.into(),
        }
    }

    pub fn for_processed_actors(dirs: &AssetDirs) -> Self {
        Self::new(dirs.dir(AssetKind::ProcessedActor), PROCESSED_PREFIX)
    }
}

impl SegmentSources for PrefixFileFinder {
    fn sources_for(&self, segment: &str) -> Result<Vec<PathBuf>, BannerPressError> {
        find_files_with_prefix(&self.dir, &format!("{}{}", self.prefix, segment))
    }
}

/// Files shown in a gallery after a folder/file selection, addressable by
/// click position.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GallerySelection {
    paths: Vec<PathBuf>,
}

impl GallerySelection {
    /// Every selected file contributes its parent folder; selected folders
    /// contribute themselves. Each distinct folder is listed once, in first
    /// selection order, with its image files sorted by name.
    pub fn from_selection<P: AsRef<Path>>(selected: &[P]) -> Result<Self, BannerPressError> {
        let mut seen = HashSet::new();
        let mut folders = Vec::new();
        for item in selected {
            let item = item.as_ref();
            let folder = if item.is_file() {
                item.parent().map(Path::to_path_buf).unwrap_or_default()
            } else {
                item.to_path_buf()
            };
            if seen.insert(folder.clone()) {
                folders.push(folder);
            }
        }

        let mut paths = Vec::new();
        for folder in folders {
            let mut images = Vec::new();
            for entry in std::fs::read_dir(&folder)? {
                let path = entry?.path();
                if path.is_file() && has_extension(&path, &GALLERY_EXTENSIONS) {
                    images.push(path);
                }
            }
            images.sort();
            paths.extend(images);
        }
        Ok(Self { paths })
    }

    pub fn path(&self, index: usize) -> Option<&Path> {
        self.paths.get(index).map(PathBuf::as_path)
    }

    pub fn paths(&self) -> &[PathBuf] {
        &self.paths
    }

    pub fn len(&self) -> usize {
        self.paths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }

    pub fn open(&self, index: usize) -> Result<RgbaImage, BannerPressError> {
        let path = self.path(index).ok_or_else(|| {
            BannerPressError::Validation(format!(
                "gallery index {index} is out of range ({} images)",
                self.len()
            ))
        })?;
        raster::load_rgba(path)
    }

    pub fn thumbnails(&self) -> Result<Vec<RgbaImage>, BannerPressError> {
        self.paths
            .iter()
            .map(|path| {
                let image = raster::load_rgba(path)?;
                Ok(raster::thumbnail(&image, THUMBNAIL_SIZE, THUMBNAIL_SIZE))
            })
            .collect()
    }
}

/// External cut-out step: writes the foreground of `input` to `output` and
/// its mask to `mask`.
pub trait BackgroundRemover: Sync {
    fn remove_background(&self, input: &Path, output: &Path, mask: &Path) -> Result<(), BannerPressError>;
}

impl<F> BackgroundRemover for F
where
    F: Fn(&Path, &Path, &Path) -> Result<(), BannerPressError> + Sync,
{
    fn remove_background(&self, input: &Path, output: &Path, mask: &Path) -> Result<(), BannerPressError> {
        self(input, output, mask)
    }
}

#[derive(Debug, Default)]
pub struct PreprocessReport {
    pub pending: usize,
    pub processed: Vec<PathBuf>,
    pub failures: Vec<(PathBuf, BannerPressError)>,
}

/// Actor PNGs (recursive) that have no processed counterpart yet.
pub fn pending_preprocess(dirs: &AssetDirs) -> Result<Vec<PathBuf>, BannerPressError> {
    let mut pending = Vec::new();
    walk_files(&dirs.dir(AssetKind::Actor), &mut |path| {
        if !has_extension(path, &["png"]) {
            return;
        }
        if let Some(name) = file_name_of(path) {
            if !dirs.processed_actor_path(name).exists() {
                pending.push(path.to_path_buf());
            }
        }
    })?;
    pending.sort();
    Ok(pending)
}

/// Runs `remover` over every pending actor image. Progress goes 0.1, then
/// `round(k / pending * 0.8, 2)` before the k-th file, then 0.95.
pub fn preprocess_library(
    dirs: &AssetDirs,
    remover: &dyn BackgroundRemover,
    progress: &dyn ProgressSink,
) -> Result<PreprocessReport, BannerPressError> {
    progress.report(PROGRESS_START, "Checking for unprocessed assets");
    let pending = pending_preprocess(dirs)?;
    let mut report = PreprocessReport {
        pending: pending.len(),
        ..PreprocessReport::default()
    };
    if !pending.is_empty() {
        std::fs::create_dir_all(dirs.dir(AssetKind::ProcessedActor))?;
    }
    let total = pending.len();
    for (done, input) in pending.into_iter().enumerate() {
        progress.report(
            round2((done + 1) as f32 / total as f32 * 0.8),
            "Processing unprocessed assets",
        );
        let name = file_name_of(&input).unwrap_or_default().to_string();
        let output = dirs.processed_actor_path(&name);
        match remover.remove_background(&input, &output, &dirs.mask_path(&name)) {
            Ok(()) => report.processed.push(output),
            Err(err) => report.failures.push((input, err)),
        }
    }
    progress.report(PROGRESS_FINISHING, "Almost done");
    Ok(report)
}
