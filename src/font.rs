use crate::error::BannerPressError;
use crate::inputs::FontRole;
use bannerpress_style_contract::font_role_def;
use rustybuzz::{Direction as HbDirection, Face as HbFace, UnicodeBuffer};
use std::collections::{HashMap, VecDeque};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, OnceLock};
use ttf_parser::GlyphId;

const SYSTEM_FONT_SCAN_DEPTH: usize = 4;

/// Pixel metrics for a font at an integer point size.
pub trait TextMeasure {
    fn text_width(&self, text: &str, size: u32) -> u32;
    fn ascent(&self, size: u32) -> u32;
    fn descent(&self, size: u32) -> u32;
}

#[derive(Debug, Clone, Hash, PartialEq, Eq)]
struct TextWidthKey {
    font_index: usize,
    size: u32,
    text: String,
}

#[derive(Debug)]
struct TextWidthCache {
    map: HashMap<TextWidthKey, u32>,
    order: VecDeque<TextWidthKey>,
    max_entries: usize,
}

impl TextWidthCache {
    fn new(max_entries: usize) -> Self {
        Self {
            map: HashMap::new(),
            order: VecDeque::new(),
            max_entries,
        }
    }

    fn get(&self, key: &TextWidthKey) -> Option<u32> {
        self.map.get(key).copied()
    }

    fn insert(&mut self, key: TextWidthKey, value: u32) {
        if self.map.contains_key(&key) {
            return;
        }
        self.map.insert(key.clone(), value);
        self.order.push_back(key);
        while self.map.len() > self.max_entries {
            if let Some(old) = self.order.pop_front() {
                self.map.remove(&old);
            } else {
                break;
            }
        }
    }
}

#[derive(Debug)]
pub(crate) struct LoadedFont {
    pub(crate) name: String,
    pub(crate) path: Option<PathBuf>,
    pub(crate) data: Arc<Vec<u8>>,
    units_per_em: u16,
    ascender: i16,
    descender: i16,
}

#[derive(Debug)]
pub(crate) struct FontRegistry {
    fonts: Vec<LoadedFont>,
    lookup: HashMap<String, usize>,
    roles: HashMap<FontRole, usize>,
    allow_missing: bool,
    text_width_cache: Mutex<TextWidthCache>,
}

/// Metrics source for one role: a loaded face, or fixed-ratio approximations
/// when the role could not be resolved and missing fonts are allowed.
#[derive(Clone, Copy)]
pub(crate) struct FontHandle<'a> {
    registry: &'a FontRegistry,
    index: Option<usize>,
}

impl FontRegistry {
    pub(crate) fn new() -> Self {
        Self {
            fonts: Vec::new(),
            lookup: HashMap::new(),
            roles: HashMap::new(),
            allow_missing: false,
            text_width_cache: Mutex::new(TextWidthCache::new(20_000)),
        }
    }

    pub(crate) fn set_allow_missing(&mut self, allowed: bool) {
        self.allow_missing = allowed;
    }

    pub(crate) fn register_dir(&mut self, path: impl AsRef<Path>) {
        let Ok(entries) = fs::read_dir(path.as_ref()) else {
            return;
        };
        let mut files: Vec<PathBuf> = entries
            .flatten()
            .map(|entry| entry.path())
            .filter(|path| path.is_file())
            .collect();
        files.sort();
        for file in files {
            let _ = self.register_file(file);
        }
    }

    /// Loads a `.ttf`/`.otf` file and indexes it under its file stem and
    /// family/full/PostScript names.
    pub(crate) fn register_file(&mut self, path: impl AsRef<Path>) -> Result<usize, BannerPressError> {
        let path = path.as_ref();
        if !is_font_path(path) {
            return Err(BannerPressError::Font(format!(
                "unsupported font file {}",
                path.display()
            )));
        }
        let data = fs::read(path)?;
        self.register_bytes(data, Some(path))
    }

    pub(crate) fn register_bytes(
        &mut self,
        data: Vec<u8>,
        path: Option<&Path>,
    ) -> Result<usize, BannerPressError> {
        let source = path
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "EmbeddedFont".to_string());
        let Ok(face) = ttf_parser::Face::parse(&data, 0) else {
            return Err(BannerPressError::Font(format!("invalid font data for {source}")));
        };
        let (name, aliases) = font_names(&face, path);
        let units_per_em = face.units_per_em().max(1);
        let ascender = face.ascender();
        let descender = face.descender();

        let index = self.fonts.len();
        self.fonts.push(LoadedFont {
            name: name.clone(),
            path: path.map(Path::to_path_buf),
            data: Arc::new(data),
            units_per_em,
            ascender,
            descender,
        });
        for alias in std::iter::once(name).chain(aliases) {
            let key = normalize_name(&alias);
            if key.is_empty() || self.lookup.contains_key(&key) {
                continue;
            }
            self.lookup.insert(key, index);
        }
        Ok(index)
    }

    pub(crate) fn assign_role_file(
        &mut self,
        role: FontRole,
        path: impl AsRef<Path>,
    ) -> Result<(), BannerPressError> {
        let index = self.register_file(path)?;
        self.roles.insert(role, index);
        Ok(())
    }

    /// Binds every role that has no explicit file: first against fonts that
    /// were registered by name, then against the system font directories
    /// when `search_system` is set.
    pub(crate) fn resolve_roles(&mut self, search_system: bool) {
        for role in FontRole::ALL {
            if self.roles.contains_key(&role) {
                continue;
            }
            let candidates = role_file_candidates(role);
            let registered = candidates.iter().find_map(|file| {
                let stem = file.rsplit_once('.').map(|(s, _)| s).unwrap_or(file);
                self.lookup.get(&normalize_name(stem)).copied()
            });
            if let Some(index) = registered {
                self.roles.insert(role, index);
                continue;
            }
            if !search_system {
                continue;
            }
            let system = candidates
                .iter()
                .find_map(|file| system_font_path(file))
                .and_then(|path| self.register_file(path).ok());
            if let Some(index) = system {
                self.roles.insert(role, index);
            }
        }
    }

    pub(crate) fn resolve(&self, name: &str) -> Option<&LoadedFont> {
        self.lookup
            .get(&normalize_name(name))
            .and_then(|index| self.fonts.get(*index))
    }

    pub(crate) fn role_font(&self, role: FontRole) -> Option<&LoadedFont> {
        self.roles.get(&role).and_then(|index| self.fonts.get(*index))
    }

    pub(crate) fn handle(&self, role: FontRole) -> Result<FontHandle<'_>, BannerPressError> {
        match self.roles.get(&role) {
            Some(index) => Ok(FontHandle {
                registry: self,
                index: Some(*index),
            }),
            None if self.allow_missing => Ok(FontHandle {
                registry: self,
                index: None,
            }),
            None => Err(BannerPressError::Font(format!(
                "no font resolved for role '{}' (expected {})",
                role.id(),
                role_file_candidates(role).join(", ")
            ))),
        }
    }

    fn measure_cached(&self, index: usize, size: u32, text: &str) -> u32 {
        let key = TextWidthKey {
            font_index: index,
            size,
            text: text.to_string(),
        };
        if let Ok(cache) = self.text_width_cache.lock() {
            if let Some(value) = cache.get(&key) {
                return value;
            }
        }
        let Some(font) = self.fonts.get(index) else {
            return approximate_width(text, size);
        };
        let value = measure_text_width_full(font, size, text)
            .unwrap_or_else(|| measure_text_width_unshaped(font, size, text));
        if let Ok(mut cache) = self.text_width_cache.lock() {
            cache.insert(key, value);
        }
        value
    }
}

impl<'a> FontHandle<'a> {
    pub(crate) fn font(&self) -> Option<&'a LoadedFont> {
        self.index.and_then(|index| self.registry.fonts.get(index))
    }

    pub(crate) fn is_approximate(&self) -> bool {
        self.index.is_none()
    }
}

impl TextMeasure for FontHandle<'_> {
    fn text_width(&self, text: &str, size: u32) -> u32 {
        match self.index {
            Some(index) => self.registry.measure_cached(index, size, text),
            None => approximate_width(text, size),
        }
    }

    fn ascent(&self, size: u32) -> u32 {
        match self.font() {
            Some(font) => scale_ceil(font.ascender.max(0) as u32, size, font.units_per_em),
            None => (8 * size + 5) / 10,
        }
    }

    fn descent(&self, size: u32) -> u32 {
        match self.font() {
            Some(font) => scale_ceil(
                (font.descender as i32).unsigned_abs(),
                size,
                font.units_per_em,
            ),
            None => (2 * size + 5) / 10,
        }
    }
}

/// Glyph advance of 0.6em per character, rounded to whole pixels.
pub(crate) fn approximate_width(text: &str, size: u32) -> u32 {
    let chars = text.chars().count() as u64;
    ((6 * size as u64 * chars + 5) / 10).min(u32::MAX as u64) as u32
}

fn scale_ceil(units: u32, size: u32, units_per_em: u16) -> u32 {
    let upem = units_per_em.max(1) as u64;
    ((units as u64 * size as u64).div_ceil(upem)).min(u32::MAX as u64) as u32
}

fn scale_round(units: i64, size: u32, units_per_em: u16) -> u32 {
    if units <= 0 {
        return 0;
    }
    let upem = units_per_em.max(1) as i64;
    let px = (units * size as i64 + upem / 2) / upem;
    px.clamp(0, u32::MAX as i64) as u32
}

fn measure_text_width_full(font: &LoadedFont, size: u32, text: &str) -> Option<u32> {
    let face = HbFace::from_slice(&font.data, 0)?;
    let mut buffer = UnicodeBuffer::new();
    buffer.set_direction(detect_direction(text));
    buffer.push_str(text);
    let output = rustybuzz::shape(&face, &[], buffer);
    let positions = output.glyph_positions();
    if positions.is_empty() {
        return if text.is_empty() { Some(0) } else { None };
    }
    let total_units: i64 = positions.iter().map(|pos| pos.x_advance as i64).sum();
    Some(scale_round(total_units, size, font.units_per_em))
}

fn measure_text_width_unshaped(font: &LoadedFont, size: u32, text: &str) -> u32 {
    let Ok(face) = ttf_parser::Face::parse(&font.data, 0) else {
        return approximate_width(text, size);
    };
    let total_units: i64 = text
        .chars()
        .map(|ch| {
            face.glyph_index(ch)
                .and_then(|gid| face.glyph_hor_advance(gid))
                .unwrap_or(0) as i64
        })
        .sum();
    scale_round(total_units, size, font.units_per_em)
}

pub(crate) fn glyph_advance_units(face: &ttf_parser::Face<'_>, gid: u16) -> u16 {
    face.glyph_hor_advance(GlyphId(gid)).unwrap_or(0)
}

pub(crate) fn detect_direction(text: &str) -> HbDirection {
    for ch in text.chars() {
        let code = ch as u32;
        let rtl = matches!(
            code,
            0x0590..=0x08FF | 0xFB1D..=0xFDFF | 0xFE70..=0xFEFF | 0x1EE00..=0x1EEFF
        );
        if rtl {
            return HbDirection::RightToLeft;
        }
    }
    HbDirection::LeftToRight
}

fn role_file_candidates(role: FontRole) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    if let Some(def) = font_role_def(role.id()) {
        out.push(def.file_name.to_string());
    }
    let fallbacks: &[&str] = match role {
        FontRole::SansBold => &["DejaVuSans-Bold.ttf", "NotoSans-Bold.ttf", "arialbd.ttf"],
        FontRole::SansRegular => &["DejaVuSans.ttf", "NotoSans-Regular.ttf", "arial.ttf"],
        FontRole::SansNarrowBold => &[
            "LiberationSans-Bold.ttf",
            "DejaVuSansCondensed-Bold.ttf",
            "arialnb.ttf",
        ],
        FontRole::MonoItalic => &["DejaVuSansMono-Oblique.ttf", "couri.ttf"],
        FontRole::MonoBold => &["DejaVuSansMono-Bold.ttf", "courbd.ttf"],
    };
    for name in fallbacks {
        if !out.iter().any(|existing| existing == name) {
            out.push((*name).to_string());
        }
    }
    out
}

static SYSTEM_FONT_INDEX: OnceLock<HashMap<String, PathBuf>> = OnceLock::new();

fn system_font_path(file_name: &str) -> Option<PathBuf> {
    let index = SYSTEM_FONT_INDEX.get_or_init(|| {
        let mut index = HashMap::new();
        for dir in system_font_dirs() {
            index_font_dir(&dir, 0, &mut index);
        }
        index
    });
    index.get(&file_name.to_ascii_lowercase()).cloned()
}

fn index_font_dir(dir: &Path, depth: usize, index: &mut HashMap<String, PathBuf>) {
    if depth > SYSTEM_FONT_SCAN_DEPTH {
        return;
    }
    let Ok(entries) = fs::read_dir(dir) else {
        return;
    };
    let mut paths: Vec<PathBuf> = entries.flatten().map(|entry| entry.path()).collect();
    paths.sort();
    for path in paths {
        if path.is_dir() {
            index_font_dir(&path, depth + 1, index);
        } else if is_font_path(&path) {
            if let Some(name) = path.file_name().and_then(|v| v.to_str()) {
                index.entry(name.to_ascii_lowercase()).or_insert(path.clone());
            }
        }
    }
}

fn system_font_dirs() -> Vec<PathBuf> {
    let mut dirs = Vec::new();

    if let Ok(extra) = std::env::var("BANNERPRESS_FONT_DIR") {
        for path in std::env::split_paths(&extra) {
            if !path.as_os_str().is_empty() {
                dirs.push(path);
            }
        }
    }

    #[cfg(target_os = "windows")]
    {
        dirs.push(PathBuf::from(r"C:\Windows\Fonts"));
        if let Ok(windir) = std::env::var("WINDIR") {
            dirs.push(PathBuf::from(windir).join("Fonts"));
        }
    }

    #[cfg(target_os = "linux")]
    {
        dirs.push(PathBuf::from("/usr/share/fonts"));
        dirs.push(PathBuf::from("/usr/local/share/fonts"));
        if let Ok(home) = std::env::var("HOME") {
            dirs.push(PathBuf::from(&home).join(".fonts"));
            dirs.push(PathBuf::from(home).join(".local/share/fonts"));
        }
    }

    #[cfg(target_os = "macos")]
    {
        dirs.push(PathBuf::from("/System/Library/Fonts"));
        dirs.push(PathBuf::from("/Library/Fonts"));
        if let Ok(home) = std::env::var("HOME") {
            dirs.push(PathBuf::from(home).join("Library/Fonts"));
        }
    }

    dirs
}

pub(crate) fn is_font_path(path: &Path) -> bool {
    let Some(ext) = path.extension().and_then(|v| v.to_str()) else {
        return false;
    };
    matches!(ext.to_ascii_lowercase().as_str(), "ttf" | "otf")
}

fn font_names(face: &ttf_parser::Face<'_>, path: Option<&Path>) -> (String, Vec<String>) {
    use ttf_parser::name::name_id;

    let mut family = None;
    let mut full = None;
    let mut post = None;

    for entry in face.names() {
        let Some(name) = entry.to_string() else {
            continue;
        };
        match entry.name_id {
            name_id::TYPOGRAPHIC_FAMILY | name_id::FAMILY => {
                if family.is_none() {
                    family = Some(name);
                }
            }
            name_id::FULL_NAME => {
                if full.is_none() {
                    full = Some(name);
                }
            }
            name_id::POST_SCRIPT_NAME => {
                if post.is_none() {
                    post = Some(name);
                }
            }
            _ => {}
        }
    }

    let stem = path
        .and_then(|p| p.file_stem())
        .and_then(|v| v.to_str())
        .map(|v| v.to_string());
    let primary = post
        .clone()
        .or_else(|| full.clone())
        .or_else(|| stem.clone())
        .or_else(|| family.clone())
        .unwrap_or_else(|| "EmbeddedFont".to_string());

    // The file stem goes before the family name so "LiberationSans-Bold" does
    // not lose its alias to the regular face sharing the family.
    let mut aliases = Vec::new();
    for candidate in [stem, post, full, family].into_iter().flatten() {
        if candidate != primary {
            aliases.push(candidate);
        }
    }

    (primary, aliases)
}

fn normalize_name(name: &str) -> String {
    name.trim()
        .trim_matches('"')
        .trim_matches('\'')
        .to_ascii_lowercase()
}
