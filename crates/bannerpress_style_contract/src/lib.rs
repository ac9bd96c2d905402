use serde_json::{Value, json};
use sha2::{Digest, Sha256};
use std::sync::OnceLock;

pub const CONTRACT_ID: &str = "bannerpress.style_contract";
pub const CONTRACT_VERSION: &str = "1";

/// Color used for a region label that has neither a stored color nor an entry
/// in [`REGION_COLORS_V1`].
pub const NEUTRAL_REGION_COLOR: (u8, u8, u8) = (255, 255, 255);

/// Region label that carries template metadata instead of a placeable rectangle.
pub const BACKGROUND_SIZE_LABEL: &str = "background_size";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FontRoleDef {
    pub id: &'static str,
    pub file_name: &'static str,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TextStyleDef {
    pub key: &'static str,
    pub region_label: &'static str,
    pub font_role: &'static str,
    pub color: (u8, u8, u8),
    pub align: &'static str,
    pub margin: u32,
    /// `None` selects wrapped multi-line fitting, `Some(size)` selects
    /// single-line shrinking from `size`.
    pub initial_size: Option<u32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OverlayDef {
    pub key: &'static str,
    pub region_label: &'static str,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegionColorDef {
    pub label: &'static str,
    pub color: (u8, u8, u8),
}

pub const FONT_ROLES_V1: [FontRoleDef; 5] = [
    FontRoleDef { id: "mono-bold", file_name: "LiberationMono-Bold.ttf" },
    FontRoleDef { id: "mono-italic", file_name: "LiberationMono-Italic.ttf" },
    FontRoleDef { id: "sans-bold", file_name: "LiberationSans-Bold.ttf" },
    FontRoleDef { id: "sans-narrow-bold", file_name: "LiberationSansNarrow-Bold.ttf" },
    FontRoleDef { id: "sans-regular", file_name: "LiberationSans-Regular.ttf" },
];

// Application order matters: later entries draw over earlier ones.
pub const OVERLAYS_V1: [OverlayDef; 5] = [
    OverlayDef { key: "actor_path", region_label: "actor_position" },
    OverlayDef { key: "logo_path", region_label: "logo_position" },
    OverlayDef { key: "graphic1_path", region_label: "graphic1_position" },
    OverlayDef { key: "graphic2_path", region_label: "graphic2_position" },
    OverlayDef { key: "graphic_highlight2_path", region_label: "graphic_highlight2_position" },
];

pub const TEXT_STYLES_V1: [TextStyleDef; 7] = [
    TextStyleDef { key: "text_header1", region_label: "text_header1_position", font_role: "sans-bold", color: (0, 0, 0), align: "left", margin: 25, initial_size: None },
    TextStyleDef { key: "text_header2", region_label: "text_header2_position", font_role: "sans-regular", color: (0, 0, 0), align: "left", margin: 25, initial_size: None },
    TextStyleDef { key: "text_details", region_label: "text_details_position", font_role: "sans-regular", color: (0, 0, 0), align: "left", margin: 25, initial_size: None },
    TextStyleDef { key: "text_highlight1", region_label: "text_highlight1_position", font_role: "sans-bold", color: (0, 0, 0), align: "center", margin: 5, initial_size: Some(100) },
    TextStyleDef { key: "text_highlight3", region_label: "text_highlight3_position", font_role: "sans-bold", color: (0, 0, 0), align: "center", margin: 20, initial_size: Some(120) },
    TextStyleDef { key: "text_tagline", region_label: "text_tagline_position", font_role: "mono-italic", color: (255, 0, 0), align: "center", margin: 25, initial_size: Some(25) },
    TextStyleDef { key: "text_action", region_label: "text_action_position", font_role: "mono-bold", color: (255, 255, 255), align: "center", margin: 25, initial_size: Some(35) },
];

pub const REGION_COLORS_V1: [RegionColorDef; 12] = [
    RegionColorDef { label: "logo_position", color: (66, 133, 244) },
    RegionColorDef { label: "graphic1_position", color: (24, 90, 188) },
    RegionColorDef { label: "graphic2_position", color: (24, 90, 188) },
    RegionColorDef { label: "actor_position", color: (52, 168, 83) },
    RegionColorDef { label: "text_header1_position", color: (60, 64, 67) },
    RegionColorDef { label: "text_header2_position", color: (60, 64, 67) },
    RegionColorDef { label: "text_details_position", color: (95, 99, 104) },
    RegionColorDef { label: "text_highlight1_position", color: (32, 33, 36) },
    RegionColorDef { label: "graphic_highlight2_position", color: (24, 90, 188) },
    RegionColorDef { label: "text_highlight3_position", color: (32, 33, 36) },
    RegionColorDef { label: "text_tagline_position", color: (128, 134, 139) },
    RegionColorDef { label: "text_action_position", color: (251, 188, 4) },
];

#[derive(Debug, Clone)]
pub struct StyleContractMetadata {
    pub contract_id: &'static str,
    pub contract_version: &'static str,
    pub contract_fingerprint_sha256: String,
}

static CONTRACT_JSON: OnceLock<String> = OnceLock::new();
static CONTRACT_FINGERPRINT: OnceLock<String> = OnceLock::new();

fn hex_sha256(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    let digest = hasher.finalize();
    let mut out = String::with_capacity(digest.len() * 2);
    for b in digest {
        use std::fmt::Write;
        let _ = write!(&mut out, "{:02x}", b);
    }
    out
}

fn rgb_value(color: (u8, u8, u8)) -> Value {
    json!([color.0, color.1, color.2])
}

// Keys are written in sorted order so the encoding is identical whether or not
// serde_json preserves insertion order.
fn contract_value() -> Value {
    let fonts: Vec<Value> = FONT_ROLES_V1
        .iter()
        .map(|def| json!({ "file_name": def.file_name, "id": def.id }))
        .collect();
    let overlays: Vec<Value> = OVERLAYS_V1
        .iter()
        .map(|def| json!({ "key": def.key, "region_label": def.region_label }))
        .collect();
    let regions: Vec<Value> = REGION_COLORS_V1
        .iter()
        .map(|def| json!({ "color": rgb_value(def.color), "label": def.label }))
        .collect();
    let texts: Vec<Value> = TEXT_STYLES_V1
        .iter()
        .map(|def| {
            json!({
                "align": def.align,
                "color": rgb_value(def.color),
                "font_role": def.font_role,
                "initial_size": def.initial_size,
                "key": def.key,
                "margin": def.margin,
                "region_label": def.region_label,
            })
        })
        .collect();
    json!({
        "contract_id": CONTRACT_ID,
        "contract_version": CONTRACT_VERSION,
        "font_roles": fonts,
        "overlays": overlays,
        "region_colors": regions,
        "text_styles": texts,
    })
}

/// Canonical compact JSON encoding of every table in this contract.
pub fn contract_json() -> &'static str {
    CONTRACT_JSON.get_or_init(|| contract_value().to_string())
}

pub fn contract_fingerprint_sha256() -> String {
    CONTRACT_FINGERPRINT
        .get_or_init(|| hex_sha256(contract_json().as_bytes()))
        .clone()
}

pub fn font_role_defs_v1() -> &'static [FontRoleDef] {
    &FONT_ROLES_V1
}

pub fn font_role_def(id: &str) -> Option<&'static FontRoleDef> {
    FONT_ROLES_V1.iter().find(|def| def.id == id)
}

pub fn overlay_defs_v1() -> &'static [OverlayDef] {
    &OVERLAYS_V1
}

pub fn text_style_defs_v1() -> &'static [TextStyleDef] {
    &TEXT_STYLES_V1
}

pub fn text_style_def(key: &str) -> Option<&'static TextStyleDef> {
    TEXT_STYLES_V1.iter().find(|def| def.key == key)
}

/// Annotation color for a region label, falling back to [`NEUTRAL_REGION_COLOR`].
pub fn default_region_color(label: &str) -> (u8, u8, u8) {
    REGION_COLORS_V1
        .iter()
        .find(|def| def.label == label)
        .map(|def| def.color)
        .unwrap_or(NEUTRAL_REGION_COLOR)
}

pub fn metadata() -> StyleContractMetadata {
    StyleContractMetadata {
        contract_id: CONTRACT_ID,
        contract_version: CONTRACT_VERSION,
        contract_fingerprint_sha256: contract_fingerprint_sha256(),
    }
}
