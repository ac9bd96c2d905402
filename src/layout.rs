use crate::error::BannerPressError;
use crate::inputs::{OverlayRole, TextRole};
use crate::types::{Rect, Rgb};
use bannerpress_style_contract::BACKGROUND_SIZE_LABEL;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::path::Path;

const TEMPLATE_NAME_KEY: &str = "bannertemplate";
const SEED_COLLECTION_KEY: &str = "banner_template";

/// One named rectangle of a layout document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Region {
    pub rect: Rect,
    pub color: Option<Rgb>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackgroundSize {
    pub width: u32,
    pub height: u32,
}

/// Named set of regions for one background template. Labels are open: any
/// label may be stored, the compositor only looks up the ones it knows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LayoutDocument {
    name: String,
    regions: BTreeMap<String, Region>,
    background_size: Option<BackgroundSize>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
struct StoredRegion {
    x: u32,
    y: u32,
    width: u32,
    height: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    color: Option<Rgb>,
}

impl Region {
    pub fn new(rect: Rect) -> Self {
        Self { rect, color: None }
    }

    pub fn with_color(mut self, color: Rgb) -> Self {
        self.color = Some(color);
        self
    }
}

impl LayoutDocument {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            regions: BTreeMap::new(),
            background_size: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn with_region(mut self, label: impl Into<String>, rect: Rect) -> Self {
        self.insert_region(label, Region::new(rect));
        self
    }

    pub fn with_background_size(mut self, width: u32, height: u32) -> Self {
        self.background_size = Some(BackgroundSize { width, height });
        self
    }

    /// Inserts or replaces a region. The metadata label is routed to
    /// [`LayoutDocument::background_size`] instead of the region map.
    pub fn insert_region(&mut self, label: impl Into<String>, region: Region) {
        let label = label.into();
        if label == BACKGROUND_SIZE_LABEL {
            self.background_size = Some(BackgroundSize {
                width: region.rect.width,
                height: region.rect.height,
            });
            return;
        }
        self.regions.insert(label, region);
    }

    pub fn remove_region(&mut self, label: &str) -> Option<Region> {
        self.regions.remove(label)
    }

    pub fn region(&self, label: &str) -> Option<&Region> {
        self.regions.get(label)
    }

    pub fn overlay_region(&self, role: OverlayRole) -> Option<Rect> {
        self.region(role.region_label()).map(|region| region.rect)
    }

    pub fn text_region(&self, role: TextRole) -> Option<Rect> {
        self.region(role.region_label()).map(|region| region.rect)
    }

    pub fn regions(&self) -> impl Iterator<Item = (&str, &Region)> {
        self.regions
            .iter()
            .map(|(label, region)| (label.as_str(), region))
    }

    pub fn region_count(&self) -> usize {
        self.regions.len()
    }

    pub fn background_size(&self) -> Option<BackgroundSize> {
        self.background_size
    }

    pub fn from_json_value(value: &Value) -> Result<Self, BannerPressError> {
        let Some(object) = value.as_object() else {
            return Err(BannerPressError::Layout(
                "layout document must be a JSON object".to_string(),
            ));
        };
        let name = object
            .get(TEMPLATE_NAME_KEY)
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .ok_or_else(|| {
                BannerPressError::Layout(format!("layout document is missing '{TEMPLATE_NAME_KEY}'"))
            })?;

        let mut doc = LayoutDocument::new(name);
        for (label, entry) in object {
            if label == TEMPLATE_NAME_KEY {
                continue;
            }
            if label == BACKGROUND_SIZE_LABEL {
                let size: BackgroundSize = serde_json::from_value(entry.clone())
                    .map_err(|err| BannerPressError::Layout(format!("{name}.{label}: {err}")))?;
                doc.background_size = Some(size);
                continue;
            }
            let stored: StoredRegion = serde_json::from_value(entry.clone())
                .map_err(|err| BannerPressError::Layout(format!("{name}.{label}: {err}")))?;
            if stored.width == 0 || stored.height == 0 {
                return Err(BannerPressError::InvalidRegion(format!(
                    "{name}.{label} has empty size {}x{}",
                    stored.width, stored.height
                )));
            }
            doc.regions.insert(
                label.clone(),
                Region {
                    rect: Rect::new(stored.x, stored.y, stored.width, stored.height),
                    color: stored.color,
                },
            );
        }
        Ok(doc)
    }

    pub fn from_json_str(raw: &str) -> Result<Self, BannerPressError> {
        let value: Value = serde_json::from_str(raw)?;
        Self::from_json_value(&value)
    }

    pub fn to_json_value(&self) -> Value {
        let mut object = Map::new();
        object.insert(
            TEMPLATE_NAME_KEY.to_string(),
            Value::String(self.name.clone()),
        );
        if let Some(size) = self.background_size {
            object.insert(
                BACKGROUND_SIZE_LABEL.to_string(),
                serde_json::to_value(size).unwrap_or(Value::Null),
            );
        }
        for (label, region) in &self.regions {
            let stored = StoredRegion {
                x: region.rect.x,
                y: region.rect.y,
                width: region.rect.width,
                height: region.rect.height,
                color: region.color,
            };
            object.insert(
                label.clone(),
                serde_json::to_value(stored).unwrap_or(Value::Null),
            );
        }
        Value::Object(object)
    }
}

/// Lookup seam from template name to layout document.
pub trait LayoutSource {
    fn layout(&self, template: &str) -> Result<LayoutDocument, BannerPressError>;
}

impl<F> LayoutSource for F
where
    F: Fn(&str) -> Option<LayoutDocument>,
{
    fn layout(&self, template: &str) -> Result<LayoutDocument, BannerPressError> {
        self(template).ok_or_else(|| {
            BannerPressError::Layout(format!("no layout document for template '{template}'"))
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Created,
    Updated,
}

/// In-memory layout store keyed by template name.
#[derive(Debug, Clone, Default)]
pub struct LayoutCatalog {
    documents: BTreeMap<String, LayoutDocument>,
}

impl LayoutCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses a seed payload of the form `{"banner_template": [doc, ...]}`.
    pub fn from_seed_json(raw: &str) -> Result<Self, BannerPressError> {
        let value: Value = serde_json::from_str(raw)?;
        let mut catalog = Self::new();
        let Some(entries) = value.get(SEED_COLLECTION_KEY) else {
            return Ok(catalog);
        };
        let Some(entries) = entries.as_array() else {
            return Err(BannerPressError::Layout(format!(
                "'{SEED_COLLECTION_KEY}' must be an array"
            )));
        };
        for entry in entries {
            catalog.upsert(LayoutDocument::from_json_value(entry)?);
        }
        Ok(catalog)
    }

    pub fn load_seed_file(path: impl AsRef<Path>) -> Result<Self, BannerPressError> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_seed_json(&raw)
    }

    pub fn to_seed_json(&self) -> String {
        let docs: Vec<Value> = self
            .documents
            .values()
            .map(LayoutDocument::to_json_value)
            .collect();
        let mut root = Map::new();
        root.insert(SEED_COLLECTION_KEY.to_string(), Value::Array(docs));
        Value::Object(root).to_string()
    }

    pub fn upsert(&mut self, document: LayoutDocument) -> UpsertOutcome {
        match self.documents.insert(document.name.clone(), document) {
            Some(_) => UpsertOutcome::Updated,
            None => UpsertOutcome::Created,
        }
    }

    pub fn get(&self, name: &str) -> Option<&LayoutDocument> {
        self.documents.get(name)
    }

    pub fn names(&self) -> Vec<&str> {
        self.documents.keys().map(String::as_str).collect()
    }

    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }
}

impl LayoutSource for LayoutCatalog {
    fn layout(&self, template: &str) -> Result<LayoutDocument, BannerPressError> {
        self.get(template).cloned().ok_or_else(|| {
            BannerPressError::Layout(format!("no layout document for template '{template}'"))
        })
    }
}
