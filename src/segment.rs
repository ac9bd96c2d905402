//! Visual segments: named customer-targeting profiles whose names prefix the
//! overlay source files of a batch.

use crate::error::BannerPressError;
use crate::layout::UpsertOutcome;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::path::Path;

const SEED_COLLECTION_KEY: &str = "visuals_segment_clusters";

fn default_background() -> String {
    "White background".to_string()
}

fn default_photography() -> String {
    "Studio portrait, professional lighting, DSLR camera shot, 4K".to_string()
}

/// Descriptive attributes of one visual segment. Fields serialize in
/// alphabetical order, as editing forms list them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SegmentProfile {
    pub age: String,
    #[serde(default = "default_background")]
    pub background: String,
    pub clothing: String,
    #[serde(default = "default_photography")]
    pub photography: String,
    pub subject: String,
    pub theme: String,
    #[serde(rename = "visualsegment")]
    pub name: String,
}

impl SegmentProfile {
    /// Profile with the default background and photography settings.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            age: String::new(),
            background: default_background(),
            clothing: String::new(),
            photography: default_photography(),
            subject: String::new(),
            theme: String::new(),
            name: name.into(),
        }
    }

    pub fn with_subject(mut self, subject: impl Into<String>) -> Self {
        self.subject = subject.into();
        self
    }

    pub fn with_age(mut self, age: impl Into<String>) -> Self {
        self.age = age.into();
        self
    }

    pub fn with_clothing(mut self, clothing: impl Into<String>) -> Self {
        self.clothing = clothing.into();
        self
    }

    pub fn with_theme(mut self, theme: impl Into<String>) -> Self {
        self.theme = theme.into();
        self
    }
}

/// In-memory segment store keyed by segment name.
#[derive(Debug, Clone, Default)]
pub struct SegmentCatalog {
    profiles: BTreeMap<String, SegmentProfile>,
}

impl SegmentCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses `{"visuals_segment_clusters": [profile, ...]}`.
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
            let profile: SegmentProfile = serde_json::from_value(entry.clone())?;
            if profile.name.trim().is_empty() {
                return Err(BannerPressError::Validation(
                    "Visual segment is empty!".to_string(),
                ));
            }
            catalog.upsert(profile);
        }
        Ok(catalog)
    }

    pub fn load_seed_file(path: impl AsRef<Path>) -> Result<Self, BannerPressError> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_seed_json(&raw)
    }

    pub fn to_seed_json(&self) -> String {
        let profiles: Vec<Value> = self
            .profiles
            .values()
            .map(|profile| serde_json::to_value(profile).unwrap_or(Value::Null))
            .collect();
        let mut root = Map::new();
        root.insert(SEED_COLLECTION_KEY.to_string(), Value::Array(profiles));
        Value::Object(root).to_string()
    }

    /// Adds a new segment. A blank or already used name is rejected and the
    /// catalog is left unchanged.
    pub fn create(&mut self, profile: SegmentProfile) -> Result<(), BannerPressError> {
        if profile.name.trim().is_empty() {
            return Err(BannerPressError::Validation(
                "Visual segment is empty!".to_string(),
            ));
        }
        if self.profiles.contains_key(&profile.name) {
            return Err(BannerPressError::Validation(format!(
                "Visual segment '{}' already exists!",
                profile.name
            )));
        }
        self.profiles.insert(profile.name.clone(), profile);
        Ok(())
    }

    pub fn upsert(&mut self, profile: SegmentProfile) -> UpsertOutcome {
        match self.profiles.insert(profile.name.clone(), profile) {
            Some(_) => UpsertOutcome::Updated,
            None => UpsertOutcome::Created,
        }
    }

    pub fn get(&self, name: &str) -> Option<&SegmentProfile> {
        self.profiles.get(name)
    }

    pub fn profile(&self, name: &str) -> Result<&SegmentProfile, BannerPressError> {
        self.get(name).ok_or_else(|| {
            BannerPressError::Validation(format!("Visual segment '{name}' does not exist."))
        })
    }

    pub fn contains(&self, name: &str) -> bool {
        self.profiles.contains_key(name)
    }

    pub fn names(&self) -> Vec<&str> {
        self.profiles.keys().map(String::as_str).collect()
    }

    pub fn len(&self) -> usize {
        self.profiles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.profiles.is_empty()
    }
}
