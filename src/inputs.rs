use crate::types::Rgb;
use bannerpress_style_contract::{OverlayDef, TextStyleDef, overlay_defs_v1, text_style_defs_v1};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Overlay slots in application order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum OverlayRole {
    Actor,
    Logo,
    Graphic1,
    Graphic2,
    GraphicHighlight2,
}

/// Text slots in application order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum TextRole {
    Header1,
    Header2,
    Details,
    Highlight1,
    Highlight3,
    Tagline,
    Action,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FontRole {
    SansBold,
    SansRegular,
    SansNarrowBold,
    MonoItalic,
    MonoBold,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Alignment {
    Left,
    Center,
    Right,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextMode {
    /// Wrapped block, grown from 5pt until it no longer fits.
    MultiLine,
    /// One line, shrunk from the given size until it fits.
    SingleLine { initial_size: u32 },
}

/// Rendering policy bound to a text key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TextStyle {
    pub font: FontRole,
    pub color: Rgb,
    pub align: Alignment,
    pub margin: u32,
    pub mode: TextMode,
}

impl OverlayRole {
    pub const ALL: [OverlayRole; 5] = [
        OverlayRole::Actor,
        OverlayRole::Logo,
        OverlayRole::Graphic1,
        OverlayRole::Graphic2,
        OverlayRole::GraphicHighlight2,
    ];

    fn def(self) -> &'static OverlayDef {
        &overlay_defs_v1()[self as usize]
    }

    pub fn key(self) -> &'static str {
        self.def().key
    }

    pub fn region_label(self) -> &'static str {
        self.def().region_label
    }

    pub fn from_key(key: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|role| role.key() == key)
    }
}

impl TextRole {
    pub const ALL: [TextRole; 7] = [
        TextRole::Header1,
        TextRole::Header2,
        TextRole::Details,
        TextRole::Highlight1,
        TextRole::Highlight3,
        TextRole::Tagline,
        TextRole::Action,
    ];

    fn def(self) -> &'static TextStyleDef {
        &text_style_defs_v1()[self as usize]
    }

    pub fn key(self) -> &'static str {
        self.def().key
    }

    pub fn region_label(self) -> &'static str {
        self.def().region_label
    }

    pub fn from_key(key: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|role| role.key() == key)
    }

    pub fn style(self) -> TextStyle {
        let def = self.def();
        TextStyle {
            font: FontRole::from_id(def.font_role).unwrap_or(FontRole::SansRegular),
            color: Rgb::from(def.color),
            align: Alignment::from_str(def.align).unwrap_or(Alignment::Left),
            margin: def.margin,
            mode: match def.initial_size {
                Some(initial_size) => TextMode::SingleLine { initial_size },
                None => TextMode::MultiLine,
            },
        }
    }
}

impl FontRole {
    pub const ALL: [FontRole; 5] = [
        FontRole::SansBold,
        FontRole::SansRegular,
        FontRole::SansNarrowBold,
        FontRole::MonoItalic,
        FontRole::MonoBold,
    ];

    pub fn id(self) -> &'static str {
        match self {
            FontRole::SansBold => "sans-bold",
            FontRole::SansRegular => "sans-regular",
            FontRole::SansNarrowBold => "sans-narrow-bold",
            FontRole::MonoItalic => "mono-italic",
            FontRole::MonoBold => "mono-bold",
        }
    }

    pub fn from_id(raw: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|role| role.id() == raw)
    }
}

impl Alignment {
    pub fn as_str(&self) -> &'static str {
        match self {
            Alignment::Left => "left",
            Alignment::Center => "center",
            Alignment::Right => "right",
        }
    }

    pub fn from_str(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "left" => Some(Alignment::Left),
            "center" => Some(Alignment::Center),
            "right" => Some(Alignment::Right),
            _ => None,
        }
    }
}

/// Overlay source files keyed by role. Blank paths are never stored.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OverlayInputs {
    paths: BTreeMap<OverlayRole, PathBuf>,
}

impl OverlayInputs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, role: OverlayRole, path: impl Into<PathBuf>) -> Self {
        self.set(role, path);
        self
    }

    /// Stores `path` for `role`, or clears the role when the path is blank.
    pub fn set(&mut self, role: OverlayRole, path: impl Into<PathBuf>) {
        let path = path.into();
        if path.as_os_str().to_string_lossy().trim().is_empty() {
            self.paths.remove(&role);
        } else {
            self.paths.insert(role, path);
        }
    }

    pub fn remove(&mut self, role: OverlayRole) -> Option<PathBuf> {
        self.paths.remove(&role)
    }

    pub fn get(&self, role: OverlayRole) -> Option<&Path> {
        self.paths.get(&role).map(PathBuf::as_path)
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }

    pub fn len(&self) -> usize {
        self.paths.len()
    }
}

/// Text fields keyed by role. Empty or whitespace-only strings are never stored.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TextInputs {
    texts: BTreeMap<TextRole, String>,
}

impl TextInputs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, role: TextRole, text: impl Into<String>) -> Self {
        self.set(role, text);
        self
    }

    pub fn set(&mut self, role: TextRole, text: impl Into<String>) {
        let text = text.into();
        if text.trim().is_empty() {
            self.texts.remove(&role);
        } else {
            self.texts.insert(role, text);
        }
    }

    pub fn get(&self, role: TextRole) -> Option<&str> {
        self.texts.get(&role).map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.texts.is_empty()
    }

    pub fn len(&self) -> usize {
        self.texts.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn style_table_binds_keys_to_policies() {
        let header = TextRole::Header1.style();
        assert_eq!(header.font, FontRole::SansBold);
        assert_eq!(header.align, Alignment::Left);
        assert_eq!(header.margin, 25);
        assert_eq!(header.mode, TextMode::MultiLine);

        let tagline = TextRole::Tagline.style();
        assert_eq!(tagline.font, FontRole::MonoItalic);
        assert_eq!(tagline.color, Rgb(255, 0, 0));
        assert_eq!(tagline.mode, TextMode::SingleLine { initial_size: 25 });

        let action = TextRole::Action.style();
        assert_eq!(action.font, FontRole::MonoBold);
        assert_eq!(action.color, Rgb::WHITE);
        assert_eq!(action.align, Alignment::Center);
        assert_eq!(action.mode, TextMode::SingleLine { initial_size: 35 });

        assert_eq!(TextRole::Highlight1.style().margin, 5);
        assert_eq!(TextRole::Highlight3.style().margin, 20);
    }

    #[test]
    fn role_keys_and_labels_round_trip() {
        for role in OverlayRole::ALL {
            assert_eq!(OverlayRole::from_key(role.key()), Some(role));
        }
        for role in TextRole::ALL {
            assert_eq!(TextRole::from_key(role.key()), Some(role));
        }
        assert_eq!(OverlayRole::Logo.region_label(), "logo_position");
        assert_eq!(TextRole::Action.region_label(), "text_action_position");
        assert_eq!(TextRole::from_key("text_footer"), None);
    }

    #[test]
    fn blank_inputs_are_treated_as_absent() {
        let mut texts = TextInputs::new()
            .with(TextRole::Header1, "Summer sale")
            .with(TextRole::Tagline, "   ");
        assert_eq!(texts.get(TextRole::Header1), Some("Summer sale"));
        assert_eq!(texts.get(TextRole::Tagline), None);
        texts.set(TextRole::Header1, "");
        assert!(texts.is_empty());

        let overlays = OverlayInputs::new()
            .with(OverlayRole::Logo, "logo.png")
            .with(OverlayRole::Graphic1, " ");
        assert_eq!(overlays.len(), 1);
        assert_eq!(overlays.get(OverlayRole::Logo), Some(Path::new("logo.png")));
    }
}
