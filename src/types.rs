use crate::error::BannerPressError;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Corner + size rectangle in image pixel space. This is the only encoding the
/// compositing code sees.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Rect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

/// Min/max corner rectangle as used by the bounding-box editing tool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct BoxRect {
    pub xmin: u32,
    pub ymin: u32,
    pub xmax: u32,
    pub ymax: u32,
}

impl Rect {
    pub fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn right(&self) -> u64 {
        self.x as u64 + self.width as u64
    }

    pub fn bottom(&self) -> u64 {
        self.y as u64 + self.height as u64
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    pub fn fits_within(&self, width: u32, height: u32) -> bool {
        self.right() <= width as u64 && self.bottom() <= height as u64
    }

    /// Intersection with `[0, width) x [0, height)`. Returns `None` when nothing
    /// of the rectangle remains.
    pub fn clamped_to(&self, width: u32, height: u32) -> Option<Rect> {
        if self.x >= width || self.y >= height {
            return None;
        }
        let right = self.right().min(width as u64) as u32;
        let bottom = self.bottom().min(height as u64) as u32;
        let out = Rect::new(self.x, self.y, right - self.x, bottom - self.y);
        if out.is_empty() { None } else { Some(out) }
    }

    pub fn to_box(&self) -> BoxRect {
        BoxRect {
            xmin: self.x,
            ymin: self.y,
            xmax: self.x.saturating_add(self.width),
            ymax: self.y.saturating_add(self.height),
        }
    }
}

impl BoxRect {
    pub fn to_rect(&self) -> Result<Rect, BannerPressError> {
        if self.xmax < self.xmin || self.ymax < self.ymin {
            return Err(BannerPressError::InvalidRegion(format!(
                "inverted box ({},{})-({},{})",
                self.xmin, self.ymin, self.xmax, self.ymax
            )));
        }
        if self.xmax == self.xmin || self.ymax == self.ymin {
            return Err(BannerPressError::InvalidRegion(format!(
                "empty box ({},{})-({},{})",
                self.xmin, self.ymin, self.xmax, self.ymax
            )));
        }
        Ok(Rect::new(
            self.xmin,
            self.ymin,
            self.xmax - self.xmin,
            self.ymax - self.ymin,
        ))
    }
}

/// Canonical color representation. Stored layouts may carry `[r, g, b]`
/// arrays or CSS strings such as `"rgb(1, 2, 3)"`; both decode to this and it
/// always encodes back as an array.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Rgb(pub u8, pub u8, pub u8);

impl Rgb {
    pub const BLACK: Rgb = Rgb(0, 0, 0);
    pub const WHITE: Rgb = Rgb(255, 255, 255);

    pub fn parse_css(raw: &str) -> Result<Rgb, BannerPressError> {
        let parsed: csscolorparser::Color = raw
            .trim()
            .parse()
            .map_err(|err| BannerPressError::Layout(format!("invalid color '{raw}': {err}")))?;
        let [r, g, b, _a] = parsed.to_rgba8();
        Ok(Rgb(r, g, b))
    }

    pub fn to_array(self) -> [u8; 3] {
        [self.0, self.1, self.2]
    }
}

impl From<(u8, u8, u8)> for Rgb {
    fn from(value: (u8, u8, u8)) -> Self {
        Rgb(value.0, value.1, value.2)
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum StoredColor {
    Channels(Vec<u8>),
    Css(String),
}

impl<'de> Deserialize<'de> for Rgb {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        match StoredColor::deserialize(deserializer)? {
            StoredColor::Channels(channels) => match channels.as_slice() {
                [r, g, b] | [r, g, b, _] => Ok(Rgb(*r, *g, *b)),
                other => Err(serde::de::Error::custom(format!(
                    "color array must have 3 or 4 channels, got {}",
                    other.len()
                ))),
            },
            StoredColor::Css(raw) => Rgb::parse_css(&raw).map_err(serde::de::Error::custom),
        }
    }
}

impl Serialize for Rgb {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        self.to_array().serialize(serializer)
    }
}
