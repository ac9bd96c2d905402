//! Conversion between stored layout regions and the bounding-box annotation
//! format of the template editing tool.

use crate::error::BannerPressError;
use crate::layout::{LayoutDocument, Region};
use crate::types::{BoxRect, Rgb};
use bannerpress_style_contract::default_region_color;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub label: String,
    pub xmin: u32,
    pub ymin: u32,
    pub xmax: u32,
    pub ymax: u32,
    pub color: Rgb,
}

impl BoundingBox {
    pub fn box_rect(&self) -> BoxRect {
        BoxRect {
            xmin: self.xmin,
            ymin: self.ymin,
            xmax: self.xmax,
            ymax: self.ymax,
        }
    }
}

/// Color shown for a region: the stored one, else the label default.
pub fn region_color(label: &str, region: &Region) -> Rgb {
    region
        .color
        .unwrap_or_else(|| Rgb::from(default_region_color(label)))
}

/// Every placeable region as an annotation box. `background_size` never
/// appears because it is not held as a region.
pub fn to_annotations(layout: &LayoutDocument) -> Vec<BoundingBox> {
    layout
        .regions()
        .map(|(label, region)| {
            let bx = region.rect.to_box();
            BoundingBox {
                label: label.to_string(),
                xmin: bx.xmin,
                ymin: bx.ymin,
                xmax: bx.xmax,
                ymax: bx.ymax,
                color: region_color(label, region),
            }
        })
        .collect()
}

/// Writes edited boxes back onto `layout`, replacing regions with the same
/// label. Nothing is applied if any box is inverted or has no area.
pub fn apply_annotations(
    layout: &mut LayoutDocument,
    boxes: &[BoundingBox],
) -> Result<(), BannerPressError> {
    let mut converted = Vec::with_capacity(boxes.len());
    for bx in boxes {
        if bx.label.trim().is_empty() {
            return Err(BannerPressError::Validation(
                "annotation box has an empty label".to_string(),
            ));
        }
        let rect = bx.box_rect().to_rect().map_err(|err| {
            BannerPressError::InvalidRegion(format!("{}: {}", bx.label, err))
        })?;
        converted.push((bx.label.clone(), Region::new(rect).with_color(bx.color)));
    }
    for (label, region) in converted {
        layout.insert_region(label, region);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Rect;

    fn sample() -> LayoutDocument {
        let mut doc = LayoutDocument::new("summer")
            .with_background_size(1200, 628)
            .with_region("logo_position", Rect::new(10, 10, 100, 50))
            .with_region("mystery_position", Rect::new(0, 0, 4, 4));
        doc.insert_region(
            "actor_position",
            Region::new(Rect::new(600, 0, 600, 628)).with_color(Rgb(1, 1, 1)),
        );
        doc
    }

    #[test]
    fn annotations_add_max_corners_and_resolve_colors() {
        let boxes = to_annotations(&sample());
        assert_eq!(boxes.len(), 3);

        let actor = boxes.iter().find(|b| b.label == "actor_position").unwrap();
        assert_eq!((actor.xmax, actor.ymax), (1200, 628));
        assert_eq!(actor.color, Rgb(1, 1, 1));

        let logo = boxes.iter().find(|b| b.label == "logo_position").unwrap();
        assert_eq!((logo.xmin, logo.ymin, logo.xmax, logo.ymax), (10, 10, 110, 60));
        assert_eq!(logo.color, Rgb(66, 133, 244));

        let unknown = boxes.iter().find(|b| b.label == "mystery_position").unwrap();
        assert_eq!(unknown.color, Rgb::WHITE);

        assert!(boxes.iter().all(|b| b.label != "background_size"));
    }

    #[test]
    fn applying_annotations_restores_corner_and_size() {
        let mut doc = sample();
        let mut boxes = to_annotations(&doc);
        for bx in &mut boxes {
            if bx.label == "logo_position" {
                bx.xmax = 210;
            }
        }
        apply_annotations(&mut doc, &boxes).unwrap();
        let logo = doc.region("logo_position").unwrap();
        assert_eq!(logo.rect, Rect::new(10, 10, 200, 50));
        assert_eq!(logo.color, Some(Rgb(66, 133, 244)));
        assert_eq!(doc.background_size().map(|s| s.width), Some(1200));
    }

    #[test]
    fn inverted_box_leaves_layout_untouched() {
        let mut doc = sample();
        let before = doc.clone();
        let boxes = vec![
            BoundingBox {
                label: "logo_position".to_string(),
                xmin: 0,
                ymin: 0,
                xmax: 5,
                ymax: 5,
                color: Rgb::BLACK,
            },
            BoundingBox {
                label: "actor_position".to_string(),
                xmin: 10,
                ymin: 0,
                xmax: 5,
                ymax: 5,
                color: Rgb::BLACK,
            },
        ];
        assert!(apply_annotations(&mut doc, &boxes).is_err());
        assert_eq!(doc, before);
    }

    #[test]
    fn zero_width_box_is_rejected_so_saved_layout_reloads() {
        let mut doc = sample();
        let before = doc.clone();
        let boxes = vec![BoundingBox {
            label: "logo_position".to_string(),
            xmin: 10,
            ymin: 10,
            xmax: 10,
            ymax: 30,
            color: Rgb::BLACK,
        }];
        assert!(matches!(
            apply_annotations(&mut doc, &boxes),
            Err(BannerPressError::InvalidRegion(_))
        ));
        assert_eq!(doc, before);
        let reloaded = LayoutDocument::from_json_value(&doc.to_json_value()).unwrap();
        assert_eq!(reloaded, doc);
    }

    #[test]
    fn annotation_json_uses_array_colors() {
        let boxes = to_annotations(&LayoutDocument::new("t").with_region(
            "text_action_position",
            Rect::new(0, 0, 120, 40),
        ));
        let json = serde_json::to_string(&boxes).unwrap();
        assert_eq!(
            json,
            r#"[{"label":"text_action_position","xmin":0,"ymin":0,"xmax":120,"ymax":40,"color":[251,188,4]}]"#
        );
    }
}
