use crate::font::TextMeasure;
use crate::inputs::{Alignment, TextMode, TextStyle};
use crate::types::Rect;

/// First point size tried by the multi-line fit.
pub const MULTILINE_MIN_SIZE: u32 = 5;
/// Exclusive upper bound of the multi-line scan.
pub const MULTILINE_MAX_SIZE: u32 = 300;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MultiLineFit {
    pub size: u32,
    pub lines: Vec<String>,
    /// Distance between consecutive line tops.
    pub line_height: u32,
    pub block_height: i64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlacedLine {
    pub text: String,
    pub x: i32,
    pub baseline_y: i32,
    pub width: u32,
}

/// Final geometry of one text element, ready to rasterize.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextLayout {
    pub size: u32,
    pub lines: Vec<PlacedLine>,
    /// Anchor point of single-line text; multi-line text has none.
    pub anchor: Option<(i32, i32)>,
}

/// Greedy word wrap. A word joins the current line while the running width
/// (each placed word plus one space) leaves room for it.
pub fn wrap_words<M: TextMeasure + ?Sized>(
    text: &str,
    measure: &M,
    size: u32,
    max_width: u32,
) -> Vec<String> {
    let space_width = measure.text_width(" ", size) as u64;
    let mut lines = Vec::new();
    let mut current: Vec<&str> = Vec::new();
    let mut current_width: u64 = 0;

    for word in text.split_whitespace() {
        let word_width = measure.text_width(word, size) as u64;
        if current_width + word_width <= max_width as u64 {
            current.push(word);
            current_width += word_width + space_width;
        } else {
            if !current.is_empty() {
                lines.push(current.join(" "));
            }
            current = vec![word];
            current_width = word_width + space_width;
        }
    }
    if !current.is_empty() {
        lines.push(current.join(" "));
    }
    lines
}

pub fn block_height<M: TextMeasure + ?Sized>(
    measure: &M,
    size: u32,
    line_count: usize,
    gap: u32,
) -> i64 {
    let per_line = measure.ascent(size) as i64 + measure.descent(size) as i64 + gap as i64;
    per_line * line_count as i64 - gap as i64
}

/// Largest size whose wrapped block is shorter than `rect.height`. Sizes grow
/// from [`MULTILINE_MIN_SIZE`]; the first size reaching the height is backed
/// off by one. If no size in the scan reaches it, the last size scanned wins.
pub fn fit_multiline<M: TextMeasure + ?Sized>(
    text: &str,
    measure: &M,
    rect: Rect,
    gap: u32,
) -> MultiLineFit {
    let mut size = MULTILINE_MIN_SIZE;
    let mut lines = Vec::new();
    for candidate in MULTILINE_MIN_SIZE..MULTILINE_MAX_SIZE {
        size = candidate;
        lines = wrap_words(text, measure, candidate, rect.width);
        let height = block_height(measure, candidate, lines.len(), gap);
        if height >= rect.height as i64 {
            size = candidate.saturating_sub(1).max(1);
            lines = wrap_words(text, measure, size, rect.width);
            break;
        }
    }
    let line_height = measure.ascent(size) + measure.descent(size) + gap;
    let block_height = block_height(measure, size, lines.len(), gap);
    MultiLineFit {
        size,
        lines,
        line_height,
        block_height,
    }
}

/// Shrinks from `initial_size` while the text is wider than the rectangle
/// minus both margins, stopping at 1.
pub fn fit_single_line<M: TextMeasure + ?Sized>(
    text: &str,
    measure: &M,
    initial_size: u32,
    width: u32,
    margin: u32,
) -> u32 {
    let available = width as i64 - 2 * margin as i64;
    let mut size = initial_size.max(1);
    while measure.text_width(text, size) as i64 > available && size > 1 {
        size -= 1;
    }
    size
}

pub fn layout_text<M: TextMeasure + ?Sized>(
    text: &str,
    style: &TextStyle,
    rect: Rect,
    measure: &M,
) -> TextLayout {
    match style.mode {
        TextMode::MultiLine => layout_multiline(text, style, rect, measure),
        TextMode::SingleLine { initial_size } => {
            layout_single_line(text, style, rect, initial_size, measure)
        }
    }
}

fn layout_multiline<M: TextMeasure + ?Sized>(
    text: &str,
    style: &TextStyle,
    rect: Rect,
    measure: &M,
) -> TextLayout {
    let fit = fit_multiline(text, measure, rect, style.margin);
    let ascent = measure.ascent(fit.size) as i64;
    let rect_x = rect.x as i64;
    let rect_w = rect.width as i64;

    let mut lines = Vec::with_capacity(fit.lines.len());
    let mut top = rect.y as i64;
    for line in fit.lines {
        let width = measure.text_width(&line, fit.size);
        // Box-measured centering: the line box is placed, not an anchor.
        let x = match style.align {
            Alignment::Left => rect_x,
            Alignment::Center => rect_x + (rect_w - width as i64).div_euclid(2),
            Alignment::Right => rect_x + rect_w - width as i64,
        };
        lines.push(PlacedLine {
            text: line,
            x: to_i32(x),
            baseline_y: to_i32(top + ascent),
            width,
        });
        top += fit.line_height as i64;
    }
    TextLayout {
        size: fit.size,
        lines,
        anchor: None,
    }
}

fn layout_single_line<M: TextMeasure + ?Sized>(
    text: &str,
    style: &TextStyle,
    rect: Rect,
    initial_size: u32,
    measure: &M,
) -> TextLayout {
    let size = fit_single_line(text, measure, initial_size, rect.width, style.margin);
    let width = measure.text_width(text, size);
    let ascent = measure.ascent(size) as i64;
    let descent = measure.descent(size) as i64;

    let anchor_x = match style.align {
        Alignment::Center => rect.x as i64 + (rect.width / 2) as i64,
        Alignment::Right => rect.x as i64 + rect.width as i64 - style.margin as i64,
        Alignment::Left => rect.x as i64 + style.margin as i64,
    };
    let anchor_y = rect.y as i64 + (rect.height / 2) as i64;

    // The anchor names a point on the text: its middle, right or left edge
    // horizontally and the ascender/descender midpoint vertically.
    let x = match style.align {
        Alignment::Center => anchor_x - (width / 2) as i64,
        Alignment::Right => anchor_x - width as i64,
        Alignment::Left => anchor_x,
    };
    let baseline_y = anchor_y + (ascent - descent).div_euclid(2);

    TextLayout {
        size,
        lines: vec![PlacedLine {
            text: text.to_string(),
            x: to_i32(x),
            baseline_y: to_i32(baseline_y),
            width,
        }],
        anchor: Some((to_i32(anchor_x), to_i32(anchor_y))),
    }
}

fn to_i32(value: i64) -> i32 {
    value.clamp(i32::MIN as i64, i32::MAX as i64) as i32
}
