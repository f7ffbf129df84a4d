//! Bounding-box overlay for a detection result.
//!
//! [`render_overlay`] is pure: it turns one [`DetectionResult`] into a
//! fresh list of shapes for a drawing surface of a given size. Nothing is
//! retained between calls, so every render fully replaces the previous
//! one. [`Overlay::to_svg`] serializes the shapes as a transparent SVG
//! document the dashboard can layer over the video element.

use std::fmt::Write as _;

use serde::Serialize;

use crate::detection::DetectionResult;

/// Width/height of a surface or frame in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Size {
    pub width: u32,
    pub height: u32,
}

impl Size {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    fn is_empty(self) -> bool {
        self.width == 0 || self.height == 0
    }
}

/// Visual parameters of one annotation class.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AnnotationStyle {
    pub color: &'static str,
    pub label_fill: &'static str,
    pub line_width: f64,
    pub corner_length: f64,
    pub corner_width: f64,
    pub font_size: f64,
    pub label_height: f64,
    /// Distance from the box's top edge to the label box's top edge.
    pub label_offset: f64,
    /// Horizontal padding added to both sides of the text.
    pub label_padding: f64,
    /// Distance from the box's top edge up to the text baseline.
    pub text_baseline: f64,
}

pub const PERSON_STYLE: AnnotationStyle = AnnotationStyle {
    color: "#00ff94",
    label_fill: "rgba(0, 255, 148, 0.2)",
    line_width: 3.0,
    corner_length: 15.0,
    corner_width: 4.0,
    font_size: 14.0,
    label_height: 24.0,
    label_offset: 28.0,
    label_padding: 8.0,
    text_baseline: 10.0,
};

pub const FACE_STYLE: AnnotationStyle = AnnotationStyle {
    color: "#ff0000",
    label_fill: "rgba(255, 0, 0, 0.2)",
    line_width: 2.0,
    corner_length: 10.0,
    corner_width: 3.0,
    font_size: 12.0,
    label_height: 20.0,
    label_offset: 24.0,
    label_padding: 6.0,
    text_baseline: 8.0,
};

/// Advance width of one bold monospace glyph, as a fraction of font size.
const MONOSPACE_ADVANCE: f64 = 0.6;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Shape {
    Rect {
        x: f64,
        y: f64,
        width: f64,
        height: f64,
        stroke: &'static str,
        stroke_width: f64,
        fill: Option<&'static str>,
    },
    /// Three-point corner marker.
    Corner {
        points: [(f64, f64); 3],
        stroke: &'static str,
        stroke_width: f64,
    },
    Label {
        x: f64,
        y: f64,
        text: String,
        color: &'static str,
        font_size: f64,
    },
}

/// A complete set of shapes for one surface.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Overlay {
    pub surface: Size,
    pub shapes: Vec<Shape>,
}

/// Render boxes, corner markers and labels for every person object and
/// every face in `result`.
///
/// Person boxes are normalized and scale by `surface`. Face boxes are in
/// pixels of the analyzed frame and scale by `surface / source`; when the
/// source size is unknown (zero) faces are not drawn.
pub fn render_overlay(result: &DetectionResult, surface: Size, source: Size) -> Overlay {
    let mut shapes = Vec::new();
    if surface.is_empty() {
        return Overlay { surface, shapes };
    }
    let (sw, sh) = (f64::from(surface.width), f64::from(surface.height));

    for object in result.person_objects() {
        let v = &object.bounding_box;
        if v.len() < 3 {
            continue;
        }
        let (x1, y1) = (v[0].x * sw, v[0].y * sh);
        let (x2, y2) = (v[2].x * sw, v[2].y * sh);
        let label = format!("PERSON {}%", (object.confidence * 100.0).round() as i64);
        annotate(&mut shapes, &PERSON_STYLE, (x1, y1, x2, y2), label);
    }

    if !source.is_empty() {
        let scale_x = sw / f64::from(source.width);
        let scale_y = sh / f64::from(source.height);
        for face in &result.faces {
            let v = &face.bounding_box;
            if v.len() < 3 {
                continue;
            }
            let (x1, y1) = (v[0].x * scale_x, v[0].y * scale_y);
            let (x2, y2) = (v[2].x * scale_x, v[2].y * scale_y);
            annotate(&mut shapes, &FACE_STYLE, (x1, y1, x2, y2), "FACE".to_string());
        }
    }

    Overlay { surface, shapes }
}

fn annotate(
    shapes: &mut Vec<Shape>,
    style: &AnnotationStyle,
    (x1, y1, x2, y2): (f64, f64, f64, f64),
    label: String,
) {
    shapes.push(Shape::Rect {
        x: x1,
        y: y1,
        width: x2 - x1,
        height: y2 - y1,
        stroke: style.color,
        stroke_width: style.line_width,
        fill: None,
    });

    let c = style.corner_length;
    let corners = [
        [(x1, y1 + c), (x1, y1), (x1 + c, y1)],
        [(x2 - c, y1), (x2, y1), (x2, y1 + c)],
        [(x1, y2 - c), (x1, y2), (x1 + c, y2)],
        [(x2 - c, y2), (x2, y2), (x2, y2 - c)],
    ];
    shapes.extend(corners.into_iter().map(|points| Shape::Corner {
        points,
        stroke: style.color,
        stroke_width: style.corner_width,
    }));

    let text_width = label.chars().count() as f64 * style.font_size * MONOSPACE_ADVANCE;
    shapes.push(Shape::Rect {
        x: x1,
        y: y1 - style.label_offset,
        width: text_width + 2.0 * style.label_padding,
        height: style.label_height,
        stroke: style.color,
        stroke_width: 1.0,
        fill: Some(style.label_fill),
    });
    shapes.push(Shape::Label {
        x: x1 + style.label_padding,
        y: y1 - style.text_baseline,
        text: label,
        color: style.color,
        font_size: style.font_size,
    });
}

impl Overlay {
    /// Serialize as a transparent SVG of exactly the surface size.
    pub fn to_svg(&self) -> String {
        let Size { width, height } = self.surface;
        let mut svg = format!(
            r#"<svg xmlns="http://www.w3.org/2000/svg" width="{width}" height="{height}" viewBox="0 0 {width} {height}">"#
        );
        for shape in &self.shapes {
            match shape {
                Shape::Rect {
                    x,
                    y,
                    width,
                    height,
                    stroke,
                    stroke_width,
                    fill,
                } => {
                    let _ = write!(
                        svg,
                        r#"<rect x="{}" y="{}" width="{}" height="{}" fill="{}" stroke="{stroke}" stroke-width="{}"/>"#,
                        num(*x),
                        num(*y),
                        num(*width),
                        num(*height),
                        fill.unwrap_or("none"),
                        num(*stroke_width),
                    );
                }
                Shape::Corner {
                    points,
                    stroke,
                    stroke_width,
                } => {
                    let pts = points
                        .iter()
                        .map(|(x, y)| format!("{},{}", num(*x), num(*y)))
                        .collect::<Vec<_>>()
                        .join(" ");
                    let _ = write!(
                        svg,
                        r#"<polyline points="{pts}" fill="none" stroke="{stroke}" stroke-width="{}"/>"#,
                        num(*stroke_width),
                    );
                }
                Shape::Label {
                    x,
                    y,
                    text,
                    color,
                    font_size,
                } => {
                    let _ = write!(
                        svg,
                        r#"<text x="{}" y="{}" fill="{color}" font-family="monospace" font-weight="bold" font-size="{}">{}</text>"#,
                        num(*x),
                        num(*y),
                        num(*font_size),
                        escape_xml(text),
                    );
                }
            }
        }
        svg.push_str("</svg>");
        svg
    }
}

/// Format with at most two decimals and no trailing zeros.
fn num(value: f64) -> String {
    let s = format!("{value:.2}");
    let s = s.trim_end_matches('0').trim_end_matches('.');
    if s == "-0" {
        "0".to_string()
    } else {
        s.to_string()
    }
}

fn escape_xml(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}
