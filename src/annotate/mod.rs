//! Defect overlays.
//!
//! `annotate` copies the frame and draws one labelled rectangle per defect.
//! The source image is never touched.

mod font;

use image::{Rgb, RgbImage};

use crate::analysis::{Defect, FrameAnalysis};
use crate::taxonomy::Severity;

const TEXT_COLOR: Rgb<u8> = Rgb([255, 255, 255]);
const LABEL_PAD_X: u32 = 2;
const LABEL_PAD_Y: u32 = 4;

/// Render all defects of `analysis` onto a copy of `image`.
pub fn annotate(image: &RgbImage, analysis: &FrameAnalysis) -> RgbImage {
    let mut canvas = image.clone();
    if canvas.width() == 0 || canvas.height() == 0 {
        return canvas;
    }
    let scale = label_scale(canvas.width());
    for defect in &analysis.defects {
        draw_defect(&mut canvas, defect, scale);
    }
    canvas
}

/// Overlay text for one defect, e.g. `WALL CRACK [HIGH] 87%`.
pub fn label_text(defect: &Defect) -> String {
    let mut label = format!(
        "{} [{}]",
        defect.defect_type.label().to_uppercase(),
        defect.severity.as_str().to_uppercase()
    );
    if let Some(confidence) = defect.confidence {
        label.push_str(&format!(" {:.0}%", confidence * 100.0));
    }
    label
}

pub fn line_thickness(severity: Severity) -> u32 {
    match severity {
        Severity::Critical | Severity::High => 3,
        Severity::Medium | Severity::Low => 2,
    }
}

fn label_scale(width: u32) -> u32 {
    (width / 640).clamp(1, 3)
}

fn draw_defect(canvas: &mut RgbImage, defect: &Defect, scale: u32) {
    let (width, height) = canvas.dimensions();
    let (ax, ay, bx, by) = defect.bbox.to_pixels(width, height);
    let (x1, x2) = (ax.min(bx), ax.max(bx));
    let (y1, y2) = (ay.min(by), ay.max(by));
    let color = Rgb(defect.defect_type.meta().color);

    draw_rect(canvas, (x1, y1, x2, y2), color, line_thickness(defect.severity));

    let text = label_text(defect);
    let text_h = font::text_height(scale);
    let text_w = font::text_width(&text, scale);
    // Above the box, pushed down to the top edge when it would clip.
    let label_y = y1.saturating_sub(text_h + 6);
    fill_rect(
        canvas,
        (
            x1,
            label_y,
            x1.saturating_add(text_w + 2 * LABEL_PAD_X),
            label_y.saturating_add(text_h + 2 * LABEL_PAD_Y),
        ),
        color,
    );
    font::draw_text(
        canvas,
        x1 + LABEL_PAD_X,
        label_y + LABEL_PAD_Y,
        &text,
        TEXT_COLOR,
        scale,
    );
}

/// Outline drawn inward from the box edge, `thickness` pixels wide.
fn draw_rect(
    canvas: &mut RgbImage,
    (x0, y0, x1, y1): (u32, u32, u32, u32),
    color: Rgb<u8>,
    thickness: u32,
) {
    let (w, h) = canvas.dimensions();
    for t in 0..thickness {
        let xx0 = x0 + t;
        let yy0 = y0 + t;
        let xx1 = x1.saturating_sub(t);
        let yy1 = y1.saturating_sub(t);
        if xx0 > xx1 || yy0 > yy1 || xx1 >= w || yy1 >= h {
            break;
        }
        for x in xx0..=xx1 {
            canvas.put_pixel(x, yy0, color);
            canvas.put_pixel(x, yy1, color);
        }
        for y in yy0..=yy1 {
            canvas.put_pixel(xx0, y, color);
            canvas.put_pixel(xx1, y, color);
        }
    }
}

fn fill_rect(canvas: &mut RgbImage, (x0, y0, x1, y1): (u32, u32, u32, u32), color: Rgb<u8>) {
    let (w, h) = canvas.dimensions();
    let x1 = x1.min(w - 1);
    let y1 = y1.min(h - 1);
    for y in y0..=y1 {
        for x in x0..=x1 {
            canvas.put_pixel(x, y, color);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::{BoundingBox, RoomCondition};
    use crate::taxonomy::DefectType;

    fn defect(defect_type: DefectType, severity: Severity, bbox: BoundingBox) -> Defect {
        Defect {
            defect_type,
            severity,
            description: String::new(),
            bbox,
            confidence: None,
        }
    }

    fn analysis(defects: Vec<Defect>) -> FrameAnalysis {
        FrameAnalysis {
            defects,
            room_condition: RoomCondition::Poor,
            summary: String::new(),
            error: None,
        }
    }

    #[test]
    fn full_box_reaches_image_corners() {
        let source = RgbImage::new(200, 100);
        let frame = analysis(vec![defect(
            DefectType::WallCrack,
            Severity::Low,
            BoundingBox::FULL_IMAGE,
        )]);
        let out = annotate(&source, &frame);
        let color = Rgb(DefectType::WallCrack.meta().color);
        assert_eq!(out.get_pixel(199, 99), &color);
        assert_eq!(out.get_pixel(0, 99), &color);
        assert_eq!(out.get_pixel(199, 50), &color);
        // Two-pixel outline for low severity: the third ring stays untouched.
        assert_eq!(out.get_pixel(197, 50), &Rgb([0, 0, 0]));
    }

    #[test]
    fn critical_boxes_are_thicker() {
        let source = RgbImage::new(200, 100);
        let frame = analysis(vec![defect(
            DefectType::ElectricalHazard,
            Severity::Critical,
            BoundingBox::Pixel([20.0, 40.0, 120.0, 90.0]),
        )]);
        let out = annotate(&source, &frame);
        let color = Rgb([255, 0, 0]);
        assert_eq!(out.get_pixel(118, 60), &color);
        assert_eq!(out.get_pixel(117, 60), &Rgb([0, 0, 0]));
        assert_eq!(out.get_pixel(120, 60), &color);
        assert_eq!(out.get_pixel(121, 60), &Rgb([0, 0, 0]));
    }

    #[test]
    fn label_sits_above_the_box() {
        let source = RgbImage::new(200, 100);
        let frame = analysis(vec![defect(
            DefectType::Mold,
            Severity::High,
            BoundingBox::Pixel([10.0, 50.0, 100.0, 90.0]),
        )]);
        let out = annotate(&source, &frame);
        // label_y = 50 - 7 - 6 = 37, padded background starts there.
        assert_eq!(out.get_pixel(10, 37), &Rgb(DefectType::Mold.meta().color));
        assert_eq!(out.get_pixel(10, 36), &Rgb([0, 0, 0]));
    }

    #[test]
    fn label_is_pushed_down_at_the_top_edge() {
        let source = RgbImage::new(200, 100);
        let frame = analysis(vec![defect(
            DefectType::Mold,
            Severity::High,
            BoundingBox::Pixel([10.0, 2.0, 150.0, 90.0]),
        )]);
        let out = annotate(&source, &frame);
        let color = Rgb(DefectType::Mold.meta().color);
        // 2 - (7 + 6) saturates to row 0; background spans rows 0..=15.
        assert_eq!(out.get_pixel(10, 0), &color);
        assert_eq!(out.get_pixel(10, 15), &color);
        let white: Vec<(u32, u32)> = out
            .enumerate_pixels()
            .filter(|(_, _, p)| **p == TEXT_COLOR)
            .map(|(x, y, _)| (x, y))
            .collect();
        assert!(!white.is_empty());
        assert!(white.iter().all(|&(x, y)| (4..11).contains(&y) && x >= 12));
    }

    #[test]
    fn source_is_not_mutated_and_output_is_deterministic() {
        let source = RgbImage::from_pixel(64, 48, Rgb([9, 9, 9]));
        let frame = analysis(vec![defect(
            DefectType::WaterDamage,
            Severity::Medium,
            BoundingBox::Normalized([100.0, 100.0, 900.0, 900.0]),
        )]);
        let first = annotate(&source, &frame);
        let second = annotate(&source, &frame);
        assert_eq!(first, second);
        assert_ne!(first, source);
        assert!(source.pixels().all(|p| *p == Rgb([9, 9, 9])));
    }

    #[test]
    fn no_defects_means_identical_copy() {
        let source = RgbImage::from_pixel(10, 10, Rgb([1, 2, 3]));
        assert_eq!(annotate(&source, &analysis(vec![])), source);
    }

    #[test]
    fn label_text_includes_confidence_when_present() {
        let mut d = defect(DefectType::WallCrack, Severity::High, BoundingBox::FULL_IMAGE);
        assert_eq!(label_text(&d), "WALL CRACK [HIGH]");
        d.confidence = Some(0.87);
        assert_eq!(label_text(&d), "WALL CRACK [HIGH] 87%");
    }

    #[test]
    fn out_of_range_boxes_are_clamped() {
        let source = RgbImage::new(50, 40);
        let frame = analysis(vec![defect(
            DefectType::Other,
            Severity::Low,
            BoundingBox::Pixel([-30.0, -30.0, 500.0, 500.0]),
        )]);
        let out = annotate(&source, &frame);
        assert_eq!(out.get_pixel(49, 39), &Rgb([128, 128, 128]));
    }
}
