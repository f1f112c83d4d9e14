// overlay_paint.rs — egui drawing of overlay placements
//
// Placements are in physical surface pixels; egui works in points, so everything
// is divided by pixels_per_point. Both layers share one background layer, the 3D
// labels first so 2D labels always end up above them.

use crate::document::Element;
use crate::overlay::{Overlay2DRenderer, Overlay3DRenderer};

use egui::{Color32, FontId, Pos2, Rect};
use glam::Vec2;

fn color([r, g, b, a]: [u8; 4]) -> Color32 {
    Color32::from_rgba_unmultiplied(r, g, b, a)
}

fn to_points(p: Vec2, pixels_per_point: f32) -> Pos2 {
    Pos2::new(p.x / pixels_per_point, p.y / pixels_per_point)
}

/// Filled quad through the four corners (tl, tr, br, bl).
fn quad_mesh(corners: &[Vec2; 4], pixels_per_point: f32, fill: Color32) -> egui::Mesh {
    let mut mesh = egui::Mesh::default();
    for c in corners {
        mesh.colored_vertex(to_points(*c, pixels_per_point), fill);
    }
    mesh.add_triangle(0, 1, 2);
    mesh.add_triangle(0, 2, 3);
    mesh
}

/// Element box centred on the anchor, sized in points.
fn label_rect(anchor: Vec2, element: &Element, pixels_per_point: f32) -> Rect {
    let size = element.box_size();
    Rect::from_center_size(to_points(anchor, pixels_per_point), egui::vec2(size.x, size.y))
}

pub fn paint_overlays(ctx: &egui::Context, overlay_3d: &Overlay3DRenderer, overlay_2d: &Overlay2DRenderer) {
    let ppp = ctx.pixels_per_point();
    let painter = ctx.layer_painter(egui::LayerId::new(egui::Order::Background, egui::Id::new("tag_overlays")));

    for p in overlay_3d.placements().iter().filter(|p| p.visible) {
        let Some(element) = p.element.get() else {
            continue;
        };
        painter.add(egui::Shape::mesh(quad_mesh(&p.corners, ppp, color(element.background))));
        // text is only readable from the front
        if p.back_facing {
            continue;
        }
        let centre = p.corners.iter().copied().sum::<Vec2>() * 0.25;
        let height = (p.corners[3] - p.corners[0]).length() / ppp;
        let font_size = element.font_size * height / element.box_size().y.max(1.0);
        if font_size >= 1.0 {
            painter.text(
                to_points(centre, ppp),
                egui::Align2::CENTER_CENTER,
                &element.text,
                FontId::proportional(font_size),
                color(element.color),
            );
        }
    }

    for p in overlay_2d.placements().iter().filter(|p| p.visible) {
        let Some(element) = p.element.get() else {
            continue;
        };
        let rect = label_rect(p.position, &element, ppp);
        painter.rect_filled(rect, 4.0, color(element.background));
        painter.text(
            rect.center(),
            egui::Align2::CENTER_CENTER,
            &element.text,
            FontId::proportional(element.font_size),
            color(element.color),
        );
    }
}
