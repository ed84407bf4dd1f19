//! Demo scene for the binary: a few depth-overlapping axis-aligned quads.
//!
//! Quads are given in world space and projected with the frame's matrices to
//! screen rectangles, so they can be drawn with clears (real GL) or
//! rectangle fills (software device).

use crate::core::Viewport;
use glam::{DMat4, DVec3};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Quad {
    pub min: DVec3,
    pub max: DVec3,
    pub color: [f32; 4],
}

/// Screen-space rectangle with a constant window depth
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScreenQuad {
    pub rect: Viewport,
    pub depth: f32,
    pub color: [f32; 4],
}

pub fn demo_quads() -> Vec<Quad> {
    vec![
        Quad {
            min: DVec3::new(-0.8, -0.6, -0.5),
            max: DVec3::new(0.2, 0.4, -0.5),
            color: [0.9, 0.2, 0.2, 1.0],
        },
        Quad {
            min: DVec3::new(-0.3, -0.2, 0.0),
            max: DVec3::new(0.6, 0.7, 0.0),
            color: [0.2, 0.8, 0.3, 1.0],
        },
        Quad {
            min: DVec3::new(0.0, -0.8, 0.4),
            max: DVec3::new(0.8, 0.0, 0.4),
            color: [0.2, 0.4, 0.9, 1.0],
        },
    ]
}

/// Project `quad` into `viewport`. `None` if it ends up outside or behind.
pub fn project(quad: &Quad, projection: &DMat4, modelview: &DMat4, viewport: Viewport) -> Option<ScreenQuad> {
    let mvp = *projection * *modelview;
    let a = mvp.project_point3(quad.min);
    let b = mvp.project_point3(quad.max);
    if !(a.is_finite() && b.is_finite()) {
        return None;
    }
    let to_px = |ndc: f64, origin: i32, extent: i32| origin as f64 + (ndc * 0.5 + 0.5) * extent as f64;
    let x0 = to_px(a.x.min(b.x), viewport.x, viewport.width).round() as i32;
    let x1 = to_px(a.x.max(b.x), viewport.x, viewport.width).round() as i32;
    let y0 = to_px(a.y.min(b.y), viewport.y, viewport.height).round() as i32;
    let y1 = to_px(a.y.max(b.y), viewport.y, viewport.height).round() as i32;

    let depth = (a.z * 0.5 + 0.5) as f32;
    let rect = Viewport::new(x0, y0, x1 - x0, y1 - y0);
    if rect.is_empty() || !(0.0..1.0).contains(&depth) {
        return None;
    }
    Some(ScreenQuad {
        rect,
        depth,
        color: quad.color,
    })
}

/// Back-to-front projected quads, ready for painter's-order drawing
pub fn layout(projection: &DMat4, modelview: &DMat4, viewport: Viewport) -> Vec<ScreenQuad> {
    let mut quads: Vec<ScreenQuad> = demo_quads()
        .iter()
        .filter_map(|q| project(q, projection, modelview, viewport))
        .collect();
    quads.sort_by(|a, b| b.depth.total_cmp(&a.depth));
    quads
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity_projection() {
        let quad = Quad {
            min: DVec3::new(-0.5, -0.5, 0.0),
            max: DVec3::new(0.5, 0.5, 0.0),
            color: [1.0; 4],
        };
        let screen = project(&quad, &DMat4::IDENTITY, &DMat4::IDENTITY, Viewport::full(100, 100)).unwrap();
        assert_eq!(screen.rect, Viewport::new(25, 25, 50, 50));
        assert_eq!(screen.depth, 0.5);
    }

    #[test]
    fn test_layout_sorted_back_to_front() {
        let quads = layout(&DMat4::IDENTITY, &DMat4::IDENTITY, Viewport::full(64, 64));
        assert_eq!(quads.len(), 3);
        assert!(quads.windows(2).all(|w| w[0].depth >= w[1].depth));
    }
}
