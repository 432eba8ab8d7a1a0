//! Convex polygon clipping of a pixel cell against triangle half-planes.

use glam::Vec2;

/// A unit square clipped by up to three half-planes has at most 7 vertices.
const MAX_VERTICES: usize = 8;

/// Pixel-cell polygon clipped in place with two alternating scratch buffers.
#[derive(Debug, Clone)]
pub struct ClippedPolygon {
    buffers: [[Vec2; MAX_VERTICES]; 2],
    active: usize,
    len: usize,
}

impl ClippedPolygon {
    /// The unit square `[0, 1] x [0, 1]`, counter-clockwise.
    pub fn unit_square() -> Self {
        let mut buffers = [[Vec2::ZERO; MAX_VERTICES]; 2];
        buffers[0][..4].copy_from_slice(&[
            Vec2::new(0.0, 0.0),
            Vec2::new(1.0, 0.0),
            Vec2::new(1.0, 1.0),
            Vec2::new(0.0, 1.0),
        ]);
        Self {
            buffers,
            active: 0,
            len: 4,
        }
    }

    /// Current polygon vertices.
    pub fn vertices(&self) -> &[Vec2] {
        &self.buffers[self.active][..self.len]
    }

    /// Keep the part of the polygon where `normal . p + offset >= 0`.
    pub fn clip_half_plane(&mut self, normal: Vec2, offset: f32) {
        let (first, second) = self.buffers.split_at_mut(1);
        let (src, dst) = if self.active == 0 {
            (&first[0], &mut second[0])
        } else {
            (&second[0], &mut first[0])
        };

        let mut out = 0;
        for i in 0..self.len {
            let cur = src[i];
            let next = src[(i + 1) % self.len];
            let d_cur = normal.dot(cur) + offset;
            let d_next = normal.dot(next) + offset;

            if d_cur >= 0.0 && out < MAX_VERTICES {
                dst[out] = cur;
                out += 1;
            }
            if ((d_cur > 0.0 && d_next < 0.0) || (d_cur < 0.0 && d_next > 0.0)) && out < MAX_VERTICES {
                let t = d_cur / (d_cur - d_next);
                dst[out] = cur + (next - cur) * t;
                out += 1;
            }
        }

        self.active ^= 1;
        self.len = out;
    }

    /// Signed area and centroid of the polygon.
    ///
    /// Degenerate polygons report zero area and a zero centroid.
    pub fn area_centroid(&self) -> (f32, Vec2) {
        let verts = self.vertices();
        if verts.len() < 3 {
            return (0.0, Vec2::ZERO);
        }

        let mut twice_area = 0.0;
        let mut centroid = Vec2::ZERO;
        for i in 0..verts.len() {
            let a = verts[i];
            let b = verts[(i + 1) % verts.len()];
            let cross = a.perp_dot(b);
            twice_area += cross;
            centroid += (a + b) * cross;
        }

        if twice_area == 0.0 {
            return (0.0, Vec2::ZERO);
        }

        (twice_area * 0.5, centroid / (3.0 * twice_area))
    }
}
