//! Triangle setup and antialiased scan conversion.

use super::clip::ClippedPolygon;
use glam::{Mat2, Vec2, Vec3};

/// Distance from a pixel center to its corners.
const PX_INSIDE: f32 = std::f32::consts::FRAC_1_SQRT_2;
const PX_OUTSIDE: f32 = -std::f32::consts::FRAC_1_SQRT_2;

/// One pixel visited by [`Triangle::draw_aa`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sample {
    /// Pixel column.
    pub x: u32,
    /// Pixel row.
    pub y: u32,
    /// Interpolated attribute vector (barycentric weights with the canonical basis).
    pub bar: Vec3,
    /// Attribute change per unit step in x.
    pub dx: Vec3,
    /// Attribute change per unit step in y.
    pub dy: Vec3,
    /// Fraction of the pixel covered by the triangle, in `(0, 1]`.
    pub coverage: f32,
}

/// A 2D triangle carrying one attribute vector per vertex.
#[derive(Debug, Clone)]
pub struct Triangle {
    v: [Vec2; 3],
    t: [Vec3; 3],
    /// Unit inward normals of edges v0->v1, v1->v2, v2->v0.
    n: [Vec2; 3],
    dx: Vec3,
    dy: Vec3,
    valid: bool,
}

impl Triangle {
    /// Set up a triangle for rasterization.
    ///
    /// Clockwise input is flipped to counter-clockwise (attributes follow their
    /// vertices). Zero-area triangles are marked invalid and never rasterize.
    pub fn new(v0: Vec2, v1: Vec2, v2: Vec2, t0: Vec3, t1: Vec3, t2: Vec3) -> Self {
        let mut tri = Self {
            v: [v0, v1, v2],
            t: [t0, t1, t2],
            n: [Vec2::ZERO; 3],
            dx: Vec3::ZERO,
            dy: Vec3::ZERO,
            valid: false,
        };
        tri.flip_backface();
        tri.valid = tri.compute_deltas();
        if tri.valid {
            tri.compute_unit_inward_normals();
        }
        tri
    }

    /// Triangle whose attributes are barycentric weights.
    pub fn barycentric(v0: Vec2, v1: Vec2, v2: Vec2) -> Self {
        Self::new(v0, v1, v2, Vec3::X, Vec3::Y, Vec3::Z)
    }

    /// Signed area, positive for counter-clockwise winding.
    pub fn signed_area(&self) -> f32 {
        0.5 * (self.v[1] - self.v[0]).perp_dot(self.v[2] - self.v[0])
    }

    /// Whether the triangle has a non-zero, finite area.
    pub fn is_valid(&self) -> bool {
        self.valid
    }

    pub fn vertices(&self) -> [Vec2; 3] {
        self.v
    }

    pub fn dx(&self) -> Vec3 {
        self.dx
    }

    pub fn dy(&self) -> Vec3 {
        self.dy
    }

    /// Interpolate the attribute vector at a point.
    pub fn interpolate(&self, p: Vec2) -> Vec3 {
        self.t[0] + self.dx * (p.x - self.v[0].x) + self.dy * (p.y - self.v[0].y)
    }

    fn flip_backface(&mut self) {
        if self.signed_area() < 0.0 {
            self.v.swap(1, 2);
            self.t.swap(1, 2);
        }
    }

    /// Invert the edge basis to get the attribute gradient per pixel step.
    fn compute_deltas(&mut self) -> bool {
        let edges = Mat2::from_cols(self.v[1] - self.v[0], self.v[2] - self.v[0]);
        let det = edges.determinant();
        if det == 0.0 || !det.is_finite() {
            return false;
        }

        let inv = edges.inverse();
        // Edge-basis coordinates of a unit step along x and along y.
        let step_x = inv * Vec2::X;
        let step_y = inv * Vec2::Y;
        let dt1 = self.t[1] - self.t[0];
        let dt2 = self.t[2] - self.t[0];

        self.dx = dt1 * step_x.x + dt2 * step_x.y;
        self.dy = dt1 * step_y.x + dt2 * step_y.y;
        self.dx.is_finite() && self.dy.is_finite()
    }

    fn compute_unit_inward_normals(&mut self) {
        for i in 0..3 {
            let edge = self.v[(i + 1) % 3] - self.v[i];
            self.n[i] = edge.perp().normalize_or_zero();
        }
    }

    /// Visit every pixel of `[0, extents)` overlapped by the triangle.
    ///
    /// The callback receives the coverage-weighted sample; returning `false`
    /// stops rasterization and makes `draw_aa` return `false`. Degenerate
    /// triangles visit nothing and return `true`.
    pub fn draw_aa<F>(&self, extents: [u32; 2], mut callback: F) -> bool
    where
        F: FnMut(&Sample) -> bool,
    {
        if !self.valid {
            return true;
        }

        let min = self.v[0].min(self.v[1]).min(self.v[2]);
        let max = self.v[0].max(self.v[1]).max(self.v[2]);
        let x0 = min.x.floor().max(0.0) as u32;
        let y0 = min.y.floor().max(0.0) as u32;
        let x1 = max.x.ceil().min(extents[0] as f32).max(0.0) as u32;
        let y1 = max.y.ceil().min(extents[1] as f32).max(0.0) as u32;

        for y in y0..y1 {
            for x in x0..x1 {
                let origin = Vec2::new(x as f32, y as f32);
                let center = origin + Vec2::splat(0.5);
                let dist = [0, 1, 2].map(|i| self.n[i].dot(center - self.v[i]));

                if dist.iter().any(|&d| d <= PX_OUTSIDE) {
                    continue;
                }

                let (coverage, point) = if dist.iter().all(|&d| d >= PX_INSIDE) {
                    (1.0, center)
                } else {
                    let mut poly = ClippedPolygon::unit_square();
                    for i in 0..3 {
                        poly.clip_half_plane(self.n[i], self.n[i].dot(origin - self.v[i]));
                    }
                    let (area, centroid) = poly.area_centroid();
                    if area <= 0.0 {
                        continue;
                    }
                    (area.min(1.0), origin + centroid)
                };

                let sample = Sample {
                    x,
                    y,
                    bar: self.interpolate(point),
                    dx: self.dx,
                    dy: self.dy,
                    coverage,
                };
                if !callback(&sample) {
                    return false;
                }
            }
        }

        true
    }
}
