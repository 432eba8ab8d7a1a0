//! Seam dilation: bleeding baked colors into unfilled atlas texels.

use crate::error::{MergeError, Result};
use std::collections::VecDeque;

/// Fills unbaked texels (alpha 0) of an interleaved pixel buffer in place.
pub trait SeamDilator: Send + Sync {
    /// Dilate `pixels`, a `width x height` image of `bytes_per_pixel` channels
    /// per texel and `stride` bytes per row.
    ///
    /// Running it on a buffer with no unfilled texels must leave it unchanged.
    fn dilate(
        &self,
        pixels: &mut [u8],
        width: u32,
        height: u32,
        alpha_channel: usize,
        bytes_per_pixel: usize,
        stride: usize,
    ) -> Result<()>;
}

/// Copies the color of the nearest filled texel (8-neighbourhood flood) into
/// every unfilled texel. Alpha is left untouched.
#[derive(Debug, Clone, Copy, Default)]
pub struct NearestDilator {
    /// Stop after this many rings; `None` fills the whole image.
    pub max_distance: Option<u32>,
}

impl NearestDilator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_distance(mut self, distance: u32) -> Self {
        self.max_distance = Some(distance);
        self
    }
}

const NEIGHBOURS: [(i32, i32); 8] = [
    (-1, -1),
    (0, -1),
    (1, -1),
    (-1, 0),
    (1, 0),
    (-1, 1),
    (0, 1),
    (1, 1),
];

impl SeamDilator for NearestDilator {
    fn dilate(
        &self,
        pixels: &mut [u8],
        width: u32,
        height: u32,
        alpha_channel: usize,
        bytes_per_pixel: usize,
        stride: usize,
    ) -> Result<()> {
        if width == 0 || height == 0 {
            return Ok(());
        }
        if alpha_channel >= bytes_per_pixel || stride < width as usize * bytes_per_pixel {
            return Err(MergeError::InvalidBuffer(format!(
                "alpha channel {} with {} bytes per pixel and stride {} for width {}",
                alpha_channel, bytes_per_pixel, stride, width
            )));
        }
        let required = stride * (height as usize - 1) + width as usize * bytes_per_pixel;
        if pixels.len() < required {
            return Err(MergeError::InvalidBuffer(format!(
                "pixel buffer has {} bytes, {}x{} needs {}",
                pixels.len(),
                width,
                height,
                required
            )));
        }

        let offset = |x: u32, y: u32| y as usize * stride + x as usize * bytes_per_pixel;
        let mut filled = vec![false; width as usize * height as usize];
        let mut queue: VecDeque<(u32, u32, u32)> = VecDeque::new();

        // Seed from every baked texel
        for y in 0..height {
            for x in 0..width {
                if pixels[offset(x, y) + alpha_channel] != 0 {
                    filled[y as usize * width as usize + x as usize] = true;
                    queue.push_back((x, y, 0));
                }
            }
        }
        if queue.is_empty() || queue.len() == filled.len() {
            return Ok(());
        }

        let mut written = 0usize;
        while let Some((x, y, distance)) = queue.pop_front() {
            if self.max_distance.is_some_and(|max| distance >= max) {
                continue;
            }
            for (dx, dy) in NEIGHBOURS {
                let nx = x as i32 + dx;
                let ny = y as i32 + dy;
                if nx < 0 || ny < 0 || nx >= width as i32 || ny >= height as i32 {
                    continue;
                }
                let (nx, ny) = (nx as u32, ny as u32);
                let index = ny as usize * width as usize + nx as usize;
                if filled[index] {
                    continue;
                }
                filled[index] = true;

                let src = offset(x, y);
                let dst = offset(nx, ny);
                for channel in (0..bytes_per_pixel).filter(|&c| c != alpha_channel) {
                    pixels[dst + channel] = pixels[src + channel];
                }
                written += 1;
                queue.push_back((nx, ny, distance + 1));
            }
        }

        log::debug!("Dilated {} texels of a {}x{} atlas", written, width, height);
        Ok(())
    }
}
