//! Fast-marching inpainting after Telea (2004).
//!
//! Pixels to fill are processed in order of their distance `T` from the
//! known region, boundary first. Each one is estimated from the known pixels
//! within `radius`, weighted by direction along the level-set normal,
//! geometric distance and level-set distance.

use std::{cmp::Ordering, collections::BinaryHeap};

use image::{GrayImage, Rgb, RgbImage};

use crate::error::{LesionError, Result};

/// Arrival time assigned to pixels the front has not reached yet
const UNREACHED: f64 = 1.0e6;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Known,
    Band,
    Inside,
}

/// Min-heap entry on arrival time
#[derive(Debug, Clone, Copy)]
struct Front {
    time: f64,
    x: u32,
    y: u32,
}

impl PartialEq for Front {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Front {}

impl PartialOrd for Front {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Front {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .time
            .total_cmp(&self.time)
            .then_with(|| (other.y, other.x).cmp(&(self.y, self.x)))
    }
}

struct Field {
    width: u32,
    height: u32,
    state: Vec<State>,
    time: Vec<f64>,
    pixels: Vec<[f64; 3]>,
}

impl Field {
    fn index(&self, x: u32, y: u32) -> usize {
        y as usize * self.width as usize + x as usize
    }

    fn in_bounds(&self, x: i64, y: i64) -> bool {
        x >= 0 && y >= 0 && x < self.width as i64 && y < self.height as i64
    }

    /// Out-of-bounds pixels behave as unreached
    fn state_at(&self, x: i64, y: i64) -> State {
        if self.in_bounds(x, y) {
            self.state[self.index(x as u32, y as u32)]
        } else {
            State::Inside
        }
    }

    fn time_at(&self, x: i64, y: i64) -> f64 {
        if self.in_bounds(x, y) {
            self.time[self.index(x as u32, y as u32)]
        } else {
            UNREACHED
        }
    }

    fn neighbours(&self, x: u32, y: u32) -> impl Iterator<Item = (u32, u32)> + '_ {
        let (x, y) = (x as i64, y as i64);
        [(x - 1, y), (x + 1, y), (x, y - 1), (x, y + 1)]
            .into_iter()
            .filter(|(nx, ny)| self.in_bounds(*nx, *ny))
            .map(|(nx, ny)| (nx as u32, ny as u32))
    }

    /// Eikonal update from two adjacent neighbours
    fn solve(&self, (x1, y1): (i64, i64), (x2, y2): (i64, i64)) -> f64 {
        let t1 = self.time_at(x1, y1);
        let t2 = self.time_at(x2, y2);
        let known1 = self.state_at(x1, y1) != State::Inside;
        let known2 = self.state_at(x2, y2) != State::Inside;

        match (known1, known2) {
            (true, true) => {
                if (t1 - t2).abs() >= 1.0 {
                    1.0 + t1.min(t2)
                } else {
                    (t1 + t2 + (2.0 - (t1 - t2).powi(2)).sqrt()) * 0.5
                }
            }
            (true, false) => 1.0 + t1,
            (false, true) => 1.0 + t2,
            (false, false) => 1.0 + t1.min(t2),
        }
    }

    fn arrival_time(&self, x: u32, y: u32) -> f64 {
        let (x, y) = (x as i64, y as i64);
        [
            self.solve((x - 1, y), (x, y - 1)),
            self.solve((x + 1, y), (x, y - 1)),
            self.solve((x - 1, y), (x, y + 1)),
            self.solve((x + 1, y), (x, y + 1)),
        ]
        .into_iter()
        .fold(f64::INFINITY, f64::min)
    }

    /// Finite difference of `sample` along one axis using only reached
    /// neighbours.
    fn difference<F>(&self, (x, y): (i64, i64), (dx, dy): (i64, i64), sample: F) -> f64
    where
        F: Fn(i64, i64) -> f64,
    {
        let forward = self.state_at(x + dx, y + dy) != State::Inside;
        let backward = self.state_at(x - dx, y - dy) != State::Inside;
        match (forward, backward) {
            (true, true) => (sample(x + dx, y + dy) - sample(x - dx, y - dy)) * 0.5,
            (true, false) => sample(x + dx, y + dy) - sample(x, y),
            (false, true) => sample(x, y) - sample(x - dx, y - dy),
            (false, false) => 0.0,
        }
    }

    fn time_gradient(&self, x: i64, y: i64) -> (f64, f64) {
        let sample = |sx, sy| self.time_at(sx, sy);
        (
            self.difference((x, y), (1, 0), sample),
            self.difference((x, y), (0, 1), sample),
        )
    }

    fn colour_gradient(&self, x: i64, y: i64, channel: usize) -> (f64, f64) {
        let sample = |sx: i64, sy: i64| self.pixels[self.index(sx as u32, sy as u32)][channel];
        (
            self.difference((x, y), (1, 0), sample),
            self.difference((x, y), (0, 1), sample),
        )
    }

    fn estimate(&self, px: u32, py: u32, radius: i64) -> Option<[f64; 3]> {
        let (px, py) = (px as i64, py as i64);
        let t_p = self.time_at(px, py);
        let (gx, gy) = self.time_gradient(px, py);
        let grad_len = gx.hypot(gy);

        let mut weight_sum = 0.0;
        let mut acc = [0.0f64; 3];

        for dy in -radius..=radius {
            for dx in -radius..=radius {
                if (dx == 0 && dy == 0) || dx * dx + dy * dy > radius * radius {
                    continue;
                }
                let (qx, qy) = (px + dx, py + dy);
                if self.state_at(qx, qy) == State::Inside {
                    continue;
                }

                // r = p - q
                let (rx, ry) = (-dx as f64, -dy as f64);
                let dist_sq = rx * rx + ry * ry;
                let direction = if grad_len > 0.0 {
                    ((rx * gx + ry * gy) / (dist_sq.sqrt() * grad_len)).abs().max(1e-6)
                } else {
                    1e-6
                };
                let distance = 1.0 / dist_sq;
                let level = 1.0 / (1.0 + (self.time_at(qx, qy) - t_p).abs());
                let weight = direction * distance * level;

                let q = self.pixels[self.index(qx as u32, qy as u32)];
                for (c, slot) in acc.iter_mut().enumerate() {
                    let (ix, iy) = self.colour_gradient(qx, qy, c);
                    *slot += weight * (q[c] + ix * rx + iy * ry);
                }
                weight_sum += weight;
            }
        }

        (weight_sum > 0.0).then(|| acc.map(|v| (v / weight_sum).clamp(0.0, 255.0)))
    }
}

/// Fill every pixel where `mask` is non-zero from its surroundings.
///
/// A mask covering the whole image has no known pixels to propagate from and
/// leaves the image unchanged.
pub fn inpaint_telea(image: &RgbImage, mask: &GrayImage, radius: u8) -> Result<RgbImage> {
    if image.dimensions() != mask.dimensions() {
        return Err(LesionError::dimension_mismatch(image.dimensions(), mask.dimensions()));
    }
    if radius == 0 {
        return Err(LesionError::InvalidConfig("inpaint radius must be positive".into()));
    }

    let (width, height) = image.dimensions();
    let mut field = Field {
        width,
        height,
        state: mask
            .pixels()
            .map(|p| if p[0] > 0 { State::Inside } else { State::Known })
            .collect(),
        time: mask
            .pixels()
            .map(|p| if p[0] > 0 { UNREACHED } else { 0.0 })
            .collect(),
        pixels: image
            .pixels()
            .map(|p| [p[0] as f64, p[1] as f64, p[2] as f64])
            .collect(),
    };

    let mut heap = BinaryHeap::new();
    for y in 0..height {
        for x in 0..width {
            let i = field.index(x, y);
            if field.state[i] != State::Known {
                continue;
            }
            let touches_hole = field
                .neighbours(x, y)
                .any(|(nx, ny)| field.state[field.index(nx, ny)] == State::Inside);
            if touches_hole {
                field.state[i] = State::Band;
                heap.push(Front { time: 0.0, x, y });
            }
        }
    }

    while let Some(Front { x, y, .. }) = heap.pop() {
        let i = field.index(x, y);
        field.state[i] = State::Known;

        let pending: Vec<(u32, u32)> = field
            .neighbours(x, y)
            .filter(|(nx, ny)| field.state[field.index(*nx, *ny)] == State::Inside)
            .collect();

        for (nx, ny) in pending {
            let n = field.index(nx, ny);
            let time = field.arrival_time(nx, ny);
            field.time[n] = time;
            if let Some(value) = field.estimate(nx, ny, radius as i64) {
                field.pixels[n] = value;
            }
            field.state[n] = State::Band;
            heap.push(Front { time, x: nx, y: ny });
        }
    }

    Ok(RgbImage::from_fn(width, height, |x, y| {
        let p = field.pixels[field.index(x, y)];
        Rgb([p[0].round() as u8, p[1].round() as u8, p[2].round() as u8])
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Luma;

    #[test]
    fn test_uniform_background_fills_exactly() {
        let mut image = RgbImage::from_pixel(20, 20, Rgb([180, 140, 120]));
        let mask = GrayImage::from_fn(20, 20, |x, _| if (9..12).contains(&x) { Luma([255]) } else { Luma([0]) });
        for y in 0..20 {
            for x in 9..12 {
                image.put_pixel(x, y, Rgb([10, 10, 10]));
            }
        }

        let filled = inpaint_telea(&image, &mask, 5).expect("same dimensions");
        for y in 0..20 {
            for x in 9..12 {
                assert_eq!(filled.get_pixel(x, y), &Rgb([180, 140, 120]), "pixel ({x}, {y})");
            }
        }
    }

    #[test]
    fn test_known_pixels_are_untouched() {
        let image = RgbImage::from_fn(16, 16, |x, y| Rgb([(x * 10) as u8, (y * 10) as u8, 50]));
        let mask = GrayImage::from_fn(16, 16, |x, y| if x == 8 && y == 8 { Luma([255]) } else { Luma([0]) });
        let filled = inpaint_telea(&image, &mask, 3).expect("same dimensions");
        for (x, y, p) in image.enumerate_pixels() {
            if (x, y) != (8, 8) {
                assert_eq!(filled.get_pixel(x, y), p);
            }
        }
        // Linear ramp is continued into the hole
        let centre = filled.get_pixel(8, 8);
        assert!((centre[0] as i32 - 80).abs() <= 2);
        assert!((centre[1] as i32 - 80).abs() <= 2);
    }

    #[test]
    fn test_full_mask_is_left_alone() {
        let image = RgbImage::from_pixel(5, 5, Rgb([1, 2, 3]));
        let mask = GrayImage::from_pixel(5, 5, Luma([255]));
        assert_eq!(inpaint_telea(&image, &mask, 2).expect("same dimensions"), image);
    }

    #[test]
    fn test_rejects_bad_arguments() {
        let image = RgbImage::new(4, 4);
        assert!(inpaint_telea(&image, &GrayImage::new(3, 4), 2).is_err());
        assert!(inpaint_telea(&image, &GrayImage::new(4, 4), 0).is_err());
    }
}
