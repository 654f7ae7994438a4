//! Pixel analysis primitives shared by calibration, capture and classification.
//!
//! All analysis runs on a grayscale plane using the ITU-R BT.601 luma
//! formula: Y = 0.299*R + 0.587*G + 0.114*B.

use image::{ImageBuffer, Pixel, Rgba};
use std::ops::Range;

/// Row variance above which a row has visible ink or graphics.
const CONTENT_ROW_MIN_VARIANCE: f64 = 100.0;

/// Row mean at or above which a row is blank paper or margin.
const CONTENT_ROW_MAX_MEAN: f64 = 245.0;

/// Half-width of the sliding window used by the column/row variance scans.
const VARIANCE_WINDOW_RADIUS: u32 = 2;

/// Grayscale copy of an image as floating point luma values.
#[derive(Clone, Debug)]
pub struct GrayPlane {
    width: u32,
    height: u32,
    data: Vec<f64>,
}

impl GrayPlane {
    pub fn from_rgba(img: &ImageBuffer<Rgba<u8>, Vec<u8>>) -> Self {
        let data = img
            .pixels()
            .map(|p| {
                let c = p.channels();
                0.299 * c[0] as f64 + 0.587 * c[1] as f64 + 0.114 * c[2] as f64
            })
            .collect();
        Self {
            width: img.width(),
            height: img.height(),
            data,
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn get(&self, x: u32, y: u32) -> f64 {
        self.data[(y * self.width + x) as usize]
    }

    pub fn row(&self, y: u32) -> &[f64] {
        let start = (y * self.width) as usize;
        &self.data[start..start + self.width as usize]
    }

    /// Mean luma of a rectangle, clipped to the plane. Empty rectangles give 0.
    pub fn mean_of(&self, cols: Range<u32>, rows: Range<u32>) -> f64 {
        let cols = clip(cols, self.width);
        let rows = clip(rows, self.height);
        let count = cols.len() * rows.len();
        if count == 0 {
            return 0.0;
        }
        let mut total = 0.0;
        for y in rows {
            total += self.row(y)[cols.start as usize..cols.end as usize]
                .iter()
                .sum::<f64>();
        }
        total / count as f64
    }
}

/// Clips a range to `0..limit`, never producing `start > end`.
fn clip(range: Range<u32>, limit: u32) -> Range<u32> {
    let end = range.end.min(limit);
    range.start.min(end)..end
}

/// Population mean and variance of a slice.
fn mean_and_variance(values: &[f64]) -> (f64, f64) {
    if values.is_empty() {
        return (0.0, 0.0);
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let variance = values.iter().map(|v| (v - mean) * (v - mean)).sum::<f64>() / n;
    (mean, variance)
}

/// Flags rows that carry visible content.
///
/// A row has content when its luma variance exceeds 100 and its mean stays
/// below 245, which excludes blank paper and uniform margins.
pub fn row_content_mask(img: &ImageBuffer<Rgba<u8>, Vec<u8>>) -> Vec<bool> {
    let plane = GrayPlane::from_rgba(img);
    (0..plane.height())
        .map(|y| {
            let (mean, variance) = mean_and_variance(plane.row(y));
            variance > CONTENT_ROW_MIN_VARIANCE && mean < CONTENT_ROW_MAX_MEAN
        })
        .collect()
}

/// Length of the longest run of `true` values.
pub fn max_consecutive_run(flags: &[bool]) -> usize {
    let mut longest = 0;
    let mut current = 0;
    for &flag in flags {
        if flag {
            current += 1;
            longest = longest.max(current);
        } else {
            current = 0;
        }
    }
    longest
}

/// Variance of a sliding window combined from per-lane sums.
///
/// `sums[i]` and `sq_sums[i]` hold the sum and sum of squares of lane `i`
/// over `lane_len` samples; each output value covers lanes `i-2 ..= i+2`.
fn windowed_variance(sums: &[f64], sq_sums: &[f64], lane_len: usize) -> Vec<f64> {
    let lanes = sums.len();
    let radius = VARIANCE_WINDOW_RADIUS as usize;
    (0..lanes)
        .map(|i| {
            let lo = i.saturating_sub(radius);
            let hi = (i + radius + 1).min(lanes);
            let n = ((hi - lo) * lane_len) as f64;
            if n == 0.0 {
                return 0.0;
            }
            let sum: f64 = sums[lo..hi].iter().sum();
            let sq: f64 = sq_sums[lo..hi].iter().sum();
            let mean = sum / n;
            (sq / n - mean * mean).max(0.0)
        })
        .collect()
}

/// Per-column variance of a 5-pixel-wide window over the given row band.
///
/// Content columns (text, images) vary; uniform margins stay near zero.
pub fn column_variance(plane: &GrayPlane, rows: Range<u32>) -> Vec<f64> {
    let rows = clip(rows, plane.height());
    let width = plane.width() as usize;
    let mut sums = vec![0.0; width];
    let mut sq_sums = vec![0.0; width];
    for y in rows.clone() {
        for (x, &v) in plane.row(y).iter().enumerate() {
            sums[x] += v;
            sq_sums[x] += v * v;
        }
    }
    windowed_variance(&sums, &sq_sums, rows.len())
}

/// Per-row variance of a 5-pixel-tall window over the given column band.
pub fn row_variance(plane: &GrayPlane, cols: Range<u32>) -> Vec<f64> {
    let cols = clip(cols, plane.width());
    let mut sums = Vec::with_capacity(plane.height() as usize);
    let mut sq_sums = Vec::with_capacity(plane.height() as usize);
    for y in 0..plane.height() {
        let band = &plane.row(y)[cols.start as usize..cols.end as usize];
        sums.push(band.iter().sum());
        sq_sums.push(band.iter().map(|v| v * v).sum());
    }
    windowed_variance(&sums, &sq_sums, cols.len())
}

/// Compares two images and returns true if they are nearly identical.
///
/// Images of different sizes are never similar: a size change means the
/// layout changed. Similarity is `1 - mean(|a-b|) / 255` over the RGB samples.
pub fn images_similar(
    a: &ImageBuffer<Rgba<u8>, Vec<u8>>,
    b: &ImageBuffer<Rgba<u8>, Vec<u8>>,
    threshold: f64,
) -> bool {
    if a.dimensions() != b.dimensions() {
        return false;
    }
    let samples = a.width() as u64 * a.height() as u64 * 3;
    if samples == 0 {
        return true;
    }

    let total_diff: u64 = a
        .pixels()
        .zip(b.pixels())
        .map(|(pa, pb)| {
            (0..3)
                .map(|c| (pa[c] as i32 - pb[c] as i32).unsigned_abs() as u64)
                .sum::<u64>()
        })
        .sum();

    let similarity = 1.0 - (total_diff as f64 / samples as f64) / 255.0;
    similarity > threshold
}

/// Absolute horizontal gradient `|p(x+1, y) - p(x, y)|` of a sub-rectangle.
#[derive(Clone, Debug)]
pub struct GradientField {
    cols: usize,
    rows: usize,
    values: Vec<f64>,
}

impl GradientField {
    /// Computes the gradient inside `cols` × `rows`, clipped to the plane.
    /// The field is one column narrower than the rectangle.
    pub fn horizontal(plane: &GrayPlane, cols: Range<u32>, rows: Range<u32>) -> Self {
        let cols = clip(cols, plane.width());
        let rows = clip(rows, plane.height());
        let width = cols.len().saturating_sub(1);
        let mut values = Vec::with_capacity(width * rows.len());
        for y in rows.clone() {
            let row = &plane.row(y)[cols.start as usize..cols.end as usize];
            values.extend(row.windows(2).map(|w| (w[1] - w[0]).abs()));
        }
        Self {
            cols: width,
            rows: rows.len(),
            values,
        }
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    /// Sum of gradient magnitudes per column.
    pub fn column_sums(&self) -> Vec<f64> {
        let mut sums = vec![0.0; self.cols];
        for row in self.values.chunks(self.cols.max(1)) {
            for (x, v) in row.iter().enumerate() {
                sums[x] += v;
            }
        }
        sums
    }

    /// Gradient values of one column, top to bottom.
    pub fn column(&self, x: usize) -> Vec<f64> {
        (0..self.rows)
            .map(|y| self.values[y * self.cols + x])
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::RgbaImage;

    fn solid(width: u32, height: u32, value: u8) -> RgbaImage {
        ImageBuffer::from_pixel(width, height, Rgba([value, value, value, 255]))
    }

    #[test]
    fn test_images_similar_reflexive() {
        let img = ImageBuffer::from_fn(40, 30, |x, y| {
            Rgba([(x * 5) as u8, (y * 7) as u8, ((x + y) * 3) as u8, 255])
        });
        assert!(images_similar(&img, &img, 0.99));
    }

    #[test]
    fn test_images_similar_rejects_size_change() {
        let a = solid(40, 30, 255);
        let b = solid(40, 31, 255);
        assert!(!images_similar(&a, &b, 0.0));
    }

    #[test]
    fn test_images_similar_detects_change() {
        let a = solid(20, 20, 255);
        let mut b = a.clone();
        // Darken the top half: mean diff = 127.5 / 255 = 0.5
        for y in 0..10 {
            for x in 0..20 {
                b.put_pixel(x, y, Rgba([0, 0, 0, 255]));
            }
        }
        assert!(!images_similar(&a, &b, 0.99));
        assert!(images_similar(&a, &b, 0.4));
    }

    #[test]
    fn test_images_similar_ignores_alpha() {
        let a = solid(10, 10, 128);
        let b = ImageBuffer::from_pixel(10, 10, Rgba([128, 128, 128, 0]));
        assert!(images_similar(&a, &b, 0.99));
    }

    #[test]
    fn test_max_consecutive_run() {
        assert_eq!(max_consecutive_run(&[false; 12]), 0);
        assert_eq!(max_consecutive_run(&[true; 12]), 12);
        assert_eq!(max_consecutive_run(&[]), 0);
        assert_eq!(
            max_consecutive_run(&[true, true, false, true, true, true, false, true]),
            3
        );
    }

    #[test]
    fn test_row_content_mask() {
        // Rows 0-9 white, rows 10-19 striped black/white, rows 20-29 uniform gray
        let img = ImageBuffer::from_fn(20, 30, |x, y| {
            let v = match y {
                0..=9 => 255,
                10..=19 => {
                    if x % 2 == 0 {
                        0
                    } else {
                        255
                    }
                }
                _ => 128,
            };
            Rgba([v, v, v, 255])
        });
        let mask = row_content_mask(&img);
        assert_eq!(mask.len(), 30);
        assert!(mask[..10].iter().all(|&m| !m));
        assert!(mask[10..20].iter().all(|&m| m));
        assert!(mask[20..].iter().all(|&m| !m));
    }

    #[test]
    fn test_column_variance_separates_margins() {
        // Uniform black margins left and right, noisy content in the middle
        let img = ImageBuffer::from_fn(100, 40, |x, y| {
            let v = if (30..70).contains(&x) {
                if (x + y) % 2 == 0 { 0 } else { 255 }
            } else {
                0
            };
            Rgba([v, v, v, 255])
        });
        let plane = GrayPlane::from_rgba(&img);
        let variance = column_variance(&plane, 10..30);
        assert_eq!(variance.len(), 100);
        assert!(variance[5] < 1e-6);
        assert!(variance[95] < 1e-6);
        assert!(variance[50] > 1000.0);
        // Window reaches two columns into the content
        assert!(variance[28] > 1.0);
        assert!(variance[27] < 1e-6);
    }

    #[test]
    fn test_row_variance_transposed() {
        let img = ImageBuffer::from_fn(40, 100, |x, y| {
            let v = if (20..60).contains(&y) && x % 2 == 0 { 0 } else { 255 };
            Rgba([v, v, v, 255])
        });
        let plane = GrayPlane::from_rgba(&img);
        let variance = row_variance(&plane, 0..40);
        assert!(variance[5] < 1e-6);
        assert!(variance[40] > 1000.0);
        assert!(variance[90] < 1e-6);
    }

    #[test]
    fn test_gradient_field_finds_edge() {
        // Vertical edge between x=9 and x=10
        let img = ImageBuffer::from_fn(20, 10, |x, _| {
            let v = if x < 10 { 0 } else { 200 };
            Rgba([v, v, v, 255])
        });
        let plane = GrayPlane::from_rgba(&img);
        let field = GradientField::horizontal(&plane, 0..20, 0..10);
        assert_eq!(field.cols(), 19);
        assert_eq!(field.rows(), 10);
        let sums = field.column_sums();
        let (peak, _) = sums
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.partial_cmp(b.1).unwrap())
            .unwrap();
        assert_eq!(peak, 9);
        assert!(field.column(9).iter().all(|&v| (v - 200.0).abs() < 1.0));
    }

    #[test]
    fn test_mean_of_clips_to_plane() {
        let plane = GrayPlane::from_rgba(&solid(10, 10, 100));
        assert!((plane.mean_of(5..50, 5..50) - 100.0).abs() < 1e-9);
        assert_eq!(plane.mean_of(20..30, 0..5), 0.0);
    }
}
