use crate::Template;
use image::GrayImage;

/// Correlation score for every placement of a template inside a region crop
#[derive(Debug, Clone)]
pub struct ScoreMap {
    width: u32,
    height: u32,
    scores: Vec<f32>,
}

impl ScoreMap {
    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn get(&self, x: u32, y: u32) -> f32 {
        self.scores[(y * self.width + x) as usize]
    }

    /// Best score, skipping undefined (NaN) cells. A map with no defined
    /// cell scores -1.
    pub fn max(&self) -> f32 {
        nan_max(&self.scores).unwrap_or(-1.0)
    }

    /// Number of separate 8-connected blobs of cells scoring above `threshold`.
    ///
    /// One icon lights up a small cluster of neighboring placements, so each
    /// blob counts as one match.
    pub fn count_above(&self, threshold: f32) -> usize {
        let (w, h) = (self.width as usize, self.height as usize);
        let hot: Vec<bool> = self.scores.iter().map(|&s| s > threshold).collect();
        let mut seen = vec![false; hot.len()];
        let mut stack = Vec::new();
        let mut blobs = 0;

        for start in 0..hot.len() {
            if !hot[start] || seen[start] {
                continue;
            }
            blobs += 1;
            seen[start] = true;
            stack.push(start);

            while let Some(i) = stack.pop() {
                let (x, y) = ((i % w) as i64, (i / w) as i64);
                for dy in -1..=1 {
                    for dx in -1..=1 {
                        let (nx, ny) = (x + dx, y + dy);
                        if nx < 0 || ny < 0 || nx >= w as i64 || ny >= h as i64 {
                            continue;
                        }
                        let j = ny as usize * w + nx as usize;
                        if hot[j] && !seen[j] {
                            seen[j] = true;
                            stack.push(j);
                        }
                    }
                }
            }
        }

        blobs
    }
}

/// Maximum that ignores NaN; `None` if every value is NaN (or there are none)
pub fn nan_max(values: &[f32]) -> Option<f32> {
    values
        .iter()
        .copied()
        .filter(|v| !v.is_nan())
        .fold(None, |best, v| Some(best.map_or(v, |b: f32| b.max(v))))
}

/// Zero-mean normalized cross-correlation of `template` slid across `image`.
///
/// Scores lie in [-1, 1]. Unmasked placements over a flat patch score 0.
/// Masked placements over a patch that is flat under the mask are undefined
/// and come out as NaN.
///
/// `image` must be at least as large as the template in both dimensions.
pub fn score_map(image: &GrayImage, template: &Template) -> ScoreMap {
    let (iw, ih) = image.dimensions();
    let (tw, th) = (template.width(), template.height());
    debug_assert!(iw >= tw && ih >= th);

    let width = iw - tw + 1;
    let height = ih - th + 1;
    let mut scores = Vec::with_capacity((width * height) as usize);

    match template.mask() {
        None => {
            let sums = IntegralImage::new(image);
            let n = (tw * th) as f64;
            for y in 0..height {
                for x in 0..width {
                    let (s1, s2) = sums.window(x, y, tw, th);
                    let window_energy = s2 - s1 * s1 / n;
                    let denom = (window_energy * template.energy()).sqrt();
                    if denom < 1e-10 {
                        scores.push(0.0);
                        continue;
                    }
                    let cross = cross_sum(image, template, x, y);
                    scores.push((cross / denom) as f32);
                }
            }
        }
        Some(mask) => {
            let n = template.active() as f64;
            for y in 0..height {
                for x in 0..width {
                    let mut s1 = 0.0;
                    let mut s2 = 0.0;
                    let mut cross = 0.0;
                    for ty in 0..th {
                        for tx in 0..tw {
                            let i = (ty * tw + tx) as usize;
                            if !mask[i] {
                                continue;
                            }
                            let p = image.get_pixel(x + tx, y + ty)[0] as f64;
                            s1 += p;
                            s2 += p * p;
                            cross += p * template.centered()[i];
                        }
                    }
                    let window_energy = s2 - s1 * s1 / n;
                    let denom = (window_energy * template.energy()).sqrt();
                    scores.push(if denom < 1e-10 {
                        f32::NAN
                    } else {
                        (cross / denom) as f32
                    });
                }
            }
        }
    }

    ScoreMap {
        width,
        height,
        scores,
    }
}

/// Sum of image pixels times the centered template at one placement.
/// The centered template sums to zero, so the window mean drops out.
fn cross_sum(image: &GrayImage, template: &Template, x: u32, y: u32) -> f64 {
    let tw = template.width();
    let centered = template.centered();
    let mut cross = 0.0;
    for ty in 0..template.height() {
        for tx in 0..tw {
            let p = image.get_pixel(x + tx, y + ty)[0] as f64;
            cross += p * centered[(ty * tw + tx) as usize];
        }
    }
    cross
}

/// Summed-area tables of pixel values and squared pixel values
struct IntegralImage {
    stride: usize,
    sum: Vec<f64>,
    sum_sq: Vec<f64>,
}

impl IntegralImage {
    fn new(image: &GrayImage) -> Self {
        let (w, h) = (image.width() as usize, image.height() as usize);
        let stride = w + 1;
        let mut sum = vec![0.0; stride * (h + 1)];
        let mut sum_sq = vec![0.0; stride * (h + 1)];
        for y in 0..h {
            let mut row = 0.0;
            let mut row_sq = 0.0;
            for x in 0..w {
                let p = image.get_pixel(x as u32, y as u32)[0] as f64;
                row += p;
                row_sq += p * p;
                let i = (y + 1) * stride + x + 1;
                sum[i] = sum[i - stride] + row;
                sum_sq[i] = sum_sq[i - stride] + row_sq;
            }
        }
        Self {
            stride,
            sum,
            sum_sq,
        }
    }

    /// (sum, sum of squares) over the w×h window at (x, y)
    fn window(&self, x: u32, y: u32, w: u32, h: u32) -> (f64, f64) {
        let (x0, y0) = (x as usize, y as usize);
        let (x1, y1) = (x0 + w as usize, y0 + h as usize);
        let at = |t: &[f64], x: usize, y: usize| t[y * self.stride + x];
        let area = |t: &[f64]| at(t, x1, y1) - at(t, x0, y1) - at(t, x1, y0) + at(t, x0, y0);
        (area(&self.sum), area(&self.sum_sq))
    }
}
