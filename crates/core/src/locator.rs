//! Finds a reference image on a device screenshot.
//!
//! Scoring is the colour correlation coefficient: each channel is
//! mean-subtracted, cross terms and energies are summed over the three
//! channels and the score is formed once from the totals. Window energies
//! come from integral images; the cross term for every window comes from
//! one frequency-domain product per channel, so a full phone screen is
//! searched in a fraction of a second.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use image::{DynamicImage, RgbImage};
use rustfft::num_complex::Complex;
use rustfft::{Fft, FftDirection, FftPlanner};

use crate::error::{ImageSource, LocateError};
use crate::platform::DeviceGateway;
use crate::types::{DeviceId, ScreenPoint, Threshold};

const CHANNELS: usize = 3;

/// Scores closer than this count as equal, so the earlier window keeps the lead.
const TIE_TOLERANCE: f64 = 1e-9;

/// Result of a locate attempt that produced an answer.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Located {
    Found { point: ScreenPoint, score: f64 },
    NotFound { best_score: Option<f64> },
}

/// Highest-scoring window of a template over a screen.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BestMatch {
    pub top_left: (u32, u32),
    pub score: f64,
}

pub fn decode(bytes: &[u8], source_kind: ImageSource) -> Result<DynamicImage, LocateError> {
    image::load_from_memory(bytes).map_err(|source| LocateError::Decode { source_kind, source })
}

/// Center of a `w` x `h` window whose top-left corner is `top_left`.
pub fn center_of(top_left: (u32, u32), w: u32, h: u32) -> ScreenPoint {
    ScreenPoint::new(top_left.0 + w / 2, top_left.1 + h / 2)
}

/// Turn the best window into a verdict against `threshold`.
pub fn judge(best: BestMatch, template: (u32, u32), threshold: Threshold) -> Located {
    if threshold.accepts(best.score) {
        Located::Found {
            point: center_of(best.top_left, template.0, template.1),
            score: best.score,
        }
    } else {
        Located::NotFound { best_score: Some(best.score) }
    }
}

pub fn locate(screen: &RgbImage, reference: &RgbImage, threshold: Threshold) -> Result<Located, LocateError> {
    let best = best_match(screen, reference)?;
    Ok(match best {
        Some(best) => judge(best, reference.dimensions(), threshold),
        None => Located::NotFound { best_score: None },
    })
}

/// Best correlation-coefficient window, or `None` for an empty template.
/// The first maximum in row-major order wins ties. Flat windows score 0.
pub fn best_match(screen: &RgbImage, template: &RgbImage) -> Result<Option<BestMatch>, LocateError> {
    let (sw, sh) = screen.dimensions();
    let (tw, th) = template.dimensions();
    if tw == 0 || th == 0 {
        return Ok(None);
    }
    if tw > sw || th > sh {
        return Err(LocateError::TemplateTooLarge { template: (tw, th), screen: (sw, sh) });
    }

    let out_w = (sw - tw + 1) as usize;
    let out_h = (sh - th + 1) as usize;
    let (means, t_energy) = channel_stats(template);
    if t_energy == 0.0 {
        return Ok(Some(BestMatch { top_left: (0, 0), score: 0.0 }));
    }

    let energies = window_energies(screen, tw as usize, th as usize);
    let cross = cross_correlation(screen, template, means, out_w, out_h);

    let mut best: Option<BestMatch> = None;
    for y in 0..out_h {
        for x in 0..out_w {
            let i = y * out_w + x;
            let score = match energies[i] {
                e if e > 0.0 => (cross[i] / (t_energy * e).sqrt()).clamp(-1.0, 1.0),
                _ => 0.0,
            };
            if best.map_or(true, |b| score > b.score + TIE_TOLERANCE) {
                best = Some(BestMatch { top_left: (x as u32, y as u32), score });
            }
        }
    }
    Ok(best)
}

/// Per-channel means and the mean-subtracted energy summed over channels.
fn channel_stats(img: &RgbImage) -> ([f64; CHANNELS], f64) {
    let n = img.width() as u128 * img.height() as u128;
    let mut sum = [0u128; CHANNELS];
    let mut sq = [0u128; CHANNELS];
    for px in img.pixels() {
        for c in 0..CHANNELS {
            let v = px[c] as u128;
            sum[c] += v;
            sq[c] += v * v;
        }
    }
    let mut means = [0.0; CHANNELS];
    let mut energy = 0.0;
    for c in 0..CHANNELS {
        means[c] = sum[c] as f64 / n as f64;
        energy += centered_energy(n, sum[c], sq[c]);
    }
    (means, energy)
}

/// `sq - sum^2 / n`, exact zero for a flat channel. `n * sq >= sum^2` always.
fn centered_energy(n: u128, sum: u128, sq: u128) -> f64 {
    (n * sq - sum * sum) as f64 / n as f64
}

/// Mean-subtracted energy of every `tw` x `th` window, summed over channels,
/// in row-major order of window positions.
fn window_energies(screen: &RgbImage, tw: usize, th: usize) -> Vec<f64> {
    let (sw, sh) = (screen.width() as usize, screen.height() as usize);
    let (out_w, out_h) = (sw - tw + 1, sh - th + 1);
    let n = (tw * th) as u128;
    let mut table = Integral::new(sw, sh);
    let mut energies = vec![0.0; out_w * out_h];

    for c in 0..CHANNELS {
        table.fill(screen, c);
        for y in 0..out_h {
            for x in 0..out_w {
                let (sum, sq) = table.window(x, y, tw, th);
                energies[y * out_w + x] += centered_energy(n, sum as u128, sq as u128);
            }
        }
    }
    energies
}

/// Summed-area tables for one channel, with a zero row and column in front.
struct Integral {
    stride: usize,
    sum: Vec<u64>,
    sq: Vec<u64>,
}

impl Integral {
    fn new(w: usize, h: usize) -> Self {
        let stride = w + 1;
        Self { stride, sum: vec![0; stride * (h + 1)], sq: vec![0; stride * (h + 1)] }
    }

    fn fill(&mut self, img: &RgbImage, channel: usize) {
        let stride = self.stride;
        for (y, row) in img.rows().enumerate() {
            let mut row_sum = 0u64;
            let mut row_sq = 0u64;
            for (x, px) in row.enumerate() {
                let v = px[channel] as u64;
                row_sum += v;
                row_sq += v * v;
                let i = (y + 1) * stride + x + 1;
                self.sum[i] = self.sum[i - stride] + row_sum;
                self.sq[i] = self.sq[i - stride] + row_sq;
            }
        }
    }

    fn window(&self, x: usize, y: usize, w: usize, h: usize) -> (u64, u64) {
        let s = self.stride;
        let (a, b, c, d) = (y * s + x, y * s + x + w, (y + h) * s + x, (y + h) * s + x + w);
        (
            self.sum[d] + self.sum[a] - self.sum[b] - self.sum[c],
            self.sq[d] + self.sq[a] - self.sq[b] - self.sq[c],
        )
    }
}

/// `sum_c sum_uv t'_c(u, v) * s_c(x + u, y + v)` for every window position,
/// where `t'` is the template minus its channel means. Because `t'` sums to
/// zero per channel this equals the fully mean-subtracted cross term.
fn cross_correlation(
    screen: &RgbImage,
    template: &RgbImage,
    means: [f64; CHANNELS],
    out_w: usize,
    out_h: usize,
) -> Vec<f64> {
    let (sw, sh) = (screen.width() as usize, screen.height() as usize);
    // no wrap-around: x + u stays below sw for every valid window
    let (w, h) = (fast_len(sw), fast_len(sh));
    let mut planner = FftPlanner::new();
    let forward = Plane::new(&mut planner, w, h, FftDirection::Forward);
    let inverse = Plane::new(&mut planner, w, h, FftDirection::Inverse);

    let zero = Complex::new(0.0, 0.0);
    let mut acc = vec![zero; w * h];
    let mut packed = vec![zero; w * h];

    for c in 0..CHANNELS {
        // screen in the real part, centered template in the imaginary part
        packed.fill(zero);
        for (x, y, px) in screen.enumerate_pixels() {
            packed[y as usize * w + x as usize].re = px[c] as f64;
        }
        for (x, y, px) in template.enumerate_pixels() {
            packed[y as usize * w + x as usize].im = px[c] as f64 - means[c];
        }
        forward.rows_then_columns(&mut packed, sh);

        // split the two real spectra and accumulate S * conj(T)
        for ky in 0..h {
            let ny = (h - ky) % h;
            for kx in 0..w {
                let z = packed[ky * w + kx];
                let zn = packed[ny * w + (w - kx) % w].conj();
                let s = (z + zn) * 0.5;
                let t = (z - zn) * Complex::new(0.0, -0.5);
                acc[ky * w + kx] += s * t.conj();
            }
        }
    }

    inverse.columns_then_rows(&mut acc, out_h);
    let scale = 1.0 / (w * h) as f64;
    let mut out = Vec::with_capacity(out_w * out_h);
    for y in 0..out_h {
        out.extend(acc[y * w..y * w + out_w].iter().map(|z| z.re * scale));
    }
    out
}

/// 2-D transform of a row-major `width` x `height` buffer, in place.
struct Plane {
    width: usize,
    height: usize,
    rows: Arc<dyn Fft<f64>>,
    columns: Arc<dyn Fft<f64>>,
}

impl Plane {
    fn new(planner: &mut FftPlanner<f64>, width: usize, height: usize, direction: FftDirection) -> Self {
        Self {
            width,
            height,
            rows: planner.plan_fft(width, direction),
            columns: planner.plan_fft(height, direction),
        }
    }

    /// Only the first `live_rows` rows may be non-zero on input.
    fn rows_then_columns(&self, buf: &mut [Complex<f64>], live_rows: usize) {
        self.rows.process(&mut buf[..live_rows * self.width]);
        self.transform_columns(buf);
    }

    /// Only the first `wanted_rows` rows are valid on output.
    fn columns_then_rows(&self, buf: &mut [Complex<f64>], wanted_rows: usize) {
        self.transform_columns(buf);
        self.rows.process(&mut buf[..wanted_rows * self.width]);
    }

    fn transform_columns(&self, buf: &mut [Complex<f64>]) {
        let w = self.width;
        let mut column = vec![Complex::new(0.0, 0.0); self.height];
        let mut scratch = vec![Complex::new(0.0, 0.0); self.columns.get_inplace_scratch_len()];
        for x in 0..w {
            for (y, v) in column.iter_mut().enumerate() {
                *v = buf[y * w + x];
            }
            self.columns.process_with_scratch(&mut column, &mut scratch);
            for (y, v) in column.iter().enumerate() {
                buf[y * w + x] = *v;
            }
        }
    }
}

/// Smallest length >= `n` with no prime factor above 5.
fn fast_len(n: usize) -> usize {
    (n.max(1)..)
        .find(|&m| {
            let mut m = m;
            for p in [2, 3, 5] {
                while m % p == 0 {
                    m /= p;
                }
            }
            m == 1
        })
        .unwrap_or(n)
}

/// A reference image loaded once and matched against fresh captures.
pub struct TemplateTarget {
    path: PathBuf,
    reference: RgbImage,
    threshold: Threshold,
}

impl TemplateTarget {
    pub fn load(path: &Path, threshold: Threshold) -> Result<Self, LocateError> {
        let bytes = std::fs::read(path).map_err(|source| LocateError::ReadReference {
            path: path.to_path_buf(),
            source,
        })?;
        let reference = decode(&bytes, ImageSource::Reference)?.to_rgb8();
        Ok(Self::from_image(path.to_path_buf(), reference, threshold))
    }

    pub fn from_image(path: PathBuf, reference: RgbImage, threshold: Threshold) -> Self {
        Self { path, reference, threshold }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Capture the device screen and look for the reference on it.
    pub fn acquire(&self, gateway: &dyn DeviceGateway, device: &DeviceId) -> Result<Located, LocateError> {
        let capture = gateway.capture(device)?;
        let screen = decode(&capture.data, ImageSource::Screen)?.to_rgb8();
        let located = locate(&screen, &self.reference, self.threshold)?;
        match located {
            Located::Found { point, score } => {
                log::debug!("found template at {} with confidence {:.2}", point, score);
            }
            Located::NotFound { best_score: Some(score) } => {
                log::debug!(
                    "best match confidence {:.2} is below threshold {:.2}",
                    score,
                    self.threshold.value()
                );
            }
            Located::NotFound { best_score: None } => {}
        }
        Ok(located)
    }
}
