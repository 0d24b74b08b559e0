//! Face and eye localization with boosted Haar-like cascades

use std::path::Path;

use image::{GrayImage, ImageBuffer, Luma};
use imageproc::integral_image::{integral_image, integral_squared_image};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::cascade_xml;
use crate::config::CascadeParams;
use crate::DmsError;

/// Overlap tolerance used when grouping raw cascade hits
const GROUP_EPS: f64 = 0.2;

/// Axis-aligned bounding box in pixel coordinates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl Rect {
    pub fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self { x, y, width, height }
    }

    pub fn area(&self) -> u64 {
        self.width as u64 * self.height as u64
    }

    pub fn center_x(&self) -> f64 {
        self.x as f64 + self.width as f64 / 2.0
    }

    /// Clip to an image of the given size, `None` if nothing is left
    pub fn clip(&self, width: u32, height: u32) -> Option<Rect> {
        let right = (self.x.saturating_add(self.width)).min(width);
        let bottom = (self.y.saturating_add(self.height)).min(height);
        if self.x >= right || self.y >= bottom {
            return None;
        }
        Some(Rect::new(self.x, self.y, right - self.x, bottom - self.y))
    }

    fn is_similar(&self, other: &Rect, eps: f64) -> bool {
        let delta = eps
            * (self.width.min(other.width) as f64 + self.height.min(other.height) as f64)
            * 0.5;
        let near = |a: u32, b: u32| (a as f64 - b as f64).abs() <= delta;
        near(self.x, other.x)
            && near(self.y, other.y)
            && near(self.x + self.width, other.x + other.width)
            && near(self.y + self.height, other.y + other.height)
    }
}

/// Anything that can find objects (faces, eyes) in a grayscale image.
///
/// Results are ordered most-prominent first.
pub trait ObjectLocator: Send + Sync {
    fn locate(&self, image: &GrayImage) -> Vec<Rect>;
}

/// Rectangle of a Haar-like feature, relative to the detection window
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WeightedRect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
    pub weight: f64,
}

/// Haar-like feature: weighted sum of rectangle intensities
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HaarFeature {
    pub rects: Vec<WeightedRect>,
}

/// Decision stump on one feature
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WeakClassifier {
    /// Index into `HaarCascade::features`
    pub feature: usize,
    /// Compared against the variance-normalized feature value
    pub threshold: f64,
    /// Vote when the feature value is below the threshold
    pub left: f64,
    /// Vote otherwise
    pub right: f64,
}

/// One boosted stage; a window is rejected when its vote sum falls below `threshold`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CascadeStage {
    pub threshold: f64,
    pub weak_classifiers: Vec<WeakClassifier>,
}

/// Trained cascade definition.
///
/// Feature values are `sum(weight * rect_sum) / (area * stddev)`, with area and
/// stddev taken over the window inset by one pixel per scale step (the OpenCV
/// normalization), so thresholds are independent of window scale and lighting.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HaarCascade {
    pub window_width: u32,
    pub window_height: u32,
    pub stages: Vec<CascadeStage>,
    pub features: Vec<HaarFeature>,
}

impl HaarCascade {
    /// Parse and validate a JSON cascade definition
    pub fn from_json_str(json: &str) -> Result<Self, DmsError> {
        let cascade: HaarCascade =
            serde_json::from_str(json).map_err(|e| DmsError::CascadeLoad(e.to_string()))?;
        cascade.validate()?;
        Ok(cascade)
    }

    /// Parse and validate an OpenCV Haar cascade XML file's contents
    pub fn from_opencv_xml_str(xml: &str) -> Result<Self, DmsError> {
        let cascade = cascade_xml::parse(xml)?;
        cascade.validate()?;
        Ok(cascade)
    }

    /// Load a cascade from disk: OpenCV XML for `.xml` files, JSON otherwise
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, DmsError> {
        let path = path.as_ref();
        info!("Loading cascade from {}", path.display());
        let text = std::fs::read_to_string(path)
            .map_err(|e| DmsError::CascadeLoad(format!("{}: {}", path.display(), e)))?;
        let is_xml = path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("xml"));
        if is_xml {
            Self::from_opencv_xml_str(&text)
        } else {
            Self::from_json_str(&text)
        }
    }

    fn validate(&self) -> Result<(), DmsError> {
        if self.window_width == 0 || self.window_height == 0 {
            return Err(DmsError::CascadeLoad("window size must be non-zero".into()));
        }
        if self.stages.is_empty() {
            return Err(DmsError::CascadeLoad("cascade has no stages".into()));
        }
        for stage in &self.stages {
            for weak in &stage.weak_classifiers {
                if weak.feature >= self.features.len() {
                    return Err(DmsError::CascadeLoad(format!(
                        "weak classifier references missing feature {}",
                        weak.feature
                    )));
                }
            }
        }
        for feature in &self.features {
            for r in &feature.rects {
                if r.x + r.width > self.window_width || r.y + r.height > self.window_height {
                    return Err(DmsError::CascadeLoad(
                        "feature rectangle exceeds detection window".into(),
                    ));
                }
            }
        }
        Ok(())
    }

    /// Run every stage on one window
    fn accepts(&self, integrals: &Integrals, window: Rect, scale: f64) -> bool {
        let norm_rect = inset(window, (scale.round() as u32).max(1));
        let area = norm_rect.area() as f64;
        let sum = integrals.sum(norm_rect) as f64;
        let sq_sum = integrals.squared_sum(norm_rect) as f64;
        let mean = sum / area;
        let std_dev = (sq_sum / area - mean * mean).max(0.0).sqrt().max(1.0);
        let norm = area * std_dev;

        for stage in &self.stages {
            let mut votes = 0.0;
            for weak in &stage.weak_classifiers {
                let value = self.features[weak.feature]
                    .rects
                    .iter()
                    .filter_map(|r| scale_rect(r, window, scale).map(|rect| r.weight * integrals.sum(rect) as f64))
                    .sum::<f64>()
                    / norm;
                votes += if value < weak.threshold { weak.left } else { weak.right };
            }
            if votes < stage.threshold {
                return false;
            }
        }
        true
    }
}

/// Shrink by `border` on every side; windows too small to shrink stay as they are
fn inset(window: Rect, border: u32) -> Rect {
    if window.width > 2 * border && window.height > 2 * border {
        Rect::new(
            window.x + border,
            window.y + border,
            window.width - 2 * border,
            window.height - 2 * border,
        )
    } else {
        window
    }
}

fn scale_rect(r: &WeightedRect, window: Rect, scale: f64) -> Option<Rect> {
    let x = window.x + (r.x as f64 * scale).round() as u32;
    let y = window.y + (r.y as f64 * scale).round() as u32;
    let width = ((r.width as f64 * scale).round() as u32).min((window.x + window.width).saturating_sub(x));
    let height = ((r.height as f64 * scale).round() as u32).min((window.y + window.height).saturating_sub(y));
    (width > 0 && height > 0).then(|| Rect::new(x, y, width, height))
}

type IntegralImage = ImageBuffer<Luma<u64>, Vec<u64>>;

/// Plain and squared integral images of one grayscale frame
struct Integrals {
    plain: IntegralImage,
    squared: IntegralImage,
}

impl Integrals {
    fn new(image: &GrayImage) -> Self {
        Self {
            plain: integral_image::<_, u64>(image),
            squared: integral_squared_image::<_, u64>(image),
        }
    }

    fn sum(&self, rect: Rect) -> u64 {
        Self::region(&self.plain, rect)
    }

    fn squared_sum(&self, rect: Rect) -> u64 {
        Self::region(&self.squared, rect)
    }

    // Integral images carry a leading zero row and column.
    fn region(integral: &IntegralImage, rect: Rect) -> u64 {
        let (x0, y0) = (rect.x, rect.y);
        let (x1, y1) = (rect.x + rect.width, rect.y + rect.height);
        let at = |x, y| integral.get_pixel(x, y)[0];
        (at(x1, y1) + at(x0, y0)) - (at(x0, y1) + at(x1, y0))
    }
}

/// Multi-scale sliding-window search with a `HaarCascade`
pub struct CascadeLocator {
    cascade: HaarCascade,
    params: CascadeParams,
}

impl CascadeLocator {
    pub fn new(cascade: HaarCascade, params: CascadeParams) -> Result<Self, DmsError> {
        if params.scale_factor <= 1.0 {
            return Err(DmsError::Config(format!(
                "cascade scale_factor must be > 1.0, got {}",
                params.scale_factor
            )));
        }
        Ok(Self { cascade, params })
    }

    /// Load the cascade named by `params.path`.
    ///
    /// `None` when no path is configured or the file does not exist; a file
    /// that exists but does not parse is an error.
    pub fn from_params(params: &CascadeParams) -> Result<Option<Self>, DmsError> {
        let Some(path) = &params.path else {
            return Ok(None);
        };
        if !Path::new(path).exists() {
            warn!("Cascade file {} not found", path);
            return Ok(None);
        }
        let cascade = HaarCascade::from_file(path)?;
        Self::new(cascade, params.clone()).map(Some)
    }
}

impl ObjectLocator for CascadeLocator {
    fn locate(&self, image: &GrayImage) -> Vec<Rect> {
        let (width, height) = image.dimensions();
        if width == 0 || height == 0 {
            return Vec::new();
        }

        let integrals = Integrals::new(image);
        let mut hits = Vec::new();
        let mut scale = 1.0_f64;

        loop {
            let win_w = (self.cascade.window_width as f64 * scale).round() as u32;
            let win_h = (self.cascade.window_height as f64 * scale).round() as u32;
            if win_w > width || win_h > height {
                break;
            }

            if win_w >= self.params.min_size && win_h >= self.params.min_size {
                let step = (scale.floor() as usize).max(1);
                for y in (0..=height - win_h).step_by(step) {
                    for x in (0..=width - win_w).step_by(step) {
                        let window = Rect::new(x, y, win_w, win_h);
                        if self.cascade.accepts(&integrals, window, scale) {
                            hits.push(window);
                        }
                    }
                }
            }

            scale *= self.params.scale_factor;
        }

        let grouped = group_rectangles(&hits, self.params.min_neighbors, GROUP_EPS);
        debug!("Cascade search: {} raw hits, {} grouped", hits.len(), grouped.len());
        grouped
    }
}

/// Cluster overlapping hits, average each cluster, and keep clusters with
/// more than `min_neighbors` members. Largest boxes first.
pub fn group_rectangles(rects: &[Rect], min_neighbors: usize, eps: f64) -> Vec<Rect> {
    let mut parent: Vec<usize> = (0..rects.len()).collect();

    fn find(parent: &mut [usize], mut i: usize) -> usize {
        while parent[i] != i {
            parent[i] = parent[parent[i]];
            i = parent[i];
        }
        i
    }

    for i in 0..rects.len() {
        for j in (i + 1)..rects.len() {
            if rects[i].is_similar(&rects[j], eps) {
                let (a, b) = (find(&mut parent, i), find(&mut parent, j));
                if a != b {
                    parent[b] = a;
                }
            }
        }
    }

    // root -> (count, sum x, sum y, sum w, sum h)
    let mut clusters: Vec<(usize, [u64; 5])> = Vec::new();
    for i in 0..rects.len() {
        let root = find(&mut parent, i);
        let r = &rects[i];
        let slot = match clusters.iter().position(|(k, _)| *k == root) {
            Some(pos) => pos,
            None => {
                clusters.push((root, [0; 5]));
                clusters.len() - 1
            }
        };
        let acc = &mut clusters[slot].1;
        acc[0] += 1;
        acc[1] += r.x as u64;
        acc[2] += r.y as u64;
        acc[3] += r.width as u64;
        acc[4] += r.height as u64;
    }

    let mut grouped: Vec<(u64, Rect)> = clusters
        .into_iter()
        .filter(|(_, acc)| acc[0] as usize > min_neighbors)
        .map(|(_, acc)| {
            let n = acc[0];
            let avg = |total: u64| ((total as f64) / (n as f64)).round() as u32;
            (n, Rect::new(avg(acc[1]), avg(acc[2]), avg(acc[3]), avg(acc[4])))
        })
        .collect();

    grouped.sort_by(|(na, a), (nb, b)| b.area().cmp(&a.area()).then(nb.cmp(na)));
    grouped.into_iter().map(|(_, r)| r).collect()
}
