//! Visual regression testing with screenshot comparison
//!
//! Screenshots live under one root as `baseline/<name>.png`,
//! `actual/<name>.png` and `diff/<name>.png`. `actual` and `diff` are only
//! written when a comparison fails.

use std::path::{Path, PathBuf};
use std::str::FromStr;

use image::{DynamicImage, Rgb, RgbImage};
use image_compare::Algorithm;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, error, info, warn};

use crate::driver::{Locator, PageDriver};
use crate::error::{ReplayError, ReplayResult};

/// How two screenshots are compared
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CompareMethod {
    /// Fraction of differing pixels must stay at or below the threshold
    #[default]
    Pixel,
    /// Mean SSIM must stay at or above `1 - threshold`
    Ssim,
}

/// What to do with the baseline
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BaselineMode {
    /// Compare; a missing baseline is a failure
    #[default]
    Compare,
    /// Create missing baselines, compare existing ones
    Update,
    /// Always overwrite the baseline
    Refresh,
}

impl FromStr for BaselineMode {
    type Err = ReplayError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "" | "compare" => Ok(BaselineMode::Compare),
            "update" => Ok(BaselineMode::Update),
            "refresh" => Ok(BaselineMode::Refresh),
            other => Err(ReplayError::Config(format!("unknown visual mode: {}", other))),
        }
    }
}

/// Configuration for visual testing
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VisualConfig {
    pub root_dir: PathBuf,
    pub threshold: f64,
    pub method: CompareMethod,
    pub mode: BaselineMode,
    /// Raise on mismatch instead of returning `false`
    pub strict: bool,
}

impl Default for VisualConfig {
    fn default() -> Self {
        Self {
            root_dir: PathBuf::from("artifacts/visual"),
            threshold: 0.01,
            method: CompareMethod::Pixel,
            mode: BaselineMode::Compare,
            strict: true,
        }
    }
}

/// Result of a visual comparison
#[derive(Debug, Clone)]
pub struct VisualDiff {
    pub matches: bool,

    /// Differing pixel ratio for `pixel`, mean SSIM for `ssim`
    pub metric: f64,

    pub diff_image_path: Option<PathBuf>,

    pub actual_hash: String,

    pub baseline_hash: String,
}

/// Visual regression testing utilities
pub struct VisualTester {
    config: VisualConfig,
}

struct ShotPaths {
    baseline: PathBuf,
    actual: PathBuf,
    diff: PathBuf,
}

impl VisualTester {
    pub fn new(config: VisualConfig) -> ReplayResult<Self> {
        for dir in ["baseline", "actual", "diff"] {
            std::fs::create_dir_all(config.root_dir.join(dir))?;
        }
        Ok(Self { config })
    }

    pub fn config(&self) -> &VisualConfig {
        &self.config
    }

    fn paths(&self, name: &str) -> ShotPaths {
        let file = format!("{}.png", name);
        ShotPaths {
            baseline: self.config.root_dir.join("baseline").join(&file),
            actual: self.config.root_dir.join("actual").join(&file),
            diff: self.config.root_dir.join("diff").join(&file),
        }
    }

    /// Grab a screenshot through `driver` and check it against the baseline.
    pub async fn capture(
        &self,
        driver: &dyn PageDriver,
        name: &str,
        locator: Option<&Locator>,
    ) -> ReplayResult<bool> {
        let png = driver.screenshot_png(locator).await?;
        self.assert_screenshot(name, &png)
    }

    /// Compare `png` against the baseline called `name`.
    ///
    /// Returns `Ok(false)` on mismatch when `strict` is off; otherwise a
    /// mismatch is an error.
    pub fn assert_screenshot(&self, name: &str, png: &[u8]) -> ReplayResult<bool> {
        let paths = self.paths(name);
        let current = image::load_from_memory(png)?.to_rgb8();
        let mode = self.config.mode;

        if !paths.baseline.exists() || mode == BaselineMode::Refresh {
            if mode != BaselineMode::Compare {
                let existed = paths.baseline.exists();
                current.save(&paths.baseline)?;
                info!(
                    "Baseline {}: {}",
                    if existed { "refreshed" } else { "created" },
                    paths.baseline.display()
                );
                return Ok(true);
            }

            let msg = format!("'{}'. Run with visual mode update/refresh to create.", name);
            error!("Baseline not found for {}", msg);
            if self.config.strict {
                return Err(ReplayError::BaselineNotFound(msg));
            }
            return Ok(false);
        }

        let diff = self.compare(name, &current, &paths)?;
        if diff.matches {
            return Ok(true);
        }

        let msg = format!(
            "'{}': {} baseline={}, actual={}, diff={}",
            name,
            self.describe(diff.metric),
            paths.baseline.display(),
            paths.actual.display(),
            paths.diff.display()
        );
        warn!("Visual mismatch for {}", msg);
        if self.config.strict {
            return Err(ReplayError::VisualMismatch(msg));
        }
        Ok(false)
    }

    fn compare(&self, name: &str, current: &RgbImage, paths: &ShotPaths) -> ReplayResult<VisualDiff> {
        let baseline = image::open(&paths.baseline)?.to_rgb8();
        let actual_hash = hash_pixels(current);
        let baseline_hash = hash_pixels(&baseline);

        if actual_hash == baseline_hash {
            debug!("Screenshots match exactly (same hash)");
            return Ok(VisualDiff {
                matches: true,
                metric: self.perfect_metric(),
                diff_image_path: None,
                actual_hash,
                baseline_hash,
            });
        }

        if current.dimensions() != baseline.dimensions() {
            warn!(
                "Screenshot dimensions differ: actual {:?} vs baseline {:?}",
                current.dimensions(),
                baseline.dimensions()
            );
            current.save(&paths.actual)?;
            return Ok(VisualDiff {
                matches: false,
                metric: self.worst_metric(),
                diff_image_path: None,
                actual_hash,
                baseline_hash,
            });
        }

        let (metric, matches) = match self.config.method {
            CompareMethod::Pixel => {
                let (ratio, diff_img) = pixel_diff(&baseline, current);
                let matches = ratio <= self.config.threshold;
                if !matches {
                    diff_img.save(&paths.diff)?;
                }
                (ratio, matches)
            }
            CompareMethod::Ssim => {
                let (score, heatmap) = ssim(&baseline, current)?;
                let matches = score >= 1.0 - self.config.threshold;
                if !matches {
                    heatmap.save(&paths.diff)?;
                }
                (score, matches)
            }
        };

        if matches {
            info!("Screenshot ok: {} ({})", name, self.describe(metric));
            return Ok(VisualDiff {
                matches,
                metric,
                diff_image_path: None,
                actual_hash,
                baseline_hash,
            });
        }

        current.save(&paths.actual)?;
        Ok(VisualDiff {
            matches,
            metric,
            diff_image_path: Some(paths.diff.clone()),
            actual_hash,
            baseline_hash,
        })
    }

    fn describe(&self, metric: f64) -> String {
        match self.config.method {
            CompareMethod::Pixel => format!("diff_ratio={:.4} (threshold {})", metric, self.config.threshold),
            CompareMethod::Ssim => format!("ssim={:.4} (min {:.4})", metric, 1.0 - self.config.threshold),
        }
    }

    fn perfect_metric(&self) -> f64 {
        match self.config.method {
            CompareMethod::Pixel => 0.0,
            CompareMethod::Ssim => 1.0,
        }
    }

    fn worst_metric(&self) -> f64 {
        match self.config.method {
            CompareMethod::Pixel => 1.0,
            CompareMethod::Ssim => 0.0,
        }
    }

    /// List all baselines
    pub fn list_baselines(&self) -> ReplayResult<Vec<String>> {
        let mut baselines = Vec::new();

        for entry in std::fs::read_dir(self.config.root_dir.join("baseline"))? {
            let path = entry?.path();
            if path.extension().map(|e| e == "png").unwrap_or(false) {
                if let Some(name) = path.file_stem() {
                    baselines.push(name.to_string_lossy().to_string());
                }
            }
        }

        baselines.sort();
        Ok(baselines)
    }

    /// Remove stale `actual` and `diff` images
    pub fn clean_failures(&self) -> ReplayResult<()> {
        for dir in ["actual", "diff"] {
            clean_dir(&self.config.root_dir.join(dir))?;
        }
        Ok(())
    }
}

fn clean_dir(dir: &Path) -> ReplayResult<()> {
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_file() {
            std::fs::remove_file(path)?;
        }
    }
    Ok(())
}

fn hash_pixels(img: &RgbImage) -> String {
    let mut hasher = Sha256::new();
    hasher.update(img.width().to_le_bytes());
    hasher.update(img.height().to_le_bytes());
    hasher.update(img.as_raw());
    hex::encode(hasher.finalize())
}

/// Ratio of pixels with any channel difference, and the baseline with the
/// differing pixels painted red. Both images must have the same size.
pub fn pixel_diff(baseline: &RgbImage, current: &RgbImage) -> (f64, RgbImage) {
    let mut diff_img = baseline.clone();
    let mut diff_pixels = 0u64;

    for (x, y, pixel) in current.enumerate_pixels() {
        if baseline.get_pixel(x, y) != pixel {
            diff_pixels += 1;
            diff_img.put_pixel(x, y, Rgb([255, 0, 0]));
        }
    }

    let total = (baseline.width() as u64) * (baseline.height() as u64);
    if total == 0 {
        return (0.0, diff_img);
    }
    (diff_pixels as f64 / total as f64, diff_img)
}

/// Mean SSIM of the grayscale images, plus the per-pixel similarity map
/// rendered as a color heatmap. Both images must have the same size.
pub fn ssim(baseline: &RgbImage, current: &RgbImage) -> ReplayResult<(f64, DynamicImage)> {
    let a = image::imageops::grayscale(baseline);
    let b = image::imageops::grayscale(current);

    let result = image_compare::gray_similarity_structure(&Algorithm::MSSIMSimple, &a, &b)
        .map_err(|e| ReplayError::VisualCompare(format!("{:?}", e)))?;
    Ok((result.score, result.image.to_color_map()))
}
