use callsim_core::ReferenceImagesConfig;
use image::{DynamicImage, RgbaImage};
use serde::Serialize;
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::debug;

#[derive(Debug, thiserror::Error)]
pub enum CompareError {
    #[error("Failed to load reference image {path}: {source}")]
    Reference {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },
    #[error("Screenshot could not be decoded: {0}")]
    Decode(#[source] image::ImageError),
    #[error("Screenshot is {actual:?} pixels but the reference is {expected:?}")]
    SizeMismatch {
        expected: (u32, u32),
        actual: (u32, u32),
    },
}

/// What the device did with the incoming call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    Allowed,
    Blocked,
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Verdict::Allowed => "allowed",
            Verdict::Blocked => "blocked",
        })
    }
}

/// A screenshot scored against both reference screens.
///
/// The diffs count pixels that differ from each reference. The closer
/// reference wins; a tie counts as allowed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Classification {
    pub verdict: Verdict,
    pub allowed_diff: u64,
    pub blocked_diff: u64,
}

/// The allowed and blocked reference screens, decoded once per run.
pub struct ReferenceImages {
    allowed: RgbaImage,
    blocked: RgbaImage,
}

impl ReferenceImages {
    pub fn from_images(allowed: DynamicImage, blocked: DynamicImage) -> Self {
        Self {
            allowed: allowed.to_rgba8(),
            blocked: blocked.to_rgba8(),
        }
    }

    pub fn load(config: &ReferenceImagesConfig) -> Result<Self, CompareError> {
        Ok(Self::from_images(
            open_reference(&config.allowed)?,
            open_reference(&config.blocked)?,
        ))
    }

    /// Decode `screenshot` and score it against both references.
    pub fn classify(&self, screenshot: &[u8]) -> Result<Classification, CompareError> {
        let shot = image::load_from_memory(screenshot)
            .map_err(CompareError::Decode)?
            .to_rgba8();

        let allowed_diff = differing_pixels(&shot, &self.allowed)?;
        let blocked_diff = differing_pixels(&shot, &self.blocked)?;
        let verdict = if allowed_diff > blocked_diff {
            Verdict::Blocked
        } else {
            Verdict::Allowed
        };

        debug!(allowed_diff, blocked_diff, verdict = %verdict, "Screenshot classified");
        Ok(Classification {
            verdict,
            allowed_diff,
            blocked_diff,
        })
    }
}

fn open_reference(path: &Path) -> Result<DynamicImage, CompareError> {
    image::open(path).map_err(|source| CompareError::Reference {
        path: path.to_path_buf(),
        source,
    })
}

/// Number of pixels at which `shot` and `reference` differ.
pub fn differing_pixels(shot: &RgbaImage, reference: &RgbaImage) -> Result<u64, CompareError> {
    if shot.dimensions() != reference.dimensions() {
        return Err(CompareError::SizeMismatch {
            expected: reference.dimensions(),
            actual: shot.dimensions(),
        });
    }
    Ok(shot
        .pixels()
        .zip(reference.pixels())
        .filter(|(a, b)| a != b)
        .count() as u64)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use image::{ImageFormat, Rgba};
    use std::io::Cursor;

    pub(crate) const GREEN: Rgba<u8> = Rgba([0, 200, 0, 255]);
    pub(crate) const RED: Rgba<u8> = Rgba([200, 0, 0, 255]);

    /// A 4x4 PNG filled with `fill`, with the top `marked` rows painted `mark`.
    pub(crate) fn png(fill: Rgba<u8>, mark: Rgba<u8>, marked: u32) -> Vec<u8> {
        let img = RgbaImage::from_fn(4, 4, |_, y| if y < marked { mark } else { fill });
        let mut buf = Vec::new();
        DynamicImage::ImageRgba8(img)
            .write_to(&mut Cursor::new(&mut buf), ImageFormat::Png)
            .unwrap();
        buf
    }

    pub(crate) fn references() -> ReferenceImages {
        ReferenceImages::from_images(
            image::load_from_memory(&png(GREEN, GREEN, 0)).unwrap(),
            image::load_from_memory(&png(RED, RED, 0)).unwrap(),
        )
    }

    #[test]
    fn test_closer_reference_wins() {
        let refs = references();

        let shot = refs.classify(&png(GREEN, RED, 1)).unwrap();
        assert_eq!(shot.verdict, Verdict::Allowed);
        assert_eq!(shot.allowed_diff, 4);
        assert_eq!(shot.blocked_diff, 12);

        let shot = refs.classify(&png(GREEN, RED, 3)).unwrap();
        assert_eq!(shot.verdict, Verdict::Blocked);
        assert_eq!(shot.allowed_diff, 12);
        assert_eq!(shot.blocked_diff, 4);
    }

    #[test]
    fn test_tie_counts_as_allowed() {
        let shot = references().classify(&png(GREEN, RED, 2)).unwrap();
        assert_eq!(shot.allowed_diff, shot.blocked_diff);
        assert_eq!(shot.verdict, Verdict::Allowed);
    }

    #[test]
    fn test_size_mismatch() {
        let small = RgbaImage::from_pixel(2, 2, GREEN);
        let err = differing_pixels(&small, &RgbaImage::from_pixel(4, 4, GREEN)).unwrap_err();
        assert!(matches!(
            err,
            CompareError::SizeMismatch { expected: (4, 4), actual: (2, 2) }
        ));
    }

    #[test]
    fn test_undecodable_screenshot() {
        let err = references().classify(b"\x89PNG\r\n\x1a\n").unwrap_err();
        assert!(matches!(err, CompareError::Decode(_)));
    }

    #[test]
    fn test_load_from_files() {
        let dir = tempfile::tempdir().unwrap();
        let allowed = dir.path().join("allowed.png");
        let blocked = dir.path().join("blocked.png");
        std::fs::write(&allowed, png(GREEN, GREEN, 0)).unwrap();
        std::fs::write(&blocked, png(RED, RED, 0)).unwrap();

        let refs = ReferenceImages::load(&ReferenceImagesConfig { allowed, blocked }).unwrap();
        let shot = refs.classify(&png(RED, RED, 0)).unwrap();
        assert_eq!(shot.verdict, Verdict::Blocked);
        assert_eq!(shot.blocked_diff, 0);

        let missing = ReferenceImagesConfig {
            allowed: dir.path().join("nope.png"),
            blocked: dir.path().join("blocked.png"),
        };
        assert!(matches!(
            ReferenceImages::load(&missing),
            Err(CompareError::Reference { .. })
        ));
    }
}
