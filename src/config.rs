//! Camera configuration types and range validation.

use crate::error::{FailureKind, Result};
use std::ops::RangeInclusive;

/// Pixel formats the binding understands.
///
/// Only the byte-size accounting matters here; conversion between formats
/// is a consumer concern.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelFormat {
    /// 8-bit monochrome.
    Mono8,
    /// 24-bit packed BGR.
    Bgr8,
    /// 32-bit packed RGBA.
    Rgba8,
}

impl PixelFormat {
    /// Bytes occupied by one pixel in this format.
    #[must_use]
    pub const fn bytes_per_pixel(self) -> u32 {
        match self {
            Self::Mono8 => 1,
            Self::Bgr8 => 3,
            Self::Rgba8 => 4,
        }
    }
}

/// Region of interest on the sensor, in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Roi {
    /// Horizontal offset of the left edge.
    pub x: u32,
    /// Vertical offset of the top edge.
    pub y: u32,
    /// Width of the region.
    pub width: u32,
    /// Height of the region.
    pub height: u32,
}

impl Roi {
    /// Create a region anchored at the sensor origin.
    #[must_use]
    pub const fn full(width: u32, height: u32) -> Self {
        Self { x: 0, y: 0, width, height }
    }
}

/// Capability ranges reported by the camera.
///
/// Fetched from the adapter once per session and used to validate every
/// configuration before it is applied to the driver.
#[derive(Debug, Clone)]
pub struct SensorLimits {
    /// Accepted exposure times in milliseconds.
    pub exposure_ms: RangeInclusive<f64>,
    /// Accepted master gain values.
    pub master_gain: RangeInclusive<u32>,
    /// Accepted pixel clock frequencies in MHz.
    pub pixel_clock_mhz: RangeInclusive<u32>,
    /// Full sensor width in pixels.
    pub max_width: u32,
    /// Full sensor height in pixels.
    pub max_height: u32,
}

/// Acquisition parameters for one session.
#[derive(Debug, Clone, PartialEq)]
pub struct CameraConfig {
    /// Exposure time in milliseconds.
    pub exposure_ms: f64,
    /// Hardware master gain (individual RGB gains are not supported).
    pub master_gain: u32,
    /// Sensor pixel clock in MHz.
    pub pixel_clock_mhz: u32,
    /// Region of interest to capture.
    pub roi: Roi,
    /// Pixel format of delivered frames.
    pub format: PixelFormat,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            exposure_ms: 10.0,
            master_gain: 0,
            pixel_clock_mhz: 24,
            roi: Roi::full(640, 480),
            format: PixelFormat::Mono8,
        }
    }
}

impl CameraConfig {
    /// Size in bytes of one frame buffer for this configuration.
    #[must_use]
    pub const fn frame_size_bytes(&self) -> usize {
        (self.roi.width * self.roi.height * self.format.bytes_per_pixel()) as usize
    }

    /// Check every parameter against the camera's capability ranges.
    pub fn validate(&self, limits: &SensorLimits) -> Result<()> {
        if !limits.exposure_ms.contains(&self.exposure_ms) {
            return Err(FailureKind::InvalidParameter);
        }
        if !limits.master_gain.contains(&self.master_gain) {
            return Err(FailureKind::InvalidParameter);
        }
        if !limits.pixel_clock_mhz.contains(&self.pixel_clock_mhz) {
            return Err(FailureKind::InvalidParameter);
        }

        let roi = self.roi;
        if roi.width == 0 || roi.height == 0 {
            return Err(FailureKind::InvalidParameter);
        }
        let fits_x = roi.x.checked_add(roi.width).is_some_and(|r| r <= limits.max_width);
        let fits_y = roi.y.checked_add(roi.height).is_some_and(|b| b <= limits.max_height);
        if !fits_x || !fits_y {
            return Err(FailureKind::InvalidParameter);
        }

        Ok(())
    }

    /// Apply one string-keyed numeric entry, the form used by scripting
    /// callers. Unknown keys and non-representable values are rejected.
    pub fn apply_entry(&mut self, key: &str, value: f64) -> Result<()> {
        match key {
            "exposure_ms" => {
                if !value.is_finite() {
                    return Err(FailureKind::InvalidParameter);
                }
                self.exposure_ms = value;
            }
            "gain" => self.master_gain = as_u32(value)?,
            "pixel_clock_mhz" => self.pixel_clock_mhz = as_u32(value)?,
            "roi_x" => self.roi.x = as_u32(value)?,
            "roi_y" => self.roi.y = as_u32(value)?,
            "roi_width" => self.roi.width = as_u32(value)?,
            "roi_height" => self.roi.height = as_u32(value)?,
            _ => return Err(FailureKind::InvalidParameter),
        }
        Ok(())
    }
}

/// Convert a scripting-side number to a `u32` parameter value.
fn as_u32(value: f64) -> Result<u32> {
    if !value.is_finite() || value < 0.0 || value.fract() != 0.0 || value > f64::from(u32::MAX) {
        return Err(FailureKind::InvalidParameter);
    }
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    Ok(value as u32)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limits() -> SensorLimits {
        SensorLimits {
            exposure_ms: 0.01..=2000.0,
            master_gain: 0..=100,
            pixel_clock_mhz: 5..=43,
            max_width: 1280,
            max_height: 1024,
        }
    }

    #[test]
    fn test_default_config_is_valid() {
        assert!(CameraConfig::default().validate(&limits()).is_ok());
    }

    #[test]
    fn test_out_of_range_exposure_rejected() {
        let config = CameraConfig { exposure_ms: 5000.0, ..CameraConfig::default() };
        assert_eq!(
            config.validate(&limits()),
            Err(FailureKind::InvalidParameter)
        );
    }

    #[test]
    fn test_roi_must_fit_sensor() {
        let mut config = CameraConfig::default();
        config.roi = Roi { x: 1000, y: 0, width: 640, height: 480 };
        assert_eq!(
            config.validate(&limits()),
            Err(FailureKind::InvalidParameter)
        );

        config.roi = Roi::full(0, 480);
        assert_eq!(
            config.validate(&limits()),
            Err(FailureKind::InvalidParameter)
        );
    }

    #[test]
    fn test_frame_size_accounts_for_format() {
        let mut config = CameraConfig::default();
        assert_eq!(config.frame_size_bytes(), 640 * 480);

        config.format = PixelFormat::Bgr8;
        assert_eq!(config.frame_size_bytes(), 640 * 480 * 3);
    }

    #[test]
    fn test_apply_entry_known_keys() {
        let mut config = CameraConfig::default();
        config.apply_entry("exposure_ms", 25.5).expect("exposure");
        config.apply_entry("gain", 12.0).expect("gain");
        config.apply_entry("roi_width", 320.0).expect("roi");

        assert!((config.exposure_ms - 25.5).abs() < f64::EPSILON);
        assert_eq!(config.master_gain, 12);
        assert_eq!(config.roi.width, 320);
    }

    #[test]
    fn test_apply_entry_rejects_unknown_key_and_bad_values() {
        let mut config = CameraConfig::default();
        assert_eq!(
            config.apply_entry("shutter", 1.0),
            Err(FailureKind::InvalidParameter)
        );
        assert_eq!(
            config.apply_entry("gain", -3.0),
            Err(FailureKind::InvalidParameter)
        );
        assert_eq!(
            config.apply_entry("gain", 1.5),
            Err(FailureKind::InvalidParameter)
        );
        assert_eq!(
            config.apply_entry("exposure_ms", f64::NAN),
            Err(FailureKind::InvalidParameter)
        );
    }
}
