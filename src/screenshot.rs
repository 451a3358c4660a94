//! Screenshot capture: element or full-page/viewport capture, jpeg/png
//! encoding, optional disk write, base64 embedding, and perceptual
//! hashing of the rendered image.

use crate::config::{Options, ScreenshotFormat};
use crate::error::ProbeError;
use crate::result::ProbeResult;
use base64::Engine;
use chromiumoxide::cdp::browser_protocol::emulation::SetDeviceMetricsOverrideParams;
use chromiumoxide::cdp::browser_protocol::page::CaptureScreenshotFormat;
use chromiumoxide::page::{Page, ScreenshotParams};
use image::imageops::FilterType;

pub async fn capture_screenshot(
    page: &Page,
    options: &Options,
    result: &mut ProbeResult,
) -> Result<(), ProbeError> {
    let png_bytes = match &options.scan.selector {
        Some(selector) => capture_element(page, selector, options).await,
        None => capture_page(page, options).await,
    };

    let png_bytes = match png_bytes {
        Ok(bytes) => bytes,
        Err(e) => return Err(ProbeError::Screenshot(e.to_string())),
    };

    let encoded = encode(&png_bytes, options.scan.screenshot_format)
        .map_err(|e| ProbeError::Encode(e.to_string()))?;

    if options.scan.screenshot_embed_in_result {
        result.screenshot = Some(base64::engine::general_purpose::STANDARD.encode(&encoded));
    }

    if !options.scan.screenshot_skip_disk {
        let filename = filename_for(&result.url, options.scan.screenshot_format);
        let path = options.scan.screenshot_path.join(&filename);
        tokio::fs::write(&path, &encoded).await.map_err(ProbeError::Io)?;
        set_screenshot_permissions(&path).await;
        result.filename = Some(filename);
    }

    let decoded = image::load_from_memory(&encoded).map_err(|e| ProbeError::Encode(e.to_string()))?;
    result.perception_hash = Some(perceptual_hash(&decoded));

    Ok(())
}

async fn capture_page(page: &Page, options: &Options) -> Result<Vec<u8>, chromiumoxide::error::CdpError> {
    let params = if options.scan.screenshot_full_page {
        ScreenshotParams::builder()
            .format(CaptureScreenshotFormat::Png)
            .full_page(true)
            .build()
    } else {
        ScreenshotParams::builder()
            .format(CaptureScreenshotFormat::Png)
            .build()
    };
    page.screenshot(params).await
}

async fn capture_element(
    page: &Page,
    selector: &str,
    options: &Options,
) -> Result<Vec<u8>, chromiumoxide::error::CdpError> {
    let element = page.find_element(selector).await?;
    element.wait_for_visible().await?;

    if options.scan.screenshot_full_page {
        let scroll_height: u64 = element
            .evaluate("this.scrollHeight")
            .await
            .ok()
            .and_then(|v| v.into_value().ok())
            .unwrap_or(0);

        if scroll_height > options.chrome.window_y as u64 {
            page.execute(
                SetDeviceMetricsOverrideParams::builder()
                    .width(options.chrome.window_x)
                    .height(scroll_height as u32)
                    .device_scale_factor(1.0)
                    .mobile(false)
                    .build()
                    .expect("valid device metrics params"),
            )
            .await?;
        } else {
            element.scroll_into_view().await?;
        }
    } else {
        element.scroll_into_view().await?;
    }

    element.screenshot(CaptureScreenshotFormat::Png).await
}

fn encode(png_bytes: &[u8], format: ScreenshotFormat) -> Result<Vec<u8>, image::ImageError> {
    match format {
        ScreenshotFormat::Png => Ok(png_bytes.to_vec()),
        ScreenshotFormat::Jpeg => {
            let rgb = image::load_from_memory(png_bytes)?.to_rgb8();
            let mut out = Vec::new();
            let encoder = image::codecs::jpeg::JpegEncoder::new_with_quality(&mut out, 80);
            encoder.encode(rgb.as_raw(), rgb.width(), rgb.height(), image::ColorType::Rgb8)?;
            Ok(out)
        }
    }
}

/// Screenshot files are written world-readable, owner-writable (0664),
/// matching the mode this engine has always used for its output files.
#[cfg(unix)]
async fn set_screenshot_permissions(path: &std::path::Path) {
    use std::os::unix::fs::PermissionsExt;
    let perms = std::fs::Permissions::from_mode(0o664);
    if let Err(e) = tokio::fs::set_permissions(path, perms).await {
        tracing::debug!("failed to set permissions on {path:?}: {e}");
    }
}

#[cfg(not(unix))]
async fn set_screenshot_permissions(_path: &std::path::Path) {}

fn filename_for(target: &str, format: ScreenshotFormat) -> String {
    let safe = crate::utils::safe_file_name(target);
    let max_stem = 200usize.saturating_sub(format.extension().len() + 1);
    let truncated: String = safe.chars().take(max_stem).collect();
    format!("{truncated}.{}", format.extension())
}

/// Side length of the grayscale grid the DCT runs over. Large enough to
/// carry real low-frequency structure, small enough that an O(n^3)
/// separable DCT is instant.
const DCT_SIZE: usize = 32;
/// Side length of the low-frequency block the hash bits are drawn from.
const HASH_BLOCK: usize = 8;

/// A 64-bit DCT-based perceptual hash (the standard pHash recipe): shrink to
/// a fixed grayscale grid, run a 2D DCT, keep the lowest-frequency corner,
/// and threshold each coefficient against their median. Robust to the kind
/// of minor rendering noise (antialiasing, font hinting) that would make a
/// byte-exact comparison useless for near-duplicate grouping.
fn perceptual_hash(img: &image::DynamicImage) -> String {
    let small = image::imageops::resize(
        &img.to_luma8(),
        DCT_SIZE as u32,
        DCT_SIZE as u32,
        FilterType::Triangle,
    );

    let mut samples = [[0.0f64; DCT_SIZE]; DCT_SIZE];
    for y in 0..DCT_SIZE {
        for x in 0..DCT_SIZE {
            samples[y][x] = small.get_pixel(x as u32, y as u32).0[0] as f64;
        }
    }

    let coeffs = dct_2d(&samples);

    let mut block = Vec::with_capacity(HASH_BLOCK * HASH_BLOCK);
    for row in coeffs.iter().take(HASH_BLOCK) {
        block.extend_from_slice(&row[..HASH_BLOCK]);
    }

    let mut sorted = block.clone();
    sorted.sort_by(|a, b| a.partial_cmp(b).expect("DCT coefficients are always finite"));
    let median = sorted[sorted.len() / 2];

    let mut hash: u64 = 0;
    for (bit, &value) in block.iter().enumerate() {
        if value > median {
            hash |= 1 << bit;
        }
    }

    format!("{hash:016x}")
}

/// Separable 2D DCT-II: a 1D DCT over every row, then over every column of
/// the result.
fn dct_2d(samples: &[[f64; DCT_SIZE]; DCT_SIZE]) -> [[f64; DCT_SIZE]; DCT_SIZE] {
    let mut rows = [[0.0f64; DCT_SIZE]; DCT_SIZE];
    for y in 0..DCT_SIZE {
        rows[y] = dct_1d(&samples[y]);
    }

    let mut out = [[0.0f64; DCT_SIZE]; DCT_SIZE];
    for x in 0..DCT_SIZE {
        let column: [f64; DCT_SIZE] = std::array::from_fn(|y| rows[y][x]);
        let transformed = dct_1d(&column);
        for y in 0..DCT_SIZE {
            out[y][x] = transformed[y];
        }
    }
    out
}

fn dct_1d(input: &[f64; DCT_SIZE]) -> [f64; DCT_SIZE] {
    let n = DCT_SIZE as f64;
    std::array::from_fn(|k| {
        input
            .iter()
            .enumerate()
            .map(|(i, &value)| value * (std::f64::consts::PI / n * (i as f64 + 0.5) * k as f64).cos())
            .sum()
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filename_is_truncated_and_has_extension() {
        let long_url = "http://example.com/".to_string() + &"a".repeat(400);
        let name = filename_for(&long_url, ScreenshotFormat::Jpeg);
        assert!(name.ends_with(".jpeg"));
        assert!(name.len() <= 204);
    }

    #[test]
    fn png_passthrough_is_identity() {
        let bytes = vec![1, 2, 3];
        let encoded = encode(&bytes, ScreenshotFormat::Png).unwrap();
        assert_eq!(encoded, bytes);
    }
}
