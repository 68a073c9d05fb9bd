//! Image encoding helpers
//!
//! Requests always declare `image/png`, so local files are normalized to PNG
//! before they are base64-encoded. Returned payloads are decoded back to
//! bytes for saving.

use crate::ai::mime::ImageKind;
use crate::{Error, Result};
use base64::alphabet;
use base64::engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig};
use base64::DecodeSliceError;
use base64::Engine as _;
use image::ImageFormat;
use std::path::{Path, PathBuf};

/// Standard alphabet, padding optional when decoding.
const LENIENT_BASE64: GeneralPurpose = GeneralPurpose::new(
    &alphabet::STANDARD,
    GeneralPurposeConfig::new().with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

/// Input bytes checked per step by [`validate_base64`]; a multiple of 4.
const VALIDATE_CHUNK: usize = 1024;

/// Payload of a `data:<mime>;base64,` URL, or `data` itself.
pub(crate) fn strip_data_url(data: &str) -> &str {
    if data.starts_with("data:") {
        if let Some((_, payload)) = data.split_once(";base64,") {
            return payload;
        }
    }
    data
}

/// Strip a `data:` URL prefix and any ASCII whitespace (line wrapping).
pub(crate) fn normalize_base64(data: &str) -> String {
    strip_data_url(data)
        .chars()
        .filter(|c| !c.is_ascii_whitespace())
        .collect()
}

/// Check that normalized `data` decodes, without keeping the decoded bytes.
pub(crate) fn validate_base64(data: &str) -> std::result::Result<(), DecodeSliceError> {
    let mut buf = [0u8; VALIDATE_CHUNK / 4 * 3];
    for chunk in data.as_bytes().chunks(VALIDATE_CHUNK) {
        LENIENT_BASE64.decode_slice(chunk, &mut buf)?;
    }
    Ok(())
}

/// Base64 PNG for `bytes`. PNG input is passed through untouched; anything
/// else is decoded and re-encoded as PNG.
pub fn to_png_base64(bytes: &[u8]) -> Result<String> {
    let kind = ImageKind::detect(bytes);
    if kind == ImageKind::Png {
        return Ok(base64::engine::general_purpose::STANDARD.encode(bytes));
    }

    tracing::debug!(
        "Converting {} input ({} bytes) to PNG",
        kind.mime_type(),
        bytes.len()
    );
    let img = image::load_from_memory(bytes)?;
    let mut png = Vec::new();
    img.write_to(&mut std::io::Cursor::new(&mut png), ImageFormat::Png)?;
    Ok(base64::engine::general_purpose::STANDARD.encode(&png))
}

/// Read an image file and return it as base64 PNG.
pub async fn load_png_base64(path: &Path) -> Result<String> {
    let bytes = tokio::fs::read(path).await?;
    tokio::task::spawn_blocking(move || to_png_base64(&bytes))
        .await
        .map_err(|e| Error::Io(std::io::Error::other(format!("Image conversion task failed: {}", e))))?
}

/// Decode a base64 image payload (optionally a `data:` URL).
pub fn decode_base64(data: &str) -> Result<Vec<u8>> {
    LENIENT_BASE64
        .decode(normalize_base64(data))
        .map_err(|e| Error::malformed(format!("Failed to decode base64 image: {}", e)))
}

/// Decode `data` and write it to `dir/{stem}.{ext}`, picking the extension
/// from the payload's magic bytes.
pub async fn save_base64(dir: &Path, stem: &str, data: &str) -> Result<PathBuf> {
    let bytes = decode_base64(data)?;
    let path = dir.join(format!("{}.{}", stem, ImageKind::detect(&bytes).extension()));
    tokio::fs::write(&path, &bytes).await?;
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn create_test_image(format: ImageFormat) -> Vec<u8> {
        let img = image::RgbImage::from_pixel(4, 4, image::Rgb([255, 0, 0]));
        let mut bytes = Vec::new();
        img.write_to(&mut std::io::Cursor::new(&mut bytes), format)
            .unwrap();
        bytes
    }

    #[test]
    fn test_png_passes_through_unchanged() {
        let png = create_test_image(ImageFormat::Png);
        let encoded = to_png_base64(&png).unwrap();
        assert_eq!(decode_base64(&encoded).unwrap(), png);
    }

    #[test]
    fn test_jpeg_is_converted_to_png() {
        let jpeg = create_test_image(ImageFormat::Jpeg);
        let encoded = to_png_base64(&jpeg).unwrap();

        let decoded = decode_base64(&encoded).unwrap();
        assert_eq!(ImageKind::detect(&decoded), ImageKind::Png);
        let img = image::load_from_memory(&decoded).unwrap();
        assert_eq!((img.width(), img.height()), (4, 4));
    }

    #[test]
    fn test_garbage_input_is_image_error() {
        let err = to_png_base64(b"definitely not an image").unwrap_err();
        assert!(matches!(err, Error::Image(_)));
    }

    #[test]
    fn test_strip_data_url_requires_data_scheme() {
        assert_eq!(strip_data_url("data:image/png;base64,AAAA"), "AAAA");
        assert_eq!(strip_data_url("image/png;base64,AAAA"), "image/png;base64,AAAA");
        assert_eq!(strip_data_url("AAAA"), "AAAA");
    }

    #[test]
    fn test_validate_base64_lenient_padding_and_long_input() {
        assert!(validate_base64("iVBORw0KGgo").is_ok());
        assert!(validate_base64("iVBORw0KGgo=").is_ok());
        assert!(validate_base64("iVBORw0KGgo==").is_err());
        assert!(validate_base64("abcde").is_err());

        let long = base64::engine::general_purpose::STANDARD.encode(vec![7u8; 5000]);
        assert!(validate_base64(&long).is_ok());
        let mut broken = long.clone();
        broken.replace_range(2000..2001, "!");
        assert!(validate_base64(&broken).is_err());
    }

    #[test]
    fn test_decode_accepts_data_url_and_wrapping() {
        assert_eq!(
            decode_base64("data:image/png;base64,iVBORw0K\nGgo").unwrap(),
            vec![0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A]
        );
    }

    #[test]
    fn test_decode_invalid_base64_is_malformed() {
        let err = decode_base64("%%%").unwrap_err();
        assert!(matches!(err, Error::MalformedResponse { .. }));
    }

    #[tokio::test]
    async fn test_load_and_save_round_trip() {
        let dir = TempDir::new().unwrap();
        let source = dir.path().join("input.jpg");
        tokio::fs::write(&source, create_test_image(ImageFormat::Jpeg))
            .await
            .unwrap();

        let encoded = load_png_base64(&source).await.unwrap();
        let saved = save_base64(dir.path(), "result_0", &encoded).await.unwrap();

        assert_eq!(saved, dir.path().join("result_0.png"));
        assert!(image::open(&saved).is_ok());
    }
}
