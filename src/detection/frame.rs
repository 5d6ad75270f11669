use base64::{engine::general_purpose::STANDARD, Engine};

use super::DetectionError;

const DATA_URL_PREFIX: &str = "data:";
const BASE64_MARKER: &str = ";base64,";

/// A still image grabbed from the active camera, as sent by the webview.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub mime: String,
    pub bytes: Vec<u8>,
}

impl Frame {
    /// Parse a `data:<mime>;base64,<payload>` URL. A bare base64 payload is
    /// accepted and assumed to be PNG.
    pub fn from_data_url(raw: &str) -> Result<Self, DetectionError> {
        let raw = raw.trim();
        let (mime, payload) = match raw.strip_prefix(DATA_URL_PREFIX) {
            Some(rest) => {
                let (mime, payload) = rest.split_once(BASE64_MARKER).ok_or_else(|| {
                    DetectionError::Frame("data URL is not base64 encoded".into())
                })?;
                (mime.to_string(), payload)
            }
            None => ("image/png".to_string(), raw),
        };

        if !mime.starts_with("image/") {
            return Err(DetectionError::Frame(format!("unsupported media type {mime}")));
        }

        let bytes = STANDARD
            .decode(payload)
            .map_err(|err| DetectionError::Frame(format!("invalid base64 payload: {err}")))?;

        if bytes.is_empty() {
            return Err(DetectionError::Frame("frame is empty".into()));
        }

        Ok(Self { mime, bytes })
    }

    pub fn to_data_url(&self) -> String {
        format!(
            "{DATA_URL_PREFIX}{}{BASE64_MARKER}{}",
            self.mime,
            STANDARD.encode(&self.bytes)
        )
    }

    /// Decode to 8-bit grayscale, returning `(pixels, width, height)`.
    pub fn to_luma(&self) -> Result<(Vec<u8>, u32, u32), DetectionError> {
        let image = image::load_from_memory(&self.bytes)
            .map_err(|err| DetectionError::Frame(format!("failed to decode image: {err}")))?;
        let luma = image.to_luma8();
        let (width, height) = luma.dimensions();
        Ok((luma.into_raw(), width, height))
    }
}

#[cfg(test)]
pub(crate) fn png_fixture(width: u32, height: u32) -> Vec<u8> {
    let image = image::RgbImage::from_pixel(width, height, image::Rgb([255, 255, 255]));
    let mut bytes = std::io::Cursor::new(Vec::new());
    image
        .write_to(&mut bytes, image::ImageFormat::Png)
        .unwrap();
    bytes.into_inner()
}
