use rxing::{BarcodeFormat, DecodingHintDictionary};
use serde::Serialize;

use super::{DetectionError, Frame};

// Set to true to enable verbose logging in this module
const ENABLE_LOGS: bool = true;

use crate::{log_info, log_warn};

/// Linear symbologies accepted for student cards, in the order they are tried.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum Symbology {
    Code128,
    Ean13,
    Ean8,
    Code39,
    UpcA,
}

impl Symbology {
    pub const SUPPORTED: [Symbology; 5] = [
        Symbology::Code128,
        Symbology::Ean13,
        Symbology::Ean8,
        Symbology::Code39,
        Symbology::UpcA,
    ];

    fn format(self) -> BarcodeFormat {
        match self {
            Symbology::Code128 => BarcodeFormat::CODE_128,
            Symbology::Ean13 => BarcodeFormat::EAN_13,
            Symbology::Ean8 => BarcodeFormat::EAN_8,
            Symbology::Code39 => BarcodeFormat::CODE_39,
            Symbology::UpcA => BarcodeFormat::UPC_A,
        }
    }
}

/// Still frame in, optional decoded identifier out. Blocking; callers run it
/// off the async runtime.
pub trait IdentifierDecoder: Send + Sync {
    fn decode(&self, frame: &Frame) -> Result<Option<String>, DetectionError>;
}

pub struct RxingDecoder {
    symbologies: Vec<Symbology>,
}

impl RxingDecoder {
    pub fn new() -> Self {
        Self {
            symbologies: Symbology::SUPPORTED.to_vec(),
        }
    }
}

impl Default for RxingDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl IdentifierDecoder for RxingDecoder {
    fn decode(&self, frame: &Frame) -> Result<Option<String>, DetectionError> {
        let (luma, width, height) = frame.to_luma()?;

        for symbology in &self.symbologies {
            // `helpers::detect_in_luma` swaps width and height, so go through
            // the hinted entry point directly.
            let mut hints = DecodingHintDictionary::new();
            match rxing::helpers::detect_in_luma_with_hints(
                luma.clone(),
                width,
                height,
                Some(symbology.format()),
                &mut hints,
            ) {
                Ok(result) => {
                    let text = result.getText().trim().to_string();
                    if text.is_empty() {
                        continue;
                    }
                    log_info!("Decoded {:?} barcode: {}", symbology, text);
                    return Ok(Some(text));
                }
                Err(err) => {
                    log::trace!("{:?} not found in {}x{} frame: {:?}", symbology, width, height, err);
                }
            }
        }

        log_warn!("No supported barcode found in {}x{} frame", width, height);
        Ok(None)
    }
}
