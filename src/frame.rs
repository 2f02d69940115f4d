use serde::{Deserialize, Serialize};

use crate::errors::{IngestError, Result};

pub const BYTES_PER_PIXEL: usize = 3;

/// One decoded camera image: RGB24, row-major.
///
/// This is also the wire payload type: cameras send `bincode`-serialized
/// frames inside length-prefixed messages.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Frame {
    pub width: u32,
    pub height: u32,
    pub data: Vec<u8>,
}

impl Frame {
    pub fn new(width: u32, height: u32, data: Vec<u8>) -> Self {
        Self { width, height, data }
    }

    /// Buffer length a `width` x `height` RGB frame must have.
    /// `None` if the pixel count overflows `usize`.
    pub fn expected_len(width: u32, height: u32) -> Option<usize> {
        (width as usize)
            .checked_mul(height as usize)?
            .checked_mul(BYTES_PER_PIXEL)
    }

    /// A frame that deserialized but whose buffer does not match its declared
    /// dimensions is malformed and must not reach the cache or the recorder.
    pub fn is_well_formed(&self) -> bool {
        self.width > 0
            && self.height > 0
            && Self::expected_len(self.width, self.height)
                .is_some_and(|len| len == self.data.len())
    }

    pub fn to_jpeg(&self, quality: u8) -> Result<Vec<u8>> {
        let mut jpeg = Vec::new();
        let mut encoder = image::codecs::jpeg::JpegEncoder::new_with_quality(&mut jpeg, quality);
        encoder
            .encode(&self.data, self.width, self.height, image::ExtendedColorType::Rgb8)
            .map_err(|e| IngestError::encode(e.to_string()))?;
        Ok(jpeg)
    }
}
