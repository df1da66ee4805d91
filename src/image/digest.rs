use crate::errors::ImageError;
use regex::Regex;
use sha2::{Digest, Sha256};
use std::{fmt, ops::Range};

/// An algorithm-tagged content hash, in the `algorithm:hex` form used by
/// image registries
///
/// This is the validated form used inside image names and when talking to a
/// registry. Storage backends which treat digests as opaque keys take plain
/// strings instead.
#[derive(Clone)]
pub struct ContentDigest {
    serialized: String,
    format_pos: Range<usize>,
    hex_pos: Range<usize>,
}

serialized_identity!(ContentDigest);

static SHA256_STR: &str = "sha256";

impl ContentDigest {
    /// Returns a reference to the existing string representation of a
    /// [ContentDigest]
    ///
    /// This string always has a single colon. After the colon is 32 or more
    /// lowercase hexadecimal digits. The format specifier before the colon is
    /// alphanumeric, with plus, dash, underscore, or dot characters allowed as
    /// separators between valid groups of alphanumeric characters.
    pub fn as_str(&self) -> &str {
        &self.serialized
    }

    /// Assemble and parse a format string and a hex value
    pub fn from_parts<T: fmt::LowerHex>(
        format_part: &str,
        hex_part: &T,
    ) -> Result<Self, ImageError> {
        ContentDigest::parse(&format!("{}:{:x}", format_part, hex_part))
    }

    /// Hash some content with `sha256`
    ///
    /// ```
    /// # use image_transport::image::ContentDigest;
    /// let digest = ContentDigest::from_content(b"cat");
    /// assert_eq!(digest.as_str(), "sha256:77af778b51abd4a3c51c5ddd97204a9c3ae614ebccb75a606c3b6865aed6744e");
    /// ```
    pub fn from_content(content_bytes: &[u8]) -> Self {
        let hex: String = Sha256::digest(content_bytes)
            .iter()
            .map(|byte| format!("{:02x}", byte))
            .collect();
        let split = SHA256_STR.len();
        ContentDigest {
            serialized: format!("{}:{}", SHA256_STR, hex),
            format_pos: 0..split,
            hex_pos: (split + 1)..(split + 1 + hex.len()),
        }
    }

    /// Parse a [prim@str] as a [ContentDigest]
    ///
    /// ```
    /// # use image_transport::image::ContentDigest;
    /// let digest = ContentDigest::parse("format:00112233445566778899aabbccddeeff").unwrap();
    /// assert_eq!(digest.format_str(), "format");
    /// assert_eq!(digest.hex_str(), "00112233445566778899aabbccddeeff")
    /// ```
    pub fn parse(s: &str) -> Result<Self, ImageError> {
        lazy_static! {
            static ref RE: Regex =
                Regex::new(&format!("^{}$", ContentDigest::regex_str())).unwrap();
        }
        let captures = RE
            .captures(s)
            .ok_or_else(|| ImageError::InvalidReferenceFormat(s.to_owned()))?;
        match (captures.name("dig_f"), captures.name("dig_h")) {
            (Some(format), Some(hex)) => Ok(ContentDigest {
                serialized: s.to_owned(),
                format_pos: format.range(),
                hex_pos: hex.range(),
            }),
            _ => Err(ImageError::InvalidReferenceFormat(s.to_owned())),
        }
    }

    /// The hash format, like `sha256`
    pub fn format_str(&self) -> &str {
        &self.serialized[self.format_pos.clone()]
    }

    /// The hexadecimal hash value, at least 32 digits long
    pub fn hex_str(&self) -> &str {
        &self.serialized[self.hex_pos.clone()]
    }

    /// Is this a digest we know how to compute ourselves?
    pub fn is_sha256(&self) -> bool {
        self.format_str() == SHA256_STR
    }

    /// Check that some content matches this digest
    ///
    /// Digests in formats we can't compute are accepted without checking.
    pub fn verify(&self, content_bytes: &[u8]) -> Result<(), ImageError> {
        if !self.is_sha256() {
            log::debug!("not verifying content against {} digest", self.format_str());
            return Ok(());
        }
        let found = ContentDigest::from_content(content_bytes);
        if &found == self {
            Ok(())
        } else {
            Err(ImageError::ContentDigestMismatch {
                expected: self.clone(),
                found,
            })
        }
    }

    pub(crate) fn regex_str() -> &'static str {
        concat!(
            "(?P<dig>",
            /*  */ "(?P<dig_f>", // algorithm
            /* -- */ "[a-zA-Z][a-zA-Z0-9]*",
            /* -- */ "(?:[-_+.][a-zA-Z][a-zA-Z0-9]*)*",
            /*  */ ")",
            /*  */ ":",
            /*  */ "(?P<dig_h>[a-f0-9]{32,})",
            ")",
        )
    }
}
