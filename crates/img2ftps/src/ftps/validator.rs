//! Magic-byte image validation.
//!
//! A payload is accepted when it fits under the size cap, carries at least
//! [`MIN_INSPECT_LEN`] bytes, and starts with one of the known signatures.

use crate::ftps::types::{ImageKind, SkipReason};

/// Bytes that must be present before any signature is inspected.
pub const MIN_INSPECT_LEN: usize = 8;

const GIF87A: &[u8] = &[0x47, 0x49, 0x46, 0x38, 0x37, 0x61];
const GIF89A: &[u8] = &[0x47, 0x49, 0x46, 0x38, 0x39, 0x61];
const PNG: &[u8] = &[0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A];
const JPEG: &[u8] = &[0xFF, 0xD8, 0xFF];

/// Every recognised signature, checked in order.
pub const SIGNATURES: &[(ImageKind, &[u8])] = &[
    (ImageKind::Gif87a, GIF87A),
    (ImageKind::Gif89a, GIF89A),
    (ImageKind::Png, PNG),
    (ImageKind::Jpeg, JPEG),
];

/// `true` iff `content` is at least as long as `signature` and begins with it.
pub fn starts_with_signature(content: &[u8], signature: &[u8]) -> bool {
    content.len() >= signature.len() && content[..signature.len()] == *signature
}

/// Identify the image format from the leading bytes, ignoring size limits.
pub fn detect(content: &[u8]) -> Option<ImageKind> {
    if content.len() < MIN_INSPECT_LEN {
        return None;
    }
    SIGNATURES
        .iter()
        .find(|(_, sig)| starts_with_signature(content, sig))
        .map(|(kind, _)| *kind)
}

/// Classify `content`, explaining why it was rejected.
pub fn validate(content: &[u8], max_size: usize) -> Result<ImageKind, SkipReason> {
    if content.len() > max_size {
        return Err(SkipReason::TooLarge);
    }
    if content.len() < MIN_INSPECT_LEN {
        return Err(SkipReason::TooShort);
    }
    detect(content).ok_or(SkipReason::UnrecognizedSignature)
}

/// `true` when `content` is within `max_size` and carries a known image signature.
pub fn is_valid_image(content: &[u8], max_size: usize) -> bool {
    validate(content, max_size).is_ok()
}

/// Whether `name` is a single remote path segment safe to put on a command
/// line: non-empty, not `.` or `..`, no `/`, `\` or control characters.
pub fn is_plain_name(name: &str) -> bool {
    !name.is_empty()
        && name != "."
        && name != ".."
        && !name.chars().any(|c| c == '/' || c == '\\' || c.is_control())
}
