//! Compiled generation requests.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Generator-facing parameters of one request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct GenerationParams {
    /// Model identifier at the provider.
    pub model: String,

    /// Resolution in wire format, `W*H`.
    pub size: String,

    /// Whole seconds of footage to generate.
    pub duration: u32,

    pub seed: i64,

    /// Let the provider expand the prompt server-side.
    pub prompt_extend: bool,

    pub watermark: bool,
}

/// One ready-to-submit generation call for a shot.
///
/// Immutable once compiled. Edits to a shot compile a replacement request;
/// nothing ever rewrites an existing one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ShotRequest {
    pub shot_id: u32,
    pub compiled_prompt: String,
    pub compiled_negative_prompt: String,
    pub params: GenerationParams,
}

/// Convert a resolution to wire format (`1280x720` -> `1280*720`).
///
/// Callers accept either separator; the generator only speaks `*`.
pub fn to_wire_size(size: &str) -> String {
    size.trim().replace(['x', 'X'], "*")
}

/// Parse a resolution in either separator form into (width, height).
pub fn parse_size(size: &str) -> Option<(u32, u32)> {
    let wire = to_wire_size(size);
    let (w, h) = wire.split_once('*')?;
    Some((w.trim().parse().ok()?, h.trim().parse().ok()?))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_to_wire_size() {
        assert_eq!(to_wire_size("1280x720"), "1280*720");
        assert_eq!(to_wire_size("1280*720"), "1280*720");
        assert_eq!(to_wire_size(" 1920X1080 "), "1920*1080");
    }

    #[test]
    fn test_parse_size() {
        assert_eq!(parse_size("1280x720"), Some((1280, 720)));
        assert_eq!(parse_size("1920*1080"), Some((1920, 1080)));
        assert_eq!(parse_size("wide"), None);
        assert_eq!(parse_size("1280*abc"), None);
    }
}
