//! Artifact naming — the one place version suffixes are derived.
//!
//! Call sites used to concatenate suffixes ad hoc, which produced
//! `..._v1_v2`-style names when a base already carried a suffix. Every
//! version stores its true artifact name explicitly; this function is only
//! used when allocating the name for the *next* version.

use crate::session::state::VersionId;

/// Derives the artifact base name for a new version from the name of the
/// version it was produced from. An existing trailing `_v<n>` suffix is
/// replaced, never stacked.
///
/// - `("Resume_Optimized", v2)` → `"Resume_Optimized_v2"`
/// - `("Resume_Optimized_v1", v2)` → `"Resume_Optimized_v2"`
/// - `("Senior_v2_Resume", v3)` → `"Senior_v2_Resume_v3"` (inner marker kept)
pub fn versioned_artifact(base: &str, id: VersionId) -> String {
    format!("{}_{}", strip_version_suffix(base), id)
}

/// Strips a trailing `_v<digits>` suffix, if present.
fn strip_version_suffix(base: &str) -> &str {
    if let Some((stem, suffix)) = base.rsplit_once("_v") {
        if !stem.is_empty() && !suffix.is_empty() && suffix.bytes().all(|b| b.is_ascii_digit()) {
            return stem;
        }
    }
    base
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_base_gets_suffix() {
        assert_eq!(
            versioned_artifact("Resume_Optimized", VersionId::new(2)),
            "Resume_Optimized_v2"
        );
    }

    #[test]
    fn test_existing_suffix_is_replaced() {
        assert_eq!(
            versioned_artifact("Resume_Optimized_v1", VersionId::new(2)),
            "Resume_Optimized_v2"
        );
        assert_eq!(
            versioned_artifact("Resume_Optimized_v12", VersionId::new(13)),
            "Resume_Optimized_v13"
        );
    }

    #[test]
    fn test_inner_version_marker_is_kept() {
        assert_eq!(
            versioned_artifact("Senior_v2_Resume", VersionId::new(3)),
            "Senior_v2_Resume_v3"
        );
    }

    #[test]
    fn test_non_numeric_suffix_is_kept() {
        assert_eq!(
            versioned_artifact("Resume_vFinal", VersionId::new(2)),
            "Resume_vFinal_v2"
        );
    }
}
