pub mod collapsed;
pub mod speedscope;

use thiserror::Error;

use crate::model::ProfileGroup;

pub use speedscope::ExportError;

#[derive(Debug, Error)]
pub enum ImportError {
    #[error("speedscope: {0}")]
    Speedscope(#[from] speedscope::SpeedscopeParseError),
    #[error("collapsed: {0}")]
    Collapsed(#[from] collapsed::CollapsedParseError),
}

/// Detect the format of `bytes` and import it.
///
/// Detection strategy:
/// 1. JSON documents are imported when they look like speedscope files.
/// 2. Other UTF-8 text is tried as collapsed stacks.
///
/// `Ok(None)` means the format was not recognized. Profiles without a name
/// are named after `file_name`.
pub fn import_profile_group(
    file_name: &str,
    bytes: &[u8],
) -> Result<Option<ProfileGroup>, ImportError> {
    let name = if file_name.is_empty() {
        "Unnamed"
    } else {
        file_name
    };

    if let Ok(value) = serde_json::from_slice::<serde_json::Value>(bytes) {
        if speedscope::is_speedscope(&value) {
            let group = speedscope::parse_speedscope(value, name)?;
            log::info!(
                "imported {} speedscope profile(s) from {name}",
                group.len()
            );
            return Ok(Some(group));
        }
        log::debug!("{name}: JSON but not a speedscope document");
        return Ok(None);
    }

    let Ok(text) = std::str::from_utf8(bytes) else {
        return Ok(None);
    };
    let Some(profile) = collapsed::parse_collapsed(text, name)? else {
        return Ok(None);
    };
    log::info!("imported collapsed stacks from {name}");
    Ok(Some(ProfileGroup::new(name, vec![profile])))
}

/// Serialize `group` in the speedscope format.
pub fn export_profile_group(group: &ProfileGroup) -> Result<String, ExportError> {
    speedscope::export_speedscope(group)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_speedscope_by_schema_or_keys() {
        let by_schema = br#"{"$schema": "https://www.speedscope.app/file-format-spec.json",
            "profiles": []}"#;
        let group = import_profile_group("a.json", by_schema).unwrap().unwrap();
        assert!(group.is_empty());

        let by_keys = br#"{"shared": {"frames": [{"name": "f"}]}, "profiles": [
            {"type": "sampled", "unit": "none", "samples": [[0]], "weights": [1]}]}"#;
        let group = import_profile_group("b.json", by_keys).unwrap().unwrap();
        assert_eq!(group.len(), 1);
        assert_eq!(group.profiles[0].name(), "b.json");
    }

    #[test]
    fn unrelated_json_and_binary_are_unrecognized() {
        assert!(import_profile_group("x.json", br#"{"traceEvents": []}"#)
            .unwrap()
            .is_none());
        assert!(import_profile_group("x.bin", &[0xff, 0xfe, 0x00])
            .unwrap()
            .is_none());
    }

    #[test]
    fn collapsed_text_is_imported() {
        let group = import_profile_group("", b"a;b 2\na 1\n").unwrap().unwrap();
        assert_eq!(group.name, "Unnamed");
        assert_eq!(group.profiles[0].total_weight(), 3.0);
    }

    #[test]
    fn malformed_speedscope_is_an_error() {
        let bad = br#"{"shared": {"frames": []}, "profiles": [{"type": "sampled"}]}"#;
        assert!(matches!(
            import_profile_group("c.json", bad),
            Err(ImportError::Speedscope(_))
        ));
    }
}
