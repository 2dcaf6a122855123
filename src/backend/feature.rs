// Feature negotiation
//
// Reconciles a requested list of layers/extensions against what the loader
// or driver reports. Enabled names always come back in request order.

use ash::vk;
use std::borrow::Cow;
use std::ffi::CString;

use super::error::{BootstrapError, BootstrapResult};

/// One requested layer or extension
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeatureRequest {
    pub name: Cow<'static, str>,
    pub mandatory: bool,
}

impl FeatureRequest {
    pub const fn required(name: &'static str) -> Self {
        Self {
            name: Cow::Borrowed(name),
            mandatory: true,
        }
    }

    pub const fn optional(name: &'static str) -> Self {
        Self {
            name: Cow::Borrowed(name),
            mandatory: false,
        }
    }

    pub fn owned(name: impl Into<String>, mandatory: bool) -> Self {
        Self {
            name: Cow::Owned(name.into()),
            mandatory,
        }
    }
}

/// Compute the enabled subset of `requested`.
///
/// A missing mandatory entry fails the whole negotiation no matter what
/// `allow_partial` says. `allow_partial` only controls how loudly dropped
/// optional entries are reported: a caller that passes `false` expected the
/// complete list, so each drop is a warning.
pub fn negotiate<S: AsRef<str>>(
    label: &str,
    allow_partial: bool,
    available: &[S],
    requested: &[FeatureRequest],
) -> BootstrapResult<Vec<String>> {
    log::debug!("{} negotiation: {} requested, {} available", label, requested.len(), available.len());

    let mut enabled = Vec::with_capacity(requested.len());
    for request in requested {
        let found = available.iter().any(|name| name.as_ref() == request.name);
        if found {
            log::debug!("\t[{}] enable '{}'", label, request.name);
            enabled.push(request.name.to_string());
        } else if request.mandatory {
            log::error!("\t[{}] mandatory '{}' not available", label, request.name);
            return Err(BootstrapError::MissingFeature {
                label: label.to_string(),
                name: request.name.to_string(),
            });
        } else if allow_partial {
            log::info!("\t[{}] optional '{}' not available, skipped", label, request.name);
        } else {
            log::warn!("\t[{}] optional '{}' not available, skipped", label, request.name);
        }
    }

    Ok(enabled)
}

/// Deduplicated union of two request lists.
///
/// The first occurrence of a name wins, including its `mandatory` flag.
pub fn merge_requests(primary: &[FeatureRequest], secondary: &[FeatureRequest]) -> Vec<FeatureRequest> {
    let mut merged: Vec<FeatureRequest> = Vec::with_capacity(primary.len() + secondary.len());
    for request in primary.iter().chain(secondary) {
        if !merged.iter().any(|r| r.name == request.name) {
            merged.push(request.clone());
        }
    }
    merged
}

pub fn names_from_layers(layers: &[vk::LayerProperties]) -> Vec<String> {
    layers
        .iter()
        .filter_map(|layer| layer.layer_name_as_c_str().ok())
        .filter_map(|name| name.to_str().ok())
        .map(str::to_owned)
        .collect()
}

pub fn names_from_extensions(extensions: &[vk::ExtensionProperties]) -> Vec<String> {
    extensions
        .iter()
        .filter_map(|ext| ext.extension_name_as_c_str().ok())
        .filter_map(|name| name.to_str().ok())
        .map(str::to_owned)
        .collect()
}

/// Owned C strings for a create-info; keep the returned vector alive while
/// the pointers are in use.
pub fn to_cstrings(names: &[String]) -> BootstrapResult<Vec<CString>> {
    names
        .iter()
        .map(|name| CString::new(name.as_str()).map_err(|_| BootstrapError::InvalidName(name.clone())))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn optional_miss_is_dropped() {
        let available = ["A", "B"];
        let requested = [FeatureRequest::required("A"), FeatureRequest::optional("C")];

        let enabled = negotiate("Instance Layer", false, &available, &requested).unwrap();
        assert_eq!(enabled, vec!["A".to_string()]);
    }

    #[test]
    fn mandatory_miss_fails_regardless_of_partial() {
        let available = ["A", "B"];
        let requested = [FeatureRequest::required("A"), FeatureRequest::required("Z")];

        for allow_partial in [false, true] {
            let err = negotiate("Instance Layer", allow_partial, &available, &requested).unwrap_err();
            match err {
                BootstrapError::MissingFeature { label, name } => {
                    assert_eq!(label, "Instance Layer");
                    assert_eq!(name, "Z");
                }
                other => panic!("unexpected error: {other:?}"),
            }
        }
    }

    #[test]
    fn enabled_follows_request_order() {
        let available = ["C", "B", "A"];
        let requested = [
            FeatureRequest::optional("A"),
            FeatureRequest::optional("missing"),
            FeatureRequest::required("B"),
            FeatureRequest::optional("C"),
        ];

        let first = negotiate("ext", true, &available, &requested).unwrap();
        let second = negotiate("ext", true, &available, &requested).unwrap();
        assert_eq!(first, vec!["A", "B", "C"]);
        assert_eq!(first, second);
    }

    #[test]
    fn match_is_case_sensitive() {
        let available = ["vk_khr_surface"];
        let requested = [FeatureRequest::required("VK_KHR_surface")];

        assert!(negotiate("ext", true, &available, &requested).is_err());
    }

    #[test]
    fn empty_request_enables_nothing() {
        let available: [&str; 0] = [];
        let enabled = negotiate("ext", false, &available, &[]).unwrap();
        assert!(enabled.is_empty());
    }

    #[test]
    fn many_features_are_not_capped() {
        let names: Vec<String> = (0..64).map(|i| format!("EXT_{i}")).collect();
        let requested: Vec<FeatureRequest> = names.iter().map(|n| FeatureRequest::owned(n.clone(), true)).collect();

        let enabled = negotiate("ext", true, &names, &requested).unwrap();
        assert_eq!(enabled.len(), 64);
    }

    #[test]
    fn merge_keeps_first_occurrence() {
        let engine = [
            FeatureRequest::optional("VK_KHR_surface"),
            FeatureRequest::optional("VK_EXT_debug_utils"),
        ];
        let window = [
            FeatureRequest::required("VK_KHR_surface"),
            FeatureRequest::required("VK_KHR_xcb_surface"),
        ];

        let merged = merge_requests(&engine, &window);
        assert_eq!(merged.len(), 3);
        assert_eq!(merged[0], FeatureRequest::optional("VK_KHR_surface"));
        assert_eq!(merged[1].name, "VK_EXT_debug_utils");
        assert_eq!(merged[2], FeatureRequest::required("VK_KHR_xcb_surface"));
    }

    #[test]
    fn merge_drops_duplicates_within_one_list() {
        let window = [
            FeatureRequest::required("VK_KHR_surface"),
            FeatureRequest::required("VK_KHR_surface"),
        ];

        let merged = merge_requests(&[], &window);
        assert_eq!(merged, vec![FeatureRequest::required("VK_KHR_surface")]);
    }

    #[test]
    fn interior_nul_is_rejected() {
        let names = vec!["VK_OK".to_string(), "bad\0name".to_string()];
        assert!(matches!(to_cstrings(&names), Err(BootstrapError::InvalidName(_))));
    }
}
