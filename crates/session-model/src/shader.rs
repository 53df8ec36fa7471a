//! Render target identity.
//!
//! A target is a page whose URL matches `…/view/<id>[?…][#…]`. The id
//! namespaces captured frames on disk, so extraction must be deterministic
//! and must never return path separators.

use serde::{Deserialize, Serialize};

const VIEW_SEGMENT: &str = "/view/";

/// Extract the target id from a shader URL.
///
/// Returns an empty string when the URL does not point at a renderable target.
pub fn extract_shader_id(url: &str) -> String {
    let Some(pos) = url.find(VIEW_SEGMENT) else {
        return String::new();
    };
    let rest = &url[pos + VIEW_SEGMENT.len()..];
    let end = rest.find(['/', '?', '#']).unwrap_or(rest.len());
    let id = &rest[..end];

    if id.is_empty() || id.contains('\\') || id == "." || id == ".." {
        return String::new();
    }
    id.to_string()
}

/// Whether a URL points at a renderable target.
pub fn is_shader_url(url: &str) -> bool {
    !extract_shader_id(url).is_empty()
}

/// The target currently loaded in the render surface.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShaderSession {
    /// Last known URL of the target.
    pub source_url: String,

    /// Id parsed from `source_url`; empty if undetectable.
    pub shader_id: String,

    /// The target's runtime object was found by the last readiness check.
    pub is_ready: bool,

    /// The control script is injected and the target can be captured.
    pub is_loaded: bool,
}

impl ShaderSession {
    /// A pending session for `url`, not yet checked or injected.
    pub fn pending(url: impl Into<String>) -> Self {
        let source_url = url.into();
        let shader_id = extract_shader_id(&source_url);
        Self {
            source_url,
            shader_id,
            is_ready: false,
            is_loaded: false,
        }
    }

    /// Point the session at a new URL, resetting readiness.
    pub fn retarget(&mut self, url: impl Into<String>) {
        *self = Self::pending(url);
    }

    /// Mark the session as unusable until the next successful load.
    pub fn mark_unloaded(&mut self) {
        self.is_ready = false;
        self.is_loaded = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_extract_plain_id() {
        assert_eq!(extract_shader_id("https://host/view/abc123"), "abc123");
    }

    #[test]
    fn test_extract_strips_query_and_fragment() {
        assert_eq!(extract_shader_id("https://host/view/abc123?x=1#y"), "abc123");
        assert_eq!(extract_shader_id("https://host/view/abc123#frag"), "abc123");
        assert_eq!(extract_shader_id("https://host/view/abc123/embed"), "abc123");
    }

    #[test]
    fn test_extract_without_view_segment_is_empty() {
        assert_eq!(extract_shader_id("https://host/"), "");
        assert_eq!(extract_shader_id("https://host/view/"), "");
        assert_eq!(extract_shader_id("https://host/view/?x=1"), "");
        assert_eq!(extract_shader_id(""), "");
    }

    #[test]
    fn test_extract_rejects_traversal_ids() {
        assert_eq!(extract_shader_id("https://host/view/.."), "");
        assert!(!is_shader_url("https://host/view/./"));
    }

    #[test]
    fn test_pending_session_derives_id() {
        let session = ShaderSession::pending("https://www.shadertoy.com/view/XsXXDn");
        assert_eq!(session.shader_id, "XsXXDn");
        assert!(!session.is_ready);
        assert!(!session.is_loaded);
    }

    #[test]
    fn test_retarget_resets_flags() {
        let mut session = ShaderSession::pending("https://host/view/a");
        session.is_ready = true;
        session.is_loaded = true;
        session.retarget("https://host/view/b");
        assert_eq!(session.shader_id, "b");
        assert!(!session.is_loaded);
    }

    proptest! {
        #[test]
        fn extracted_id_survives_suffixes(id in "[A-Za-z0-9_-]{1,16}", query in "[a-z0-9=&]{0,10}", frag in "[a-z0-9]{0,8}") {
            let url = format!("https://www.example.com/view/{id}?{query}#{frag}");
            prop_assert_eq!(extract_shader_id(&url), id);
        }

        #[test]
        fn extracted_id_never_contains_separators(url in ".{0,64}") {
            let id = extract_shader_id(&url);
            prop_assert!(!id.contains('/'));
            prop_assert!(!id.contains('?'));
            prop_assert!(!id.contains('#'));
        }
    }
}
