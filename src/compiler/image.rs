//! Image reference helpers

use glob::{MatchOptions, Pattern};

/// Default clone plugin
pub const DEFAULT_CLONER: &str = "plugins/drone-git";

/// Default cache plugin
pub const DEFAULT_CACHER: &str = "plugins/drone-cache";

/// Default plugin whitelist pattern
pub const DEFAULT_WHITELIST: &str = "plugins/*";

/// Publish images allowed to run privileged regardless of trust
pub const ESCALATED_IMAGES: &[&str] = &["plugins/drone-docker", "plugins/drone-gcr"];

const PLUGIN_NAMESPACE: &str = "plugins";
const PLUGIN_PREFIX: &str = "drone-";

/// Expands a bare plugin alias to a fully qualified image name.
///
/// `azure_storage` becomes `plugins/drone-azure-storage`.
#[must_use]
pub fn expand_image(image: &str) -> String {
    let image = if image.contains('/') {
        image.to_string()
    } else {
        format!("{PLUGIN_NAMESPACE}/{PLUGIN_PREFIX}{image}")
    };
    image.replace('_', "-")
}

/// Expands `image`, or returns `default` when it is empty
#[must_use]
pub fn expand_image_default(image: &str, default: &str) -> String {
    if image.is_empty() {
        default.to_string()
    } else {
        expand_image(image)
    }
}

/// Appends `:latest` when the image has neither a tag nor a digest
#[must_use]
pub fn expand_image_tag(image: &str) -> String {
    if image.contains('@') {
        return image.to_string();
    }
    match image.rfind(':') {
        Some(n) if !image[n + 1..].contains('/') => image.to_string(),
        _ => format!("{image}:latest"),
    }
}

/// Path-style glob match where `*` does not cross `/`
#[must_use]
pub fn glob_match(pattern: &str, name: &str) -> bool {
    let options = MatchOptions {
        case_sensitive: true,
        require_literal_separator: true,
        require_literal_leading_dot: false,
    };
    match Pattern::new(pattern) {
        Ok(p) => p.matches_with(name, options),
        Err(e) => {
            tracing::debug!(pattern = %pattern, error = %e, "Ignoring invalid glob pattern");
            false
        }
    }
}

/// Returns true if the image base is on the escalation list
#[must_use]
pub fn is_escalated(image: &str) -> bool {
    ESCALATED_IMAGES.contains(&crate::pipeline::image_base(image))
}
