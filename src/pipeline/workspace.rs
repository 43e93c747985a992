//! Workspace path resolution

use url::Url;

use super::config::Config;

/// Default workspace root inside build containers
pub const DEFAULT_WORKSPACE_ROOT: &str = "/drone/src";

/// Resolves the clone path for a build.
///
/// The clone step's `path` argument wins; relative paths are placed under
/// `root`. Without one, the path is derived from the repository link's
/// host and path, ignoring any port. Malformed links fall back to `root`.
#[must_use]
pub fn workspace_path(config: &Config, repo_link: &str, root: &str) -> String {
    let root = root.trim_end_matches('/');

    if let Some(path) = config
        .clone
        .step
        .vargs
        .get("path")
        .and_then(serde_json::Value::as_str)
        .filter(|p| !p.is_empty())
    {
        if path.starts_with(root) {
            return path.to_string();
        }
        return format!("{root}/{}", path.trim_start_matches('/'));
    }

    match Url::parse(repo_link) {
        Ok(url) => match url.host_str() {
            Some(host) => {
                let path = url.path().trim_matches('/');
                if path.is_empty() {
                    format!("{root}/{host}")
                } else {
                    format!("{root}/{host}/{path}")
                }
            }
            None => root.to_string(),
        },
        Err(e) => {
            tracing::debug!(link = %repo_link, error = %e, "Unable to parse repository link");
            root.to_string()
        }
    }
}
