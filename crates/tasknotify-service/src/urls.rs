//! URL helpers for deployment root URLs.

/// Root URL of the legacy deployment, whose services live on subdomains.
const LEGACY_ROOT_URL: &str = "https://taskcluster.net";

fn normalize_root(root_url: &str) -> &str {
    root_url.trim_end_matches('/')
}

fn is_legacy(root_url: &str) -> bool {
    normalize_root(root_url) == LEGACY_ROOT_URL
}

/// User-facing URL for `path` (e.g. `tasks/<taskId>`).
pub fn ui(root_url: &str, path: &str) -> String {
    let path = path.trim_start_matches('/');
    if is_legacy(root_url) {
        format!("https://tools.taskcluster.net/{path}")
    } else {
        format!("{}/{path}", normalize_root(root_url))
    }
}

/// API URL for `path` on `service` at `version`.
pub fn api(root_url: &str, service: &str, version: &str, path: &str) -> String {
    let path = path.trim_start_matches('/');
    if is_legacy(root_url) {
        format!("https://{service}.taskcluster.net/{version}/{path}")
    } else {
        format!(
            "{}/api/{service}/{version}/{path}",
            normalize_root(root_url)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ui_url() {
        assert_eq!(
            ui("https://tc.example.com/", "/tasks/abc"),
            "https://tc.example.com/tasks/abc"
        );
        assert_eq!(
            ui("https://taskcluster.net", "groups/abc/tasks"),
            "https://tools.taskcluster.net/groups/abc/tasks"
        );
    }

    #[test]
    fn test_api_url() {
        assert_eq!(
            api("https://tc.example.com", "queue", "v1", "task/abc"),
            "https://tc.example.com/api/queue/v1/task/abc"
        );
        assert_eq!(
            api("https://taskcluster.net/", "notify", "v1", "irc"),
            "https://notify.taskcluster.net/v1/irc"
        );
    }
}
