use anyhow::{Context as _, Result as AnyhowResult};
use octocrab::{Octocrab, service::middleware::retry::RetryConfig};
use serde::Deserialize;

/// A repository as reported by the `/users/{user}/repos` listing.
#[derive(Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct GithubRepo {
    pub name: String,
    // URI template, e.g. `https://api.github.com/repos/o/r/branches{/branch}`
    pub branches_url: String,
}

#[derive(Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct GithubBranch {
    pub name: String,
}

#[derive(thiserror::Error, Debug)]
pub enum ApiError {
    #[error("transport error: {0}")]
    Transport(String),
    /// GitHub answered with a non-success status; holds the payload's `message`.
    #[error("{0}")]
    Remote(String),
    #[error("failed to decode response: {0}")]
    Decode(String),
    #[error("no response within {0:?}")]
    Timeout(std::time::Duration),
}

impl From<octocrab::Error> for ApiError {
    fn from(err: octocrab::Error) -> Self {
        match err {
            octocrab::Error::GitHub { source, .. } => ApiError::Remote(source.message),
            octocrab::Error::Serde { source, .. } => ApiError::Decode(source.to_string()),
            octocrab::Error::Json { source, .. } => ApiError::Decode(source.to_string()),
            octocrab::Error::Service { source, .. } => ApiError::Transport(source.to_string()),
            octocrab::Error::Hyper { source, .. } => ApiError::Transport(source.to_string()),
            // octocrab's Display appends a captured backtrace; keep the headline only
            other => ApiError::Transport(first_line(&other.to_string())),
        }
    }
}

fn first_line(message: &str) -> String {
    message.lines().next().unwrap_or_default().trim().to_string()
}

/// Source of branch lists, one call per repository.
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait BranchFetcher: Send + Sync {
    /// Fetches the branches behind a concrete (already normalized) branch-list URL.
    async fn fetch_branches(&self, branches_url: &str) -> Result<Vec<GithubBranch>, ApiError>;
}

pub struct GithubClient {
    crab: Octocrab,
}

impl GithubClient {
    pub fn new(base_url: &str) -> AnyhowResult<Self> {
        let crab = Octocrab::builder()
            .base_uri(base_url)
            .with_context(|| format!("Invalid GitHub API base URL: {}", base_url))?
            .add_retry_config(RetryConfig::None)
            .build()
            .with_context(|| "Failed to create Octocrab instance")?;
        Ok(Self { crab })
    }

    pub async fn get_repositories(&self, user: &str) -> Result<Vec<GithubRepo>, ApiError> {
        let route = format!("/users/{}/repos", user);
        let repos: Vec<GithubRepo> = self.crab.get(route, None::<&()>).await?;
        tracing::debug!(user, count = repos.len(), "listed repositories");
        Ok(repos)
    }
}

#[async_trait::async_trait]
impl BranchFetcher for GithubClient {
    async fn fetch_branches(&self, branches_url: &str) -> Result<Vec<GithubBranch>, ApiError> {
        let branches: Vec<GithubBranch> = self.crab.get(branches_url, None::<&()>).await?;
        Ok(branches)
    }
}

/// Strips the URI template segment (`{/branch}`) from a `branches_url`.
/// URLs without a template are returned unchanged.
pub fn prepare_branch_url(url: &str) -> &str {
    match url.find('{') {
        Some(idx) => &url[..idx],
        None => url,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{Json, Router, http::StatusCode, routing::get};
    use serde_json::json;

    async fn serve(app_for: impl FnOnce(String) -> Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let base = format!("http://{}", listener.local_addr().unwrap());
        let app = app_for(base.clone());
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        base
    }

    #[test]
    fn prepare_branch_url_strips_template() {
        assert_eq!(
            prepare_branch_url("https://api.github.com/repos/octo/a/branches{/branch}"),
            "https://api.github.com/repos/octo/a/branches"
        );
    }

    #[test]
    fn prepare_branch_url_passes_through_without_template() {
        let url = "https://api.github.com/repos/octo/a/branches";
        assert_eq!(prepare_branch_url(url), url);
        assert_eq!(prepare_branch_url("{/branch}"), "");
    }

    #[tokio::test]
    async fn lists_repositories() {
        let base = serve(|base| {
            let body = json!([
                {"name": "a", "branches_url": format!("{base}/repos/octo/a/branches{{/branch}}"), "private": false},
                {"name": "b", "branches_url": format!("{base}/repos/octo/b/branches{{/branch}}")},
            ]);
            Router::new().route("/users/octo/repos", get(move || async move { Json(body) }))
        })
        .await;

        let client = GithubClient::new(&base).unwrap();
        let repos = client.get_repositories("octo").await.unwrap();
        assert_eq!(repos.len(), 2);
        assert_eq!(repos[0].name, "a");
        assert_eq!(
            prepare_branch_url(&repos[1].branches_url),
            format!("{base}/repos/octo/b/branches")
        );
    }

    #[tokio::test]
    async fn empty_listing_is_not_an_error() {
        let base = serve(|_| {
            Router::new().route("/users/nobody/repos", get(|| async { Json(json!([])) }))
        })
        .await;

        let client = GithubClient::new(&base).unwrap();
        assert!(client.get_repositories("nobody").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn fetches_branches_from_absolute_url() {
        let base = serve(|_| {
            Router::new().route(
                "/repos/octo/a/branches",
                get(|| async {
                    Json(json!([
                        {"name": "main", "commit": {"sha": "abc"}},
                        {"name": "dev", "protected": false}
                    ]))
                }),
            )
        })
        .await;

        let client = GithubClient::new("http://unused.invalid").unwrap();
        let branches = client
            .fetch_branches(&format!("{base}/repos/octo/a/branches"))
            .await
            .unwrap();
        let names: Vec<_> = branches.into_iter().map(|b| b.name).collect();
        assert_eq!(names, vec!["main", "dev"]);
    }

    #[tokio::test]
    async fn not_found_surfaces_remote_message() {
        let base = serve(|_| {
            Router::new().route(
                "/repos/octo/b/branches",
                get(|| async { (StatusCode::NOT_FOUND, Json(json!({"message": "Not Found"}))) }),
            )
        })
        .await;

        let client = GithubClient::new(&base).unwrap();
        let err = client
            .fetch_branches(&format!("{base}/repos/octo/b/branches"))
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::Remote(_)));
        assert_eq!(err.to_string(), "Not Found");
    }

    #[tokio::test]
    async fn listing_failure_is_remote_error() {
        let base = serve(|_| {
            Router::new().route(
                "/users/ghost/repos",
                get(|| async { (StatusCode::NOT_FOUND, Json(json!({"message": "Not Found"}))) }),
            )
        })
        .await;

        let client = GithubClient::new(&base).unwrap();
        let err = client.get_repositories("ghost").await.unwrap_err();
        assert!(matches!(err, ApiError::Remote(ref m) if m == "Not Found"));
    }

    #[tokio::test]
    async fn undecodable_error_payload_is_decode_error() {
        let base = serve(|_| {
            Router::new().route(
                "/repos/octo/c/branches",
                get(|| async { (StatusCode::FORBIDDEN, "<html>rate limited</html>") }),
            )
        })
        .await;

        let client = GithubClient::new(&base).unwrap();
        let err = client
            .fetch_branches(&format!("{base}/repos/octo/c/branches"))
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::Decode(_)), "got {err:?}");
    }

    #[tokio::test]
    async fn misshapen_body_is_decode_error() {
        let base = serve(|_| {
            Router::new().route(
                "/repos/octo/d/branches",
                get(|| async { Json(json!({"name": "main"})) }),
            )
        })
        .await;

        let client = GithubClient::new(&base).unwrap();
        let err = client
            .fetch_branches(&format!("{base}/repos/octo/d/branches"))
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::Decode(_)), "got {err:?}");
    }

    #[tokio::test]
    async fn refused_connection_is_transport_error() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let client = GithubClient::new(&format!("http://{addr}")).unwrap();
        let err = client.get_repositories("octo").await.unwrap_err();
        assert!(matches!(err, ApiError::Transport(_)), "got {err:?}");
    }

    #[tokio::test]
    async fn transport_reason_fits_on_one_line() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let client = GithubClient::new("http://unused.invalid").unwrap();
        let err = client
            .fetch_branches(&format!("http://{addr}/repos/octo/b/branches"))
            .await
            .unwrap_err();
        let reason = err.to_string();
        assert_eq!(reason.lines().count(), 1, "reason spans lines: {reason}");
        assert!(reason.starts_with("transport error: "));
    }

    #[test]
    fn first_line_drops_trailing_backtrace() {
        assert_eq!(
            first_line("Service Error: client error (Connect)\nFound at:\n   0: octocrab::..."),
            "Service Error: client error (Connect)"
        );
        assert_eq!(first_line(""), "");
    }
}
