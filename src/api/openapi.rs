//! OpenAPI documentation for the API

use crate::error::{ApiError, ErrorDetail};
use crate::job::JobSnapshot;
use utoipa::OpenApi;

/// OpenAPI documentation root
#[derive(OpenApi)]
#[openapi(
    info(
        title = "ytdl-relay API",
        description = "Relay yt-dlp download progress to any number of clients over Server-Sent Events",
        license(name = "MIT OR Apache-2.0")
    ),
    paths(
        crate::api::routes::registry_state,
        crate::api::routes::clear_downloads,
        crate::api::routes::stream_download,
        crate::api::routes::openapi_spec,
    ),
    components(schemas(JobSnapshot, ApiError, ErrorDetail)),
    tags(
        (name = "downloads", description = "Starting downloads and observing their progress"),
        (name = "system", description = "Debug and maintenance endpoints")
    )
)]
pub struct ApiDoc;

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_openapi_spec_includes_routes() {
        let spec = ApiDoc::openapi();
        let json = serde_json::to_string(&spec).unwrap();

        assert!(json.contains("/state"));
        assert!(json.contains("/clear"));
        assert!(json.contains("/yt-dlp/{url}"));
        assert!(json.contains("JobSnapshot"));
    }
}
