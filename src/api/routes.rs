//! API route handlers

use crate::api::AppState;
use crate::error::{Error, Result};
use crate::job::{Job, JobSnapshot, Subscription};
use axum::{
    Json,
    extract::{OriginalUri, State},
    http::{StatusCode, header},
    response::{
        Html, IntoResponse,
        sse::{Event, KeepAlive, Sse},
    },
};
use futures::stream::{self, Stream, StreamExt};
use std::convert::Infallible;
use std::sync::Arc;
use utoipa::OpenApi;

/// Embedded landing page served for unmatched routes
const INDEX_HTML: &str = include_str!("../../static/index.html");

/// Get snapshots of all live download jobs
///
/// Debug endpoint: shows what the registry currently tracks.
#[utoipa::path(
    get,
    path = "/state",
    responses(
        (status = 200, description = "Snapshots of all live jobs", body = [JobSnapshot])
    ),
    tag = "system"
)]
pub async fn registry_state(State(state): State<AppState>) -> Json<Vec<JobSnapshot>> {
    Json(state.registry.snapshots())
}

/// Delete all download directories not belonging to a live job
///
/// Ignores the retention age threshold; only registry liveness protects a
/// directory. Responds with the deleted directory names, one per line.
#[utoipa::path(
    get,
    path = "/clear",
    responses(
        (status = 200, description = "Names of deleted directories, one per line", body = String)
    ),
    tag = "system"
)]
pub async fn clear_downloads(State(state): State<AppState>) -> impl IntoResponse {
    let deleted = state.sweeper.sweep(false).await;
    tracing::info!(count = deleted.len(), "cleared download directories");

    let mut body = deleted.join("\n");
    if !body.is_empty() {
        body.push('\n');
    }
    (
        [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
        body,
    )
}

/// Stream download progress for a target URL over SSE
///
/// The target URL is everything after the `/yt-dlp/` prefix, query string
/// included. The URL is resolved to a media id; if no job exists for that id
/// one is created and a download is started, otherwise the caller attaches to
/// the existing job. Progress lines arrive as `data:` events; the stream
/// closes with a `finished` data event followed by an `end` event carrying
/// the public media path.
#[utoipa::path(
    get,
    path = "/yt-dlp/{url}",
    params(
        ("url" = String, Path, description = "Media page URL to download")
    ),
    responses(
        (status = 200, description = "SSE stream of progress lines", content_type = "text/event-stream"),
        (status = 400, description = "Empty or malformed target URL", body = crate::error::ApiError),
        (status = 502, description = "The target URL could not be resolved to a media id", body = crate::error::ApiError)
    ),
    tag = "downloads"
)]
pub async fn stream_download(
    State(state): State<AppState>,
    OriginalUri(uri): OriginalUri,
) -> Result<impl IntoResponse> {
    // raw path + query so embedded URLs survive untouched
    let target = uri
        .path_and_query()
        .map(|pq| pq.as_str())
        .unwrap_or_else(|| uri.path());
    let target = target
        .strip_prefix("/yt-dlp/")
        .unwrap_or(target)
        .to_string();
    if target.is_empty() {
        return Err(Error::InvalidRequest("empty target url".to_string()));
    }

    let id = state.source.resolve_id(&target).await?;
    tracing::info!(id = %id, target = %target, "resolved download target");

    let (job, created) = state.registry.get_or_create(&id);
    if created {
        spawn_download(&state, &target, Arc::clone(&job));
    }

    let subscription = job.subscribe();
    Ok(Sse::new(progress_events(subscription)).keep_alive(KeepAlive::default()))
}

/// Spawn the detached task that drives a newly created job to completion
///
/// Runs regardless of whether any listener stays attached. Whatever the
/// outcome, the job is marked done (closing all listener streams) and then
/// removed from the registry, in that order, so no listener can attach to an
/// untracked job.
fn spawn_download(state: &AppState, target: &str, job: Arc<Job>) {
    let source = Arc::clone(&state.source);
    let registry = state.registry.clone();
    let target = target.to_string();

    tokio::spawn(async move {
        if let Err(e) = source.download(&target, Arc::clone(&job)).await {
            tracing::error!(id = %job.id(), error = %e, "download failed");
        }
        job.mark_done();
        registry.remove(job.id());
    });
}

/// Turn a job subscription into the SSE wire format
///
/// Progress lines become plain `data:` events. When the subscription ends the
/// stream appends `data: finished` and then an `end` event whose data is the
/// job's public media path (empty if none was discovered).
fn progress_events(
    subscription: Subscription,
) -> impl Stream<Item = std::result::Result<Event, Infallible>> {
    let job = Arc::clone(subscription.job());

    subscription
        .map(|line| Ok(Event::default().data(line)))
        .chain(stream::once(async {
            Ok(Event::default().data("finished"))
        }))
        .chain(stream::once(async move {
            Ok(Event::default()
                .event("end")
                .data(job.media_path().unwrap_or_default()))
        }))
}

/// Serve the OpenAPI specification as JSON
#[utoipa::path(
    get,
    path = "/openapi.json",
    responses(
        (status = 200, description = "OpenAPI specification")
    ),
    tag = "system"
)]
pub async fn openapi_spec() -> Json<utoipa::openapi::OpenApi> {
    Json(crate::api::ApiDoc::openapi())
}

/// Browsers ask for this constantly; there is no icon
pub async fn favicon() -> StatusCode {
    StatusCode::NOT_FOUND
}

/// Fallback: serve the embedded landing page
pub async fn index() -> Html<&'static str> {
    Html(INDEX_HTML)
}
