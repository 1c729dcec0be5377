use anyhow::{Context, Result};
use axum::body::Body;
use axum::extract::{DefaultBodyLimit, Multipart, State};
use axum::http::{HeaderMap, HeaderValue, Method, Request, Response, StatusCode};
use axum::middleware::Next;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use std::sync::Arc;
use tracing::info;

use super::models::{ServerError, StyleRequest, TextRequest};
use super::state::ServerState;
use crate::annotate::{
    Canvas, ImageAnnotator, RemixOutcome, RemixedImage, invalid_image_message,
};
use crate::lookup::{Lookup, LookupResponse};
use crate::providers::Provider;
use crate::translations::{ImageReading, StyleRewrite};

const MAX_UPLOAD_BYTES: usize = 20 * 1024 * 1024;

pub fn router<P: Provider + 'static>(lookup: Lookup<P>, annotator: ImageAnnotator) -> Router {
    let state = Arc::new(ServerState { lookup, annotator });
    Router::new()
        .route("/health", get(health))
        .route("/process_text", post(process_text::<P>))
        .route("/translate_style", post(translate_style::<P>))
        .route("/process_image", post(process_image::<P>))
        .route("/remix_image", post(remix_image::<P>))
        .with_state(state)
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
        .layer(axum::middleware::from_fn(cors_middleware))
}

pub async fn run_server<P: Provider + 'static>(
    lookup: Lookup<P>,
    annotator: ImageAnnotator,
    addr: &str,
) -> Result<()> {
    let app = router(lookup, annotator);
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind server address: {}", addr))?;
    info!("listening on {}", addr);
    axum::serve(listener, app).await?;
    Ok(())
}

async fn health() -> impl IntoResponse {
    (StatusCode::OK, Json(serde_json::json!({ "status": "ok" })))
}

async fn cors_middleware(req: Request<Body>, next: Next) -> Result<Response<Body>, StatusCode> {
    if req.method() == Method::OPTIONS {
        let mut response = Response::new(Body::empty());
        *response.status_mut() = StatusCode::NO_CONTENT;
        apply_cors_headers(response.headers_mut());
        return Ok(response);
    }
    let mut response = next.run(req).await;
    apply_cors_headers(response.headers_mut());
    Ok(response)
}

fn apply_cors_headers(headers: &mut HeaderMap) {
    headers.insert("access-control-allow-origin", HeaderValue::from_static("*"));
    headers.insert(
        "access-control-allow-methods",
        HeaderValue::from_static("GET,POST,OPTIONS"),
    );
    headers.insert(
        "access-control-allow-headers",
        HeaderValue::from_static("content-type"),
    );
}

async fn process_text<P: Provider + 'static>(
    State(state): State<Arc<ServerState<P>>>,
    Json(payload): Json<TextRequest>,
) -> Result<Json<LookupResponse>, ServerError> {
    if payload.text.trim().is_empty() {
        return Err(ServerError::bad_request("text is required"));
    }
    let response = state.lookup.process_text(&payload.text).await?;
    Ok(Json(response))
}

async fn translate_style<P: Provider + 'static>(
    State(state): State<Arc<ServerState<P>>>,
    Json(payload): Json<StyleRequest>,
) -> Result<Json<StyleRewrite>, ServerError> {
    if payload.text.trim().is_empty() {
        return Err(ServerError::bad_request("text is required"));
    }
    if payload.style.trim().is_empty() {
        return Err(ServerError::bad_request("style is required"));
    }
    let rewrite = state
        .lookup
        .translator()
        .style(&payload.text, &payload.style)
        .await?;
    Ok(Json(rewrite))
}

async fn process_image<P: Provider + 'static>(
    State(state): State<Arc<ServerState<P>>>,
    multipart: Multipart,
) -> Result<Json<ImageReading>, ServerError> {
    let bytes = read_upload(multipart).await?;
    let (_, png) = prepare_canvas(bytes).await?;
    let reading = state.lookup.translator().read_image(png).await?;
    Ok(Json(reading))
}

async fn remix_image<P: Provider + 'static>(
    State(state): State<Arc<ServerState<P>>>,
    multipart: Multipart,
) -> Result<Json<RemixedImage>, ServerError> {
    let bytes = read_upload(multipart).await?;
    let (canvas, png) = prepare_canvas(bytes).await?;
    let reading = state.lookup.translator().read_image(png).await?;
    info!("remixing {} region(s)", reading.regions.len());

    let annotator = state.annotator.clone();
    let outcome = tokio::task::spawn_blocking(move || annotator.remix(&canvas, &reading.regions))
        .await
        .map_err(join_error)?;
    match outcome {
        RemixOutcome::Remixed(remixed) => Ok(Json(remixed)),
        RemixOutcome::Failed { error } => Err(ServerError::internal(error)),
    }
}

async fn read_upload(mut multipart: Multipart) -> Result<Vec<u8>, ServerError> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|err| ServerError::bad_request(format!("invalid multipart body: {}", err)))?
    {
        if field.name() != Some("file") {
            continue;
        }
        let bytes = field
            .bytes()
            .await
            .map_err(|err| ServerError::bad_request(format!("failed to read upload: {}", err)))?;
        return Ok(bytes.to_vec());
    }
    Err(ServerError::bad_request("file field is required"))
}

/// Decodes the upload off the async path and re-encodes the bounded canvas
/// as the PNG the model reads, so region boxes line up with the canvas.
async fn prepare_canvas(bytes: Vec<u8>) -> Result<(Canvas, Vec<u8>), ServerError> {
    tokio::task::spawn_blocking(move || {
        let canvas = Canvas::decode(&bytes)
            .map_err(|err| ServerError::bad_request(invalid_image_message(&err)))?;
        let png = canvas.to_png()?;
        Ok::<_, ServerError>((canvas, png))
    })
    .await
    .map_err(join_error)?
}

fn join_error(err: tokio::task::JoinError) -> ServerError {
    ServerError::internal(format!("server task failed: {}", err))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::annotate::OverlayFont;
    use crate::cache::ResultCache;
    use crate::test_util::TestProvider;
    use crate::translator::Translator;
    use axum::extract::FromRequest;
    use image::{Rgba, RgbaImage};
    use serde_json::{Value, json};

    fn state(response: Value, dir: &std::path::Path) -> Arc<ServerState<TestProvider>> {
        Arc::new(ServerState {
            lookup: Lookup::new(
                Translator::new(TestProvider::new(response)),
                ResultCache::new(dir),
            ),
            annotator: ImageAnnotator::new(OverlayFont::none()),
        })
    }

    async fn upload(bytes: &[u8]) -> Multipart {
        let boundary = "verbabridge-boundary";
        let mut body = format!(
            "--{boundary}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"menu.png\"\r\nContent-Type: image/png\r\n\r\n"
        )
        .into_bytes();
        body.extend_from_slice(bytes);
        body.extend_from_slice(format!("\r\n--{boundary}--\r\n").as_bytes());
        let request = Request::builder()
            .method(Method::POST)
            .uri("/remix_image")
            .header(
                "content-type",
                format!("multipart/form-data; boundary={}", boundary),
            )
            .body(Body::from(body))
            .expect("request");
        Multipart::from_request(request, &()).await.expect("multipart")
    }

    fn menu_png() -> Vec<u8> {
        let image = RgbaImage::from_pixel(200, 100, Rgba([250, 250, 240, 255]));
        Canvas::from_rgba(image).to_png().expect("png")
    }

    #[tokio::test]
    async fn blank_text_is_bad_request() {
        let dir = tempfile::tempdir().expect("tempdir");
        let err = process_text(
            State(state(json!({}), dir.path())),
            Json(TextRequest {
                text: "  ".to_string(),
            }),
        )
        .await
        .unwrap_err();
        assert_eq!(err.status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn malformed_model_answer_is_bad_gateway() {
        let dir = tempfile::tempdir().expect("tempdir");
        let err = translate_style(
            State(state(json!({"style": "Gen Alpha"}), dir.path())),
            Json(StyleRequest {
                text: "I failed".to_string(),
                style: "Gen Alpha".to_string(),
            }),
        )
        .await
        .unwrap_err();
        assert_eq!(err.status, StatusCode::BAD_GATEWAY);
    }

    #[tokio::test]
    async fn remix_paints_model_regions() {
        let dir = tempfile::tempdir().expect("tempdir");
        let response = json!({
            "detected_text": "KOPI O",
            "translations": [],
            "regions": [
                {"original_text": "KOPI O", "translated_text": "Black coffee", "box_2d": [100, 100, 500, 500]},
                {"original_text": "x", "translated_text": "x", "box_2d": [500, 500, 100, 100]}
            ]
        });
        let Json(remixed) = remix_image(State(state(response, dir.path())), upload(&menu_png()).await)
            .await
            .expect("remix");
        assert_eq!(remixed.item_count, 1);
        assert_eq!(remixed.original_text, "KOPI O");
        assert!(remixed.remixed_image.starts_with("data:image/png;base64,"));
    }

    #[tokio::test]
    async fn undecodable_upload_is_invalid_image() {
        let dir = tempfile::tempdir().expect("tempdir");
        let err = process_image(
            State(state(json!({}), dir.path())),
            upload(b"not an image").await,
        )
        .await
        .unwrap_err();
        assert_eq!(err.status, StatusCode::BAD_REQUEST);
        assert!(err.message.starts_with("Invalid Image: "), "{}", err.message);
    }
}
