//! Print endpoints: `print.pdf`, `create.json`, `info.json` and ticket fetches.

use std::net::SocketAddr;

use axum::{
    body::{self, Body},
    extract::{ConnectInfo, OriginalUri, Query, Request, State},
    http::{
        HeaderMap, HeaderValue, Method, StatusCode, Uri,
        header::{CONTENT_DISPOSITION, CONTENT_LENGTH, CONTENT_TYPE, HOST},
        request::Parts,
    },
    response::{IntoResponse, Response},
};
use async_stream::stream;
use bytes::Bytes;
use serde::Deserialize;
use serde_json::json;
use tokio::io::AsyncReadExt;
use tracing::debug;

use crate::{
    application::{
        error::HttpError,
        print::{Delivery, PrintRequest, SpecPayload},
    },
    domain::handle::{handle_from_ticket, ticket_file_name},
};

use super::PrintState;

const JSON_CONTENT_TYPE: &str = "application/json; charset=utf-8";
const FALLBACK_CONTENT_TYPE: &str = "application/octet-stream";
const STREAM_CHUNK_SIZE: usize = 64 * 1024;

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct PrintQuery {
    spec: Option<String>,
    inline: Option<String>,
    url: Option<String>,
    app: Option<String>,
    var: Option<String>,
}

impl PrintQuery {
    fn from_uri(source: &'static str, uri: &Uri) -> Result<Self, HttpError> {
        Query::<PrintQuery>::try_from_uri(uri)
            .map(|Query(query)| query)
            .map_err(|err| HttpError::from_error(source, StatusCode::BAD_REQUEST, &err))
    }

    /// Only a case-insensitive `true` enables inline delivery.
    fn inline(&self) -> bool {
        self.inline
            .as_deref()
            .is_some_and(|value| value.trim().eq_ignore_ascii_case("true"))
    }

    fn app(&self) -> Option<&str> {
        self.app.as_deref().filter(|app| !app.is_empty())
    }
}

/// Submit-and-wait: render and return the document in the same response.
pub(super) async fn print_document(State(state): State<PrintState>, request: Request) -> Response {
    const SOURCE: &str = "infra::http::print::print_document";

    let (parts, body) = request.into_parts();
    let query = match PrintQuery::from_uri(SOURCE, &parts.uri) {
        Ok(query) => query,
        Err(err) => return err.into_response(),
    };
    let inline = query.inline();

    let spec = match spec_payload(SOURCE, &state, &parts, query.spec, body).await {
        Ok(spec) => spec,
        Err(err) => return err.into_response(),
    };

    match state
        .print
        .render_synchronous(print_request(spec, &parts))
        .await
    {
        Ok(delivery) => delivery_response(delivery, inline),
        Err(err) => HttpError::from(err).into_response(),
    }
}

/// Submit-and-ticket: render, publish, and answer with the fetch URL.
pub(super) async fn create_ticket(State(state): State<PrintState>, request: Request) -> Response {
    const SOURCE: &str = "infra::http::print::create_ticket";

    let (parts, body) = request.into_parts();
    let query = match PrintQuery::from_uri(SOURCE, &parts.uri) {
        Ok(query) => query,
        Err(err) => return err.into_response(),
    };
    let base_url = base_url(&state, query.url.as_deref(), &parts);

    let spec = match spec_payload(SOURCE, &state, &parts, query.spec, body).await {
        Ok(spec) => spec,
        Err(err) => return err.into_response(),
    };

    match state.print.render_async(print_request(spec, &parts)).await {
        Ok(ticket) => {
            let get_url = format!("{base_url}/{}", ticket_file_name(&ticket.handle));
            json_response(json!({ "getURL": get_url }).to_string())
        }
        Err(err) => HttpError::from(err).into_response(),
    }
}

/// Capability document, optionally wrapped as `var=<json>;`.
pub(super) async fn info(State(state): State<PrintState>, request: Request) -> Response {
    const SOURCE: &str = "infra::http::print::info";

    let (parts, _body) = request.into_parts();
    let query = match PrintQuery::from_uri(SOURCE, &parts.uri) {
        Ok(query) => query,
        Err(err) => return err.into_response(),
    };
    let base_url = base_url(&state, query.url.as_deref(), &parts);
    let document = state.print.capabilities(query.app(), &base_url).to_string();

    match query.var.as_deref() {
        None => json_response(document),
        Some(var) if is_script_identifier(var) => json_response(format!("{var}={document};")),
        Some(var) => HttpError::new(
            SOURCE,
            StatusCode::BAD_REQUEST,
            format!("Invalid 'var' parameter: {var}"),
        )
        .into_response(),
    }
}

/// Everything the explicit routes do not claim: ticket fetches on GET,
/// otherwise an unknown method.
pub(super) async fn fetch_or_unknown(
    State(state): State<PrintState>,
    request: Request,
) -> Response {
    const SOURCE: &str = "infra::http::print::fetch";

    let (parts, _body) = request.into_parts();
    let path = parts.uri.path();
    let handle = (parts.method == Method::GET)
        .then(|| path.strip_prefix('/'))
        .flatten()
        .and_then(handle_from_ticket);

    let Some(handle) = handle else {
        return unknown_method_response(path);
    };

    let query = match PrintQuery::from_uri(SOURCE, &parts.uri) {
        Ok(query) => query,
        Err(err) => return err.into_response(),
    };

    match state.print.retrieve(handle).await {
        Ok(delivery) => delivery_response(delivery, query.inline()),
        Err(err) => HttpError::from(err).into_response(),
    }
}

/// Known path hit with a method it does not serve.
pub(super) async fn unknown_method(uri: Uri) -> Response {
    unknown_method_response(uri.path())
}

fn unknown_method_response(path: &str) -> Response {
    HttpError::new(
        "infra::http::print::unknown_method",
        StatusCode::NOT_FOUND,
        format!("Unknown method: {path}"),
    )
    .into_response()
}

async fn spec_payload(
    source: &'static str,
    state: &PrintState,
    parts: &Parts,
    query_spec: Option<String>,
    body: Body,
) -> Result<Option<SpecPayload>, HttpError> {
    if let Some(spec) = query_spec {
        return Ok(Some(SpecPayload::Text(spec)));
    }
    if parts.method != Method::POST {
        return Ok(None);
    }

    let bytes: Bytes = body::to_bytes(body, state.body_limit)
        .await
        .map_err(|err| HttpError::from_error(source, StatusCode::PAYLOAD_TOO_LARGE, &err))?;
    Ok(Some(SpecPayload::Body(bytes)))
}

fn print_request(spec: Option<SpecPayload>, parts: &Parts) -> PrintRequest {
    PrintRequest {
        spec,
        headers: parts.headers.clone(),
        peer: parts
            .extensions
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| *addr),
    }
}

/// Base URL under which this service is reachable, without the route path.
///
/// Preference: the `url` query parameter, then the configured base URL, then
/// the URL of the current request.
fn base_url(state: &PrintState, query_url: Option<&str>, parts: &Parts) -> String {
    let route_path = parts.uri.path();

    let candidate = match (query_url.filter(|url| !url.trim().is_empty()), &state.base_url) {
        (Some(url), _) => url.trim().to_string(),
        (None, Some(configured)) => configured.clone(),
        (None, None) => request_url(&parts.headers, parts),
    };

    let stripped = candidate
        .strip_suffix(route_path)
        .unwrap_or(&candidate)
        .trim_end_matches('/')
        .to_string();
    debug!(target = "pressroom::http", base_url = %stripped, "Resolved base URL");
    stripped
}

fn request_url(headers: &HeaderMap, parts: &Parts) -> String {
    let path = parts
        .extensions
        .get::<OriginalUri>()
        .map(|OriginalUri(uri)| uri.path().to_string())
        .unwrap_or_else(|| parts.uri.path().to_string());
    let host = headers
        .get(HOST)
        .and_then(|value| value.to_str().ok())
        .or_else(|| parts.uri.authority().map(|authority| authority.as_str()))
        .unwrap_or("localhost");
    format!("http://{host}{path}")
}

fn delivery_response(delivery: Delivery, inline: bool) -> Response {
    let content_type = HeaderValue::from_str(&delivery.content_type)
        .unwrap_or_else(|_| HeaderValue::from_static(FALLBACK_CONTENT_TYPE));

    let Delivery {
        mut content,
        content_length,
        file_name,
        ..
    } = delivery;
    let chunks = stream! {
        let mut buffer = vec![0u8; STREAM_CHUNK_SIZE];
        loop {
            match content.read(&mut buffer).await {
                Ok(0) => break,
                Ok(read) => yield Ok::<_, std::io::Error>(Bytes::copy_from_slice(&buffer[..read])),
                Err(err) => {
                    yield Err(err);
                    break;
                }
            }
        }
    };

    let mut response = (StatusCode::OK, Body::from_stream(chunks)).into_response();
    response.headers_mut().insert(CONTENT_TYPE, content_type);
    response
        .headers_mut()
        .insert(CONTENT_LENGTH, HeaderValue::from(content_length));

    if !inline {
        let disposition = format!(
            "attachment; filename={}",
            sanitize_header_text(&file_name)
        );
        if let Ok(value) = HeaderValue::from_bytes(disposition.as_bytes()) {
            response.headers_mut().insert(CONTENT_DISPOSITION, value);
        }
    }
    response
}

fn json_response(body: String) -> Response {
    (StatusCode::OK, [(CONTENT_TYPE, JSON_CONTENT_TYPE)], body).into_response()
}

fn sanitize_header_text(value: &str) -> String {
    value
        .chars()
        .map(|ch| if ch.is_control() { '_' } else { ch })
        .collect()
}

fn is_script_identifier(value: &str) -> bool {
    !value.is_empty()
        && value
            .chars()
            .all(|ch| ch.is_ascii_alphanumeric() || matches!(ch, '_' | '$' | '.'))
}
