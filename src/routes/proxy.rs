//! Proxy gateway: forwards chat-completion requests upstream, injecting the
//! bearer credential, and answers CORS itself (it is mounted outside the
//! router-wide CorsLayer).
//!
//!   OPTIONS -> 204 + CORS headers
//!   POST    -> body forwarded verbatim; upstream status + body returned verbatim
//!   other   -> 405 + CORS headers

use std::sync::Arc;

use axum::{
  body::{Body, Bytes},
  extract::State,
  http::{header, HeaderMap, HeaderValue, Method, StatusCode},
  response::{IntoResponse, Response},
};
use tracing::{error, info, instrument, warn};

use crate::state::ProxyState;

fn cors_headers(request: &HeaderMap) -> HeaderMap {
  let origin = request
    .get(header::ORIGIN)
    .cloned()
    .unwrap_or_else(|| HeaderValue::from_static("*"));
  let mut h = HeaderMap::new();
  h.insert(header::ACCESS_CONTROL_ALLOW_ORIGIN, origin);
  h.insert(header::ACCESS_CONTROL_ALLOW_HEADERS, HeaderValue::from_static("Authorization, Content-Type"));
  h.insert(header::ACCESS_CONTROL_ALLOW_METHODS, HeaderValue::from_static("POST, OPTIONS"));
  h.insert(header::ACCESS_CONTROL_MAX_AGE, HeaderValue::from_static("86400"));
  h.insert(header::VARY, HeaderValue::from_static("Origin"));
  h
}

fn with_headers(mut res: Response, extra: HeaderMap) -> Response {
  res.headers_mut().extend(extra);
  res
}

fn bad_gateway(message: String, cors: HeaderMap) -> Response {
  let payload = serde_json::json!({ "error": message }).to_string();
  let mut res = (StatusCode::BAD_GATEWAY, payload).into_response();
  res.headers_mut().insert(header::CONTENT_TYPE, HeaderValue::from_static("application/json"));
  with_headers(res, cors)
}

#[instrument(level = "info", skip(proxy, headers, body), fields(%method, body_len = body.len()))]
pub async fn forward(
  State(proxy): State<Arc<ProxyState>>,
  method: Method,
  headers: HeaderMap,
  body: Bytes,
) -> Response {
  let cors = cors_headers(&headers);

  if method == Method::OPTIONS {
    return with_headers(StatusCode::NO_CONTENT.into_response(), cors);
  }
  if method != Method::POST {
    warn!(target: "proxy", %method, "Rejected non-POST request");
    return with_headers((StatusCode::METHOD_NOT_ALLOWED, "Method Not Allowed").into_response(), cors);
  }

  let mut call = proxy.client
    .post(&proxy.upstream_url)
    .header(reqwest::header::CONTENT_TYPE, "application/json");
  if let Some(token) = &proxy.credential {
    call = call.header(reqwest::header::AUTHORIZATION, format!("Bearer {}", token));
  }

  let start = std::time::Instant::now();
  let upstream = match call.body(body.to_vec()).send().await {
    Ok(res) => res,
    Err(e) => {
      error!(target: "proxy", error = %e, "Upstream request failed");
      return bad_gateway(format!("Upstream request failed: {}", e), cors);
    }
  };

  let status = StatusCode::from_u16(upstream.status().as_u16()).unwrap_or(StatusCode::BAD_GATEWAY);
  let content_type = upstream
    .headers()
    .get(reqwest::header::CONTENT_TYPE)
    .and_then(|v| v.to_str().ok())
    .and_then(|v| HeaderValue::from_str(v).ok())
    .unwrap_or_else(|| HeaderValue::from_static("application/json"));
  let bytes = match upstream.bytes().await {
    Ok(b) => b,
    Err(e) => {
      error!(target: "proxy", %status, error = %e, "Failed to read upstream body");
      return bad_gateway(format!("Upstream response was cut short: {}", e), cors);
    }
  };
  info!(target: "proxy", %status, elapsed = ?start.elapsed(), response_len = bytes.len(), "Proxied upstream response");

  let mut res = Response::new(Body::from(bytes));
  *res.status_mut() = status;
  res.headers_mut().insert(header::CONTENT_TYPE, content_type);
  with_headers(res, cors)
}

#[cfg(test)]
mod tests {
  use super::*;
  use axum::{body::to_bytes, http::Request, routing::{any, post}, Router};
  use tokio::io::{AsyncReadExt, AsyncWriteExt};
  use tower::ServiceExt;

  fn gateway(upstream_url: String, credential: Option<&str>) -> Router {
    let proxy = Arc::new(ProxyState {
      client: reqwest::Client::new(),
      upstream_url,
      credential: credential.map(str::to_string),
    });
    Router::new().route("/v1/chat/completions", any(forward)).with_state(proxy)
  }

  fn post_request(body: &'static str) -> Request<Body> {
    Request::builder()
      .method(Method::POST)
      .uri("/v1/chat/completions")
      .header(header::ORIGIN, "https://example.org")
      .body(Body::from(body))
      .unwrap()
  }

  /// Accepts one connection, reads the whole `{}` request, then writes `raw` and hangs up.
  async fn spawn_raw_upstream(raw: &'static [u8]) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
      let (mut socket, _) = listener.accept().await.unwrap();
      let mut seen = Vec::new();
      let mut buf = [0u8; 4096];
      while !seen.ends_with(b"\r\n\r\n{}") {
        match socket.read(&mut buf).await {
          Ok(0) | Err(_) => break,
          Ok(n) => seen.extend_from_slice(&buf[..n]),
        }
      }
      let _ = socket.write_all(raw).await;
      let _ = socket.shutdown().await;
    });
    format!("http://{addr}/v1/chat/completions")
  }

  /// Fake upstream that echoes the auth header and body with a 201.
  async fn spawn_upstream() -> String {
    async fn echo(headers: HeaderMap, body: String) -> impl IntoResponse {
      let auth = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("")
        .to_string();
      (StatusCode::CREATED, [(header::CONTENT_TYPE, "text/plain")], format!("{auth}|{body}"))
    }
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
      let _ = axum::serve(listener, Router::new().route("/v1/chat/completions", post(echo))).await;
    });
    format!("http://{addr}/v1/chat/completions")
  }

  #[tokio::test]
  async fn preflight_echoes_origin() {
    let app = gateway("http://127.0.0.1:9/unused".into(), None);
    let res = app
      .oneshot(
        Request::builder()
          .method(Method::OPTIONS)
          .uri("/v1/chat/completions")
          .header(header::ORIGIN, "https://example.org")
          .body(Body::empty())
          .unwrap(),
      )
      .await
      .unwrap();
    assert_eq!(res.status(), StatusCode::NO_CONTENT);
    assert_eq!(res.headers()[header::ACCESS_CONTROL_ALLOW_ORIGIN], "https://example.org");
    assert_eq!(res.headers()[header::ACCESS_CONTROL_ALLOW_METHODS], "POST, OPTIONS");
    assert_eq!(res.headers()[header::ACCESS_CONTROL_ALLOW_HEADERS], "Authorization, Content-Type");
  }

  #[tokio::test]
  async fn other_methods_are_rejected_with_cors() {
    let app = gateway("http://127.0.0.1:9/unused".into(), None);
    let res = app
      .oneshot(Request::builder().method(Method::GET).uri("/v1/chat/completions").body(Body::empty()).unwrap())
      .await
      .unwrap();
    assert_eq!(res.status(), StatusCode::METHOD_NOT_ALLOWED);
    assert_eq!(res.headers()[header::ACCESS_CONTROL_ALLOW_ORIGIN], "*");
  }

  #[tokio::test]
  async fn post_is_forwarded_verbatim_with_credential() {
    let upstream = spawn_upstream().await;
    let app = gateway(upstream, Some("secret-token"));
    let res = app
      .oneshot(
        Request::builder()
          .method(Method::POST)
          .uri("/v1/chat/completions")
          .body(Body::from(r#"{"model":"m"}"#))
          .unwrap(),
      )
      .await
      .unwrap();
    assert_eq!(res.status(), StatusCode::CREATED);
    assert_eq!(res.headers()[header::CONTENT_TYPE], "text/plain");
    assert_eq!(res.headers()[header::ACCESS_CONTROL_ALLOW_ORIGIN], "*");
    let body = to_bytes(res.into_body(), usize::MAX).await.unwrap();
    assert_eq!(&body[..], br#"Bearer secret-token|{"model":"m"}"#);
  }

  #[tokio::test]
  async fn missing_upstream_content_type_defaults_to_json() {
    let upstream = spawn_raw_upstream(b"HTTP/1.1 200 OK\r\nContent-Length: 2\r\nConnection: close\r\n\r\n{}").await;
    let res = gateway(upstream, None).oneshot(post_request("{}")).await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(res.headers()[header::CONTENT_TYPE], "application/json");
    let body = to_bytes(res.into_body(), usize::MAX).await.unwrap();
    assert_eq!(&body[..], b"{}");
  }

  #[tokio::test]
  async fn unreachable_upstream_is_bad_gateway_with_cors() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let res = gateway(format!("http://{addr}/v1/chat/completions"), None)
      .oneshot(post_request("{}"))
      .await
      .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_GATEWAY);
    assert_eq!(res.headers()[header::ACCESS_CONTROL_ALLOW_ORIGIN], "https://example.org");
    assert_eq!(res.headers()[header::CONTENT_TYPE], "application/json");
    let body = to_bytes(res.into_body(), usize::MAX).await.unwrap();
    let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert!(json["error"].as_str().unwrap().starts_with("Upstream request failed"));
  }

  #[tokio::test]
  async fn truncated_upstream_body_is_bad_gateway() {
    let upstream = spawn_raw_upstream(
      b"HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nContent-Length: 500\r\n\r\n{\"choices\":[",
    )
    .await;
    let res = gateway(upstream, None).oneshot(post_request("{}")).await.unwrap();
    assert_eq!(res.status(), StatusCode::BAD_GATEWAY);
    assert_eq!(res.headers()[header::ACCESS_CONTROL_ALLOW_ORIGIN], "https://example.org");
    let body = to_bytes(res.into_body(), usize::MAX).await.unwrap();
    let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert!(json["error"].as_str().unwrap().starts_with("Upstream response was cut short"));
  }
}
