//! HTTP service that runs every request through the authentication pipeline.
//!
//! Routes:
//!
//! - `GET /health` is answered without authentication.
//! - `/login` checks a clear-text login and issues a bearer token.
//! - Anything else is authenticated and answered with a description of the
//!   account that signed it.
//!
//! Every response carries an `x-request-id` header.

use std::convert::Infallible;
use std::future::Future;
use std::net::IpAddr;
use std::pin::Pin;
use std::sync::Arc;

use bytes::Bytes;
use http::header::{CONTENT_TYPE, HeaderValue, LOCATION};
use http::{Method, StatusCode};
use http_body_util::{BodyExt, Full};
use hyper::body::{Body, Incoming};
use hyper::service::Service;
use serde_json::{Value, json};
use sigil_auth::{CachedAccountStore, RequestContext, StaticAccountStore};
use sigil_gate::{AuthPipeline, AuthStatus, Decision, SessionOptions};
use tracing::{debug, warn};

/// Account store used by the server.
pub type ServerStore = CachedAccountStore<StaticAccountStore>;

/// Pipeline used by the server.
pub type ServerPipeline = AuthPipeline<ServerStore>;

/// Response body type.
pub type SigilBody = Full<Bytes>;

const REQUEST_ID_HEADER: &str = "x-request-id";

/// Per-connection service bound to the peer address.
#[derive(Debug, Clone)]
pub struct SigilService {
    pipeline: Arc<ServerPipeline>,
    peer: IpAddr,
}

impl SigilService {
    /// Create a service for a connection from `peer`.
    pub fn new(pipeline: Arc<ServerPipeline>, peer: IpAddr) -> Self {
        Self { pipeline, peer }
    }
}

impl Service<http::Request<Incoming>> for SigilService {
    type Response = http::Response<SigilBody>;
    type Error = Infallible;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn call(&self, req: http::Request<Incoming>) -> Self::Future {
        let pipeline = Arc::clone(&self.pipeline);
        let peer = self.peer;
        Box::pin(async move { Ok(handle_request(&pipeline, req, peer).await) })
    }
}

/// Serve one request.
pub async fn handle_request<B>(
    pipeline: &ServerPipeline,
    req: http::Request<B>,
    peer: IpAddr,
) -> http::Response<SigilBody>
where
    B: Body<Data = Bytes>,
    B::Error: std::fmt::Display,
{
    let request_id = uuid::Uuid::new_v4().to_string();
    let mut response = route(pipeline, req, peer, &request_id).await;
    if let Ok(value) = HeaderValue::from_str(&request_id) {
        response.headers_mut().insert(REQUEST_ID_HEADER, value);
    }
    response
}

async fn route<B>(
    pipeline: &ServerPipeline,
    req: http::Request<B>,
    peer: IpAddr,
    request_id: &str,
) -> http::Response<SigilBody>
where
    B: Body<Data = Bytes>,
    B::Error: std::fmt::Display,
{
    let (parts, body) = req.into_parts();
    let body = match body.collect().await {
        Ok(collected) => collected.to_bytes(),
        Err(e) => {
            warn!(request_id, error = %e, "failed to read request body");
            return status_response(&AuthStatus::new(StatusCode::BAD_REQUEST, "Invalid body"));
        }
    };

    let mut ctx = RequestContext::from_parts(&parts, body, peer);
    debug!(request_id, method = %ctx.method, path = %ctx.path, "handling request");

    if is_health_check(&parts.method, &ctx.path) {
        return health(pipeline, &mut ctx).await;
    }
    if ctx.path == "/login" {
        return login(pipeline, &mut ctx, request_id).await;
    }

    match pipeline.handle(&mut ctx).await {
        Decision::Continue => json_response(StatusCode::OK, &describe(&ctx)),
        decision => decision_response(decision),
    }
}

async fn health(
    pipeline: &ServerPipeline,
    ctx: &mut RequestContext,
) -> http::Response<SigilBody> {
    match pipeline.check_access(ctx).await.as_ref().map(AuthStatus::decision) {
        None | Some(Decision::Continue) => json_response(
            StatusCode::OK,
            &json!({ "status": "ok", "version": crate::VERSION }),
        ),
        Some(decision) => decision_response(decision),
    }
}

async fn login(
    pipeline: &ServerPipeline,
    ctx: &mut RequestContext,
    request_id: &str,
) -> http::Response<SigilBody> {
    let status = pipeline.check_login(ctx).await;
    if !status.is_ok() {
        return decision_response(status.decision());
    }

    let options = SessionOptions::builder().access_token(true).build();
    if let Err(e) = pipeline.handle_session_signature(ctx, options) {
        warn!(request_id, error = %e, "failed to issue access token");
        return status_response(&AuthStatus::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            "Cannot issue access token",
        ));
    }

    let mut body = describe(ctx);
    if let Some(token) = &ctx.issued_token {
        body["tokenName"] = json!(token.name);
        body["token"] = json!(token.value);
        body["maxAge"] = json!(token.max_age_ms);
    }
    json_response(StatusCode::OK, &body)
}

/// Public description of the authenticated caller.
fn describe(ctx: &RequestContext) -> Value {
    let account = ctx.account.as_ref();
    json!({
        "login": account.map(|a| a.login.as_str()),
        "id": account.map(|a| a.id.as_str()),
        "type": account.map(|a| a.account_type.as_str()),
        "channel": ctx
            .signature
            .as_ref()
            .and_then(|s| s.source)
            .map(|c| c.to_string()),
    })
}

fn is_health_check(method: &Method, path: &str) -> bool {
    *method == Method::GET && path == "/health"
}

fn json_response(code: StatusCode, body: &Value) -> http::Response<SigilBody> {
    let mut response = http::Response::new(Full::new(Bytes::from(body.to_string())));
    *response.status_mut() = code;
    response
        .headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    response
}

fn status_response(status: &AuthStatus) -> http::Response<SigilBody> {
    json_response(
        status.code,
        &json!({ "status": status.code.as_u16(), "message": status.message }),
    )
}

fn decision_response(decision: Decision) -> http::Response<SigilBody> {
    match decision {
        Decision::Continue => status_response(&AuthStatus::ok()),
        Decision::Reject(status) => status_response(&status),
        Decision::Redirect { code, location } => redirect_response(code, &location),
    }
}

fn redirect_response(code: StatusCode, location: &str) -> http::Response<SigilBody> {
    let Ok(value) = HeaderValue::from_str(location) else {
        warn!(location, "redirect location is not a valid header value");
        return status_response(&AuthStatus::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            "Invalid redirect",
        ));
    };
    let mut response = http::Response::new(Full::new(Bytes::new()));
    *response.status_mut() = code;
    response.headers_mut().insert(LOCATION, value);
    response
}
