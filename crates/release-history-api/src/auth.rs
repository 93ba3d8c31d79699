//! HTTP Basic authentication middleware.
//!
//! A single username/password pair guards every route the layer wraps.
//! Both halves are compared in constant time.

use std::sync::Arc;
use std::task::{Context, Poll};

use axum::http::StatusCode;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use http::{Request, Response};
use subtle::ConstantTimeEq;
use tower::{Layer, Service};

/// Challenge sent with every 401.
pub const CHALLENGE: &str = r#"Basic realm="Please authenticate""#;

/// The one credential pair accepted by the API.
#[derive(Clone)]
pub struct AuthConfig {
    pub username: String,
    pub password: String,
}

impl AuthConfig {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }

    /// Check a presented pair without short-circuiting on the first mismatch.
    pub fn verify(&self, username: &str, password: &str) -> bool {
        let user_ok = username.as_bytes().ct_eq(self.username.as_bytes());
        let pass_ok = password.as_bytes().ct_eq(self.password.as_bytes());
        (user_ok & pass_ok).into()
    }
}

impl std::fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthConfig")
            .field("username", &self.username)
            .field("password", &"***")
            .finish()
    }
}

/// Tower layer that enforces Basic credentials on the Authorization header.
#[derive(Clone)]
pub struct BasicAuthLayer {
    config: Arc<AuthConfig>,
}

impl BasicAuthLayer {
    pub fn new(config: AuthConfig) -> Self {
        Self {
            config: Arc::new(config),
        }
    }
}

impl<S> Layer<S> for BasicAuthLayer {
    type Service = BasicAuthService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        BasicAuthService {
            inner,
            config: self.config.clone(),
        }
    }
}

/// The service wrapper that performs the credential check.
#[derive(Clone)]
pub struct BasicAuthService<S> {
    inner: S,
    config: Arc<AuthConfig>,
}

impl<S, ReqBody, ResBody> Service<Request<ReqBody>> for BasicAuthService<S>
where
    S: Service<Request<ReqBody>, Response = Response<ResBody>> + Clone + Send + 'static,
    S::Future: Send,
    ReqBody: Send + 'static,
    ResBody: From<&'static str> + Send + 'static,
{
    type Response = S::Response;
    type Error = S::Error;
    type Future = std::pin::Pin<
        Box<dyn std::future::Future<Output = Result<Self::Response, Self::Error>> + Send>,
    >;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: Request<ReqBody>) -> Self::Future {
        let config = self.config.clone();
        let mut inner = self.inner.clone();

        Box::pin(async move {
            let credentials = req
                .headers()
                .get(http::header::AUTHORIZATION)
                .and_then(|h| h.to_str().ok())
                .and_then(parse_basic);

            match credentials {
                Some((user, pass)) if config.verify(&user, &pass) => inner.call(req).await,
                Some((user, _)) => {
                    tracing::debug!(%user, path = %req.uri().path(), "basic auth rejected");
                    Ok(unauthorized_response())
                }
                None => {
                    tracing::debug!(path = %req.uri().path(), "missing or malformed Authorization header");
                    Ok(unauthorized_response())
                }
            }
        })
    }
}

/// Decode `Basic <base64(user:pass)>` into its two halves.
///
/// The password may itself contain `:`; only the first one separates.
pub fn parse_basic(header: &str) -> Option<(String, String)> {
    let (scheme, encoded) = header.split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("basic") {
        return None;
    }
    let decoded = STANDARD.decode(encoded.trim()).ok()?;
    let decoded = String::from_utf8(decoded).ok()?;
    let (user, pass) = decoded.split_once(':')?;
    Some((user.to_string(), pass.to_string()))
}

fn unauthorized_response<B: From<&'static str>>() -> Response<B> {
    let mut response = Response::new(B::from("Unauthorised.\n"));
    *response.status_mut() = StatusCode::UNAUTHORIZED;
    response.headers_mut().insert(
        http::header::WWW_AUTHENTICATE,
        http::HeaderValue::from_static(CHALLENGE),
    );
    response
}
