//! The innermost middleware: attaches the `Authorization` header, and is the
//! one thing [`super::retry::RetryMiddleware`] forces to re-run on every
//! attempt by sitting outside it in the chain.

use reqwest::{Request, Response};
use reqwest_middleware::{Extensions, Middleware, Next, Result};

use crate::auth::SharedAuthenticator;

/// Resolves and attaches the `Authorization` header via a [`SharedAuthenticator`].
pub struct AuthMiddleware {
    authenticator: SharedAuthenticator,
}

impl AuthMiddleware {
    /// Builds a middleware backed by `authenticator`.
    pub fn new(authenticator: SharedAuthenticator) -> Self {
        Self { authenticator }
    }
}

#[async_trait::async_trait]
impl Middleware for AuthMiddleware {
    async fn handle(
        &self,
        mut req: Request,
        extensions: &mut Extensions,
        next: Next<'_>,
    ) -> Result<Response> {
        match self.authenticator.auth_header().await {
            Ok(Some(header)) => {
                req.headers_mut().insert(reqwest::header::AUTHORIZATION, header);
            }
            Ok(None) => {}
            Err(err) => {
                return Err(reqwest_middleware::Error::Middleware(anyhow::anyhow!(
                    "failed to resolve registry credentials: {err}"
                )));
            }
        }

        let response = next.run(req, extensions).await;
        if let Ok(resp) = &response {
            if matches!(resp.status().as_u16(), 401 | 403) {
                self.authenticator.invalidate().await;
            }
        }
        response
    }
}
