/// Token Validator
///
/// Middleware for protected scopes: decodes and verifies the access token
/// from the portal's `token` header and injects a request-scoped
/// `IdentityContext` into request extensions for handlers and the policy
/// engine. Rejections short-circuit before any handler runs and use the
/// uniform `{success:false, description}` body; an expired token is
/// reported distinctly from an invalid one so clients know to try a
/// refresh.

use actix_web::{
    dev::{forward_ready, Service, ServiceRequest, ServiceResponse, Transform},
    error::ResponseError,
    Error, HttpMessage,
};
use futures::future::LocalBoxFuture;
use std::rc::Rc;

use crate::auth::{decode_token, TokenPurpose};
use crate::configuration::JwtSettings;
use crate::error::{AppError, AuthError};

/// Header the portal client sends its access token in
const TOKEN_HEADER: &str = "token";

pub struct TokenValidator {
    jwt_config: JwtSettings,
}

impl TokenValidator {
    pub fn new(jwt_config: JwtSettings) -> Self {
        Self { jwt_config }
    }
}

impl<S, B> Transform<S, ServiceRequest> for TokenValidator
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type InitError = ();
    type Transform = TokenValidatorService<S>;
    type Future = std::future::Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        std::future::ready(Ok(TokenValidatorService {
            service: Rc::new(service),
            jwt_config: self.jwt_config.clone(),
        }))
    }
}

pub struct TokenValidatorService<S> {
    service: Rc<S>,
    jwt_config: JwtSettings,
}

impl<S, B> Service<ServiceRequest> for TokenValidatorService<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;

    forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let token = req
            .headers()
            .get(TOKEN_HEADER)
            .and_then(|h| h.to_str().ok())
            .map(|h| h.trim().to_string())
            .filter(|h| !h.is_empty());

        let token = match token {
            Some(token) => token,
            None => {
                tracing::warn!(path = %req.path(), "Protected route called without a token");
                return reject(AuthError::MissingToken);
            }
        };

        match decode_token(&token, TokenPurpose::Access, &self.jwt_config) {
            Ok(claims) => match claims.identity() {
                Ok(identity) => {
                    tracing::debug!(
                        subject_id = %identity.subject_id,
                        role = %identity.role,
                        "Access token validated"
                    );
                    req.extensions_mut().insert(identity);

                    let service = self.service.clone();
                    Box::pin(async move { service.call(req).await })
                }
                Err(e) => reject(e),
            },
            Err(e) => {
                tracing::warn!(error = %e, "Access token rejected");
                reject(e)
            }
        }
    }
}

/// Short-circuit with the uniform unauthorized body for `err`
fn reject<R>(err: AuthError) -> LocalBoxFuture<'static, Result<R, Error>> {
    let app_err = AppError::Auth(err);
    let response = app_err.error_response();
    Box::pin(async move {
        Err(actix_web::error::InternalError::from_response(app_err, response).into())
    })
}
