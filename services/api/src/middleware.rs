//! Bearer-token authentication for protected routes

use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use axum_extra::{
    TypedHeader,
    headers::{Authorization, authorization::Bearer},
};

use crate::{error::ApiError, state::AppState};

/// Resolve the bearer token into a [`commerce::Caller`] and store it in the
/// request extensions. A missing or malformed header is treated like a bad token.
pub async fn auth_middleware(
    State(state): State<AppState>,
    bearer: Option<TypedHeader<Authorization<Bearer>>>,
    mut req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let token = bearer
        .as_ref()
        .map(|TypedHeader(Authorization(bearer))| bearer.token());

    let caller = state.gate.authenticate(token).await?;
    req.extensions_mut().insert(caller);

    Ok(next.run(req).await)
}
