use axum::{
    extract::{FromRequestParts, Request, State},
    http::{HeaderMap, StatusCode, header},
    middleware::Next,
    response::{IntoResponse, Redirect, Response},
};

use crate::{AppState, auth::AuthUser, error::ApiError, models::Role};

const ANY_ROLE: &[Role] = &[Role::Customer, Role::Admin, Role::SuperAdmin];
const STAFF: &[Role] = &[Role::Admin, Role::SuperAdmin];
const SUPER_ADMIN_ONLY: &[Role] = &[Role::SuperAdmin];

/// RouteRule
///
/// One row of the access table: every path under `prefix` requires a session whose
/// role is listed in `allowed`.
#[derive(Debug, Clone, PartialEq)]
pub struct RouteRule {
    pub prefix: &'static str,
    pub allowed: &'static [Role],
}

impl RouteRule {
    /// Matches on whole path segments only: `/api/v1/admin` covers `/api/v1/admin/x`
    /// but not `/api/v1/administrator`.
    pub fn matches(&self, path: &str) -> bool {
        match path.strip_prefix(self.prefix) {
            Some(rest) => rest.is_empty() || rest.starts_with('/'),
            None => false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessDecision {
    Allow,
    Unauthenticated,
    Forbidden,
}

/// RoutePolicy
///
/// The static prefix → roles table consulted by `route_guard` on every request.
#[derive(Debug, Clone)]
pub struct RoutePolicy {
    pub rules: Vec<RouteRule>,
    /// Where browser navigations without a session are sent.
    pub login_path: String,
}

impl RoutePolicy {
    pub fn new(rules: Vec<RouteRule>, login_path: impl Into<String>) -> Self {
        Self {
            rules,
            login_path: login_path.into(),
        }
    }

    /// The storefront's access table.
    pub fn storefront() -> Self {
        Self::new(
            vec![
                RouteRule { prefix: "/api/v1/me", allowed: ANY_ROLE },
                RouteRule { prefix: "/api/v1/orders", allowed: ANY_ROLE },
                RouteRule { prefix: "/api/v1/reviews", allowed: ANY_ROLE },
                RouteRule { prefix: "/api/v1/coupons/apply", allowed: ANY_ROLE },
                RouteRule { prefix: "/api/v1/admin", allowed: STAFF },
                RouteRule { prefix: "/api/v1/admin/users", allowed: SUPER_ADMIN_ONLY },
            ],
            "/login",
        )
    }

    /// Longest matching prefix wins, so `/api/v1/admin/users` overrides `/api/v1/admin`.
    pub fn rule_for(&self, path: &str) -> Option<&RouteRule> {
        self.rules
            .iter()
            .filter(|rule| rule.matches(path))
            .max_by_key(|rule| rule.prefix.len())
    }

    pub fn decide(&self, path: &str, session: Option<&AuthUser>) -> AccessDecision {
        let Some(rule) = self.rule_for(path) else {
            return AccessDecision::Allow;
        };
        match session {
            None => AccessDecision::Unauthenticated,
            Some(user) if rule.allowed.contains(&user.role) => AccessDecision::Allow,
            Some(_) => AccessDecision::Forbidden,
        }
    }
}

impl Default for RoutePolicy {
    fn default() -> Self {
        Self::storefront()
    }
}

fn wants_html(headers: &HeaderMap) -> bool {
    headers
        .get(header::ACCEPT)
        .and_then(|value| value.to_str().ok())
        .is_some_and(|accept| accept.contains("text/html"))
}

/// route_guard
///
/// Global middleware enforcing `RoutePolicy`. Unprotected paths pass through without
/// touching the session. For protected paths the `AuthUser` resolver runs once; on
/// success the identity is stored in the request extensions, where the handler's own
/// `AuthUser` extractor picks it up again.
///
/// Rejections: browser navigations are redirected (303) to the login page or the home
/// page; API callers receive the 401/403 error envelope.
pub async fn route_guard(State(state): State<AppState>, request: Request, next: Next) -> Response {
    let path = request.uri().path().to_string();
    if state.policy.rule_for(&path).is_none() {
        return next.run(request).await;
    }

    let html = wants_html(request.headers());
    let (mut parts, body) = request.into_parts();

    let (session, auth_error) = match AuthUser::from_request_parts(&mut parts, &state).await {
        Ok(user) => (Some(user), None),
        Err(err) if err.status_code() == StatusCode::UNAUTHORIZED => (None, Some(err)),
        // Store failures are not an authentication verdict.
        Err(err) => return err.into_response(),
    };

    match state.policy.decide(&path, session.as_ref()) {
        AccessDecision::Allow => {
            if let Some(user) = session {
                tracing::debug!(user_id = %user.id, role = user.role.as_str(), %path, "access granted");
                parts.extensions.insert(user);
            }
            next.run(Request::from_parts(parts, body)).await
        }
        AccessDecision::Unauthenticated => {
            tracing::debug!(%path, "no session for protected route");
            if html {
                let location = format!("{}?callbackUrl={}", state.policy.login_path, path);
                return Redirect::to(&location).into_response();
            }
            auth_error
                .unwrap_or_else(|| ApiError::unauthorized("You are not authorized"))
                .into_response()
        }
        AccessDecision::Forbidden => {
            tracing::debug!(%path, "role not allowed for route");
            if html {
                return Redirect::to("/").into_response();
            }
            ApiError::forbidden("You do not have permission to access this resource").into_response()
        }
    }
}
