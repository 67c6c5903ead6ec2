use axum::{
    Json,
    extract::{Form, State},
    http::{HeaderMap, StatusCode, header::AUTHORIZATION},
    response::{Html, IntoResponse, Redirect, Response},
};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use chrono::{Duration as ChronoDuration, Utc};
use cookie::time::Duration as CookieDuration;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use crate::{
    accounts,
    config::AuthSettings,
    web::{
        AppState,
        responses::{self, ApiMessage},
        templates::render_login_page,
    },
};

pub const SESSION_COOKIE: &str = "auth_token";

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("failed to sign access token: {0}")]
    Signing(jsonwebtoken::errors::Error),

    #[error("invalid access token: {0}")]
    Invalid(jsonwebtoken::errors::Error),
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub iat: i64,
    pub exp: i64,
}

#[derive(Debug, Serialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub token_type: &'static str,
    pub expires_in: i64,
}

/// Issues and validates HS256 access tokens. The subject is the user id.
#[derive(Clone)]
pub struct TokenIssuer {
    encoding: EncodingKey,
    decoding: DecodingKey,
    ttl: ChronoDuration,
}

impl TokenIssuer {
    pub fn new(settings: &AuthSettings) -> Self {
        let secret = settings.secret_key.as_bytes();
        Self {
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
            ttl: ChronoDuration::minutes(settings.token_ttl_minutes),
        }
    }

    pub fn ttl_seconds(&self) -> i64 {
        self.ttl.num_seconds()
    }

    pub fn issue(&self, user_id: &str) -> Result<TokenResponse, AuthError> {
        let now = Utc::now();
        let claims = Claims {
            sub: user_id.to_string(),
            iat: now.timestamp(),
            exp: (now + self.ttl).timestamp(),
        };
        let access_token = jsonwebtoken::encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)
            .map_err(AuthError::Signing)?;

        Ok(TokenResponse {
            access_token,
            token_type: "bearer",
            expires_in: self.ttl_seconds(),
        })
    }

    pub fn verify(&self, token: &str) -> Result<Claims, AuthError> {
        let validation = Validation::new(Algorithm::HS256);
        jsonwebtoken::decode::<Claims>(token, &self.decoding, &validation)
            .map(|data| data.claims)
            .map_err(AuthError::Invalid)
    }
}

#[derive(Deserialize)]
pub struct LoginForm {
    pub username: String,
    pub password: String,
}

/// User id from a valid `Authorization: Bearer` header, or a ready 401 response.
pub fn require_bearer_user(state: &AppState, headers: &HeaderMap) -> Result<String, Response> {
    let Some(value) = headers.get(AUTHORIZATION).and_then(|value| value.to_str().ok()) else {
        return Err(responses::unauthorized("Not authenticated"));
    };
    let Some(token) = value
        .strip_prefix("Bearer ")
        .or_else(|| value.strip_prefix("bearer "))
    else {
        return Err(responses::unauthorized("Not authenticated"));
    };

    match state.tokens().verify(token.trim()) {
        Ok(claims) => Ok(claims.sub),
        Err(err) => {
            warn!(error = %err, "rejected bearer token");
            Err(responses::unauthorized("Could not validate credentials"))
        }
    }
}

/// User id from the session cookie, if it holds a valid token.
pub fn current_user(state: &AppState, jar: &CookieJar) -> Option<String> {
    let cookie = jar.get(SESSION_COOKIE)?;
    state
        .tokens()
        .verify(cookie.value())
        .ok()
        .map(|claims| claims.sub)
}

pub async fn login_page(State(state): State<AppState>, jar: CookieJar) -> Response {
    if current_user(&state, &jar).is_some() {
        return Redirect::to("/").into_response();
    }
    Html(render_login_page(None)).into_response()
}

pub async fn process_login(
    State(state): State<AppState>,
    jar: CookieJar,
    Form(form): Form<LoginForm>,
) -> Result<(CookieJar, Redirect), (StatusCode, Html<String>)> {
    let username = form.username.trim();

    let account = match accounts::authenticate(state.accounts(), username, &form.password).await {
        Ok(Some(account)) => account,
        Ok(None) => {
            return Err((
                StatusCode::UNAUTHORIZED,
                Html(render_login_page(Some("Invalid username or password."))),
            ));
        }
        Err(err) => {
            error!(?err, "failed to authenticate during login");
            return Err(server_error());
        }
    };

    let token = state.tokens().issue(&account.username).map_err(|err| {
        error!(?err, "failed to issue session token");
        server_error()
    })?;

    let mut cookie = Cookie::new(SESSION_COOKIE, token.access_token);
    cookie.set_path("/");
    cookie.set_http_only(true);
    cookie.set_secure(state.config().auth.secure_cookie);
    cookie.set_same_site(SameSite::Lax);
    cookie.set_max_age(CookieDuration::seconds(token.expires_in));

    info!(username = %account.username, "user signed in");
    Ok((jar.add(cookie), Redirect::to("/")))
}

pub async fn logout(State(state): State<AppState>, jar: CookieJar) -> (CookieJar, Redirect) {
    let mut removal = Cookie::new(SESSION_COOKIE, "");
    removal.set_path("/");
    removal.set_http_only(true);
    removal.set_secure(state.config().auth.secure_cookie);
    removal.set_same_site(SameSite::Lax);
    removal.set_max_age(CookieDuration::seconds(0));

    (jar.remove(removal), Redirect::to("/"))
}

pub async fn issue_token(
    State(state): State<AppState>,
    Form(form): Form<LoginForm>,
) -> Result<Json<TokenResponse>, (StatusCode, Json<ApiMessage>)> {
    let account = match accounts::authenticate(state.accounts(), &form.username, &form.password)
        .await
    {
        Ok(Some(account)) => account,
        Ok(None) => {
            return Err(responses::json_error(
                StatusCode::UNAUTHORIZED,
                "not_authenticated",
                "Incorrect username or password",
            ));
        }
        Err(err) => {
            error!(?err, "failed to authenticate token request");
            return Err(internal_json_error());
        }
    };

    state.tokens().issue(&account.username).map(Json).map_err(|err| {
        error!(?err, "failed to issue access token");
        internal_json_error()
    })
}

fn internal_json_error() -> (StatusCode, Json<ApiMessage>) {
    responses::json_error(
        StatusCode::INTERNAL_SERVER_ERROR,
        "internal_error",
        "Something went wrong. Please try again later.",
    )
}

fn server_error() -> (StatusCode, Html<String>) {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Html("<h1>Server error</h1><p>Please try again later.</p>".to_string()),
    )
}
