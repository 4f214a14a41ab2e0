use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{request::Parts, StatusCode},
};
use base64ct::{Base64, Encoding};

/// HTTP Basic credentials carrying the activation identity: the username is
/// the email, the password is the 4-digit code.
#[derive(Debug)]
pub struct BasicCredentials {
    pub username: String,
    pub password: String,
}

#[async_trait]
impl<S> FromRequestParts<S> for BasicCredentials
where
    S: Send + Sync,
{
    type Rejection = (StatusCode, String);

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let auth = parts
            .headers
            .get(axum::http::header::AUTHORIZATION)
            .and_then(|h| h.to_str().ok())
            .ok_or((
                StatusCode::UNAUTHORIZED,
                "missing Authorization header".to_string(),
            ))?;

        // Expect "Basic <base64(user:pass)>"
        let encoded = auth
            .strip_prefix("Basic ")
            .or_else(|| auth.strip_prefix("basic "))
            .ok_or((StatusCode::UNAUTHORIZED, "invalid auth scheme".to_string()))?;

        let decoded = Base64::decode_vec(encoded.trim())
            .ok()
            .and_then(|bytes| String::from_utf8(bytes).ok())
            .ok_or((
                StatusCode::UNAUTHORIZED,
                "invalid Basic credentials".to_string(),
            ))?;

        let (username, password) = decoded.split_once(':').ok_or((
            StatusCode::UNAUTHORIZED,
            "invalid Basic credentials".to_string(),
        ))?;

        Ok(BasicCredentials {
            username: username.to_string(),
            password: password.to_string(),
        })
    }
}
