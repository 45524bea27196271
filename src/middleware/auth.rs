// Caller identity set by the upstream auth layer

use axum::{extract::FromRequestParts, http::request::Parts};

use crate::types::AppError;

pub const USER_ID_HEADER: &str = "x-user-id";

/// Authenticated user id taken from the `x-user-id` header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UserId(pub i64);

impl<S> FromRequestParts<S> for UserId
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let raw = parts
            .headers
            .get(USER_ID_HEADER)
            .ok_or_else(|| AppError::Auth(format!("missing {} header", USER_ID_HEADER)))?;

        raw.to_str()
            .ok()
            .and_then(|value| value.trim().parse::<i64>().ok())
            .map(UserId)
            .ok_or_else(|| AppError::Auth(format!("malformed {} header", USER_ID_HEADER)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Request;

    async fn extract(header: Option<&str>) -> Result<UserId, AppError> {
        let mut builder = Request::builder().uri("/api/chat");
        if let Some(value) = header {
            builder = builder.header(USER_ID_HEADER, value);
        }
        let (mut parts, _) = builder.body(()).unwrap().into_parts();
        UserId::from_request_parts(&mut parts, &()).await
    }

    #[tokio::test]
    async fn test_user_id_header() {
        assert_eq!(extract(Some("42")).await.unwrap(), UserId(42));
        assert!(matches!(extract(None).await, Err(AppError::Auth(_))));
        assert!(matches!(extract(Some("abc")).await, Err(AppError::Auth(_))));
    }
}
