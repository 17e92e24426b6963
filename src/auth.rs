use http::header::AUTHORIZATION;
use http::HeaderMap;

use crate::error::BridgeError;

/// Authenticate an incoming request against the configured private key.
///
/// An empty configured key disables authentication entirely. Otherwise the
/// request must carry `Authorization: Bearer <key>`: a missing header or a
/// non-Bearer scheme yields a 401 challenge, a wrong key yields 403.
///
/// # Errors
///
/// Returns the matching `BridgeError::Auth*` variant on failure.
pub fn authenticate(private_key: &str, headers: &HeaderMap) -> Result<(), BridgeError> {
    if private_key.is_empty() {
        return Ok(());
    }

    let authorization = headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .ok_or(BridgeError::AuthMissing)?;

    let (scheme, token) = authorization.split_once(' ').unwrap_or((authorization, ""));
    if scheme != "Bearer" {
        return Err(BridgeError::AuthScheme);
    }
    if token != private_key {
        return Err(BridgeError::AuthInvalidKey);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::StatusCode;

    fn headers_with(value: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, value.parse().unwrap());
        headers
    }

    #[test]
    fn test_empty_key_disables_auth() {
        assert!(authenticate("", &HeaderMap::new()).is_ok());
    }

    #[test]
    fn test_valid_bearer_key() {
        assert!(authenticate("sk-secret", &headers_with("Bearer sk-secret")).is_ok());
    }

    #[test]
    fn test_missing_header_is_401_challenge() {
        let err = authenticate("sk-secret", &HeaderMap::new()).unwrap_err();
        assert!(matches!(err, BridgeError::AuthMissing));
        assert_eq!(err.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(err.code(), "no_auth");
    }

    #[test]
    fn test_wrong_scheme_is_401() {
        let err = authenticate("sk-secret", &headers_with("Basic sk-secret")).unwrap_err();
        assert!(matches!(err, BridgeError::AuthScheme));
        assert_eq!(err.code(), "invalid_scheme");
    }

    #[test]
    fn test_wrong_key_is_403() {
        let err = authenticate("sk-secret", &headers_with("Bearer sk-wrong")).unwrap_err();
        assert!(matches!(err, BridgeError::AuthInvalidKey));
        assert_eq!(err.status(), StatusCode::FORBIDDEN);
        assert_eq!(err.code(), "invalid_api_key");
    }
}
