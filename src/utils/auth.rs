use actix_web::HttpRequest;

use crate::config::JwtConfig;
use crate::errors::AppError;
use crate::utils::jwt::{validate_token, Claims, TokenType};

pub const ACCESS_TOKEN_COOKIE: &str = "access_token";

/// Access token from `Authorization: Bearer ..`, or the `access_token` cookie.
pub fn bearer_token(req: &HttpRequest) -> Option<String> {
    let from_header = req
        .headers()
        .get("Authorization")
        .and_then(|auth| auth.to_str().ok())
        .and_then(|auth| auth.strip_prefix("Bearer "))
        .map(|token| token.trim().to_string())
        .filter(|token| !token.is_empty());

    from_header.or_else(|| req.cookie(ACCESS_TOKEN_COOKIE).map(|c| c.value().to_string()))
}

pub fn authenticate(req: &HttpRequest, config: &JwtConfig) -> Result<Claims, AppError> {
    let token = bearer_token(req).ok_or_else(|| AppError::Unauthorized("Missing token".to_string()))?;
    validate_token(&config.secret, &token, Some(TokenType::Access))
}

pub fn require_staff(req: &HttpRequest, config: &JwtConfig) -> Result<Claims, AppError> {
    let claims = authenticate(req, config)?;
    if !claims.is_staff {
        return Err(AppError::Forbidden("Staff permission required".to_string()));
    }
    Ok(claims)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::jwt::generate_token_pair;
    use crate::utils::jwt::tests::{jwt_config, subject};
    use actix_web::cookie::Cookie;
    use actix_web::test::TestRequest;

    #[test]
    fn token_from_header_or_cookie() {
        let req = TestRequest::default()
            .insert_header(("Authorization", "Bearer abc.def"))
            .to_http_request();
        assert_eq!(bearer_token(&req).as_deref(), Some("abc.def"));

        let req = TestRequest::default()
            .cookie(Cookie::new(ACCESS_TOKEN_COOKIE, "from-cookie"))
            .to_http_request();
        assert_eq!(bearer_token(&req).as_deref(), Some("from-cookie"));

        let req = TestRequest::default().insert_header(("Authorization", "Basic xyz")).to_http_request();
        assert_eq!(bearer_token(&req), None);
    }

    #[test]
    fn refresh_token_is_not_an_access_token() {
        let config = jwt_config();
        let pair = generate_token_pair(&config, &subject(true)).unwrap();
        let req = TestRequest::default()
            .insert_header(("Authorization", format!("Bearer {}", pair.refresh)))
            .to_http_request();
        assert!(matches!(authenticate(&req, &config), Err(AppError::Unauthorized(_))));
    }

    #[test]
    fn staff_check() {
        let config = jwt_config();
        let user = generate_token_pair(&config, &subject(false)).unwrap();
        let req = TestRequest::default()
            .insert_header(("Authorization", format!("Bearer {}", user.access)))
            .to_http_request();
        assert!(authenticate(&req, &config).is_ok());
        assert!(matches!(require_staff(&req, &config), Err(AppError::Forbidden(_))));

        let staff = generate_token_pair(&config, &subject(true)).unwrap();
        let req = TestRequest::default()
            .insert_header(("Authorization", format!("Bearer {}", staff.access)))
            .to_http_request();
        assert_eq!(require_staff(&req, &config).unwrap().user_id, 42);
    }
}
