use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// JWT claims issued by the identity service. The profile fields ride along
/// so services can embed the principal without an extra lookup.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: Uuid,
    pub name: Option<String>,
    pub email: String,
    pub image: Option<String>,
    pub iat: i64,
    pub exp: i64,
}

impl Claims {
    pub fn new(
        user_id: Uuid,
        name: Option<String>,
        email: impl Into<String>,
        image: Option<String>,
        duration_secs: i64,
    ) -> Self {
        let now = Utc::now().timestamp();
        Self {
            sub: user_id,
            name,
            email: email.into(),
            image,
            iat: now,
            exp: now + duration_secs,
        }
    }

    pub fn is_expired(&self) -> bool {
        Utc::now().timestamp() > self.exp
    }
}

/// The authenticated principal attached to a request.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub id: Uuid,
    pub name: Option<String>,
    pub email: String,
    pub image: Option<String>,
}

impl AuthUser {
    /// Display name fallback used in notification copy.
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or("Un utilisateur")
    }
}

impl From<Claims> for AuthUser {
    fn from(claims: Claims) -> Self {
        Self {
            id: claims.sub,
            name: claims.name,
            email: claims.email,
            image: claims.image,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_claims_are_not_expired() {
        let claims = Claims::new(Uuid::new_v4(), None, "a@b.c", None, 3600);
        assert!(!claims.is_expired());
    }

    #[test]
    fn past_claims_are_expired() {
        let mut claims = Claims::new(Uuid::new_v4(), None, "a@b.c", None, 3600);
        claims.exp = Utc::now().timestamp() - 10;
        assert!(claims.is_expired());
    }

    #[test]
    fn display_name_falls_back() {
        let user = AuthUser {
            id: Uuid::new_v4(),
            name: None,
            email: "a@b.c".into(),
            image: None,
        };
        assert_eq!(user.display_name(), "Un utilisateur");
    }
}
