use crate::models::{Claims, IdentityRecord, SessionSettings};
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode};

/// Issues and validates HS256 session tokens bound to one identity and device
pub struct SessionTokens {
    secret: String,
    expiration_secs: i64,
}

impl SessionTokens {
    pub fn new(secret: impl Into<String>, expiration_secs: i64) -> Self {
        Self {
            secret: secret.into(),
            expiration_secs,
        }
    }

    pub fn issue(
        &self,
        record: &IdentityRecord,
        device_fingerprint: &str,
    ) -> Result<String, jsonwebtoken::errors::Error> {
        let expiration = chrono::Utc::now()
            .checked_add_signed(chrono::Duration::seconds(self.expiration_secs))
            .unwrap_or_else(chrono::Utc::now)
            .timestamp();

        let claims = Claims {
            sub: record.identity_key.clone(),
            device: device_fingerprint.to_string(),
            role: record.role,
            exp: expiration.max(0) as usize,
        };

        encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(self.secret.as_bytes()),
        )
    }

    pub fn validate(&self, token: &str) -> Result<Claims, jsonwebtoken::errors::Error> {
        let token_data = decode::<Claims>(
            token,
            &DecodingKey::from_secret(self.secret.as_bytes()),
            &Validation::default(),
        )?;
        Ok(token_data.claims)
    }
}

impl From<&SessionSettings> for SessionTokens {
    fn from(settings: &SessionSettings) -> Self {
        Self::new(settings.jwt_secret.clone(), settings.expiration_secs)
    }
}
