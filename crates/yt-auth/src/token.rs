use chrono::{DateTime, Datelike, Duration, Utc};
use serde::{Deserialize, Deserializer, Serialize};

/// Tokens are treated as expired this long before their actual expiry
const EXPIRY_SKEW_SECS: i64 = 60;

/// OAuth 2.0 token information
///
/// Field names follow the layout used by `golang.org/x/oauth2`, so cache files
/// written by Go tools sharing the same credential directory load unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OAuthToken {
    /// Access token for API requests
    pub access_token: String,
    /// Token type (usually "Bearer")
    #[serde(default)]
    pub token_type: String,
    /// Refresh token for getting new access tokens
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    /// Expiry time, `None` when the token does not expire
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "deserialize_expiry"
    )]
    pub expiry: Option<DateTime<Utc>>,
}

impl OAuthToken {
    /// Check if the token is expired or will expire soon (within 60 seconds)
    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now())
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        match self.expiry {
            Some(expiry) => now + Duration::seconds(EXPIRY_SKEW_SECS) >= expiry,
            None => false,
        }
    }

    /// Whether the token can still authorize requests, either directly or by refresh
    pub fn is_usable(&self) -> bool {
        !self.access_token.is_empty() && (!self.is_expired() || self.refresh_token.is_some())
    }

    /// Token type to put in the `Authorization` header
    pub fn auth_scheme(&self) -> &str {
        if self.token_type.is_empty() || self.token_type.eq_ignore_ascii_case("bearer") {
            "Bearer"
        } else {
            &self.token_type
        }
    }
}

// Go writes an unset expiry as the zero time.
fn deserialize_expiry<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    let expiry = Option::<DateTime<Utc>>::deserialize(deserializer)?;
    Ok(expiry.filter(|t| t.year() > 1))
}
