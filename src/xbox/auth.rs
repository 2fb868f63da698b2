//! Xbox Live OAuth2 authorization-code helpers
//!
//! Flow:
//! 1. Setup: build the Microsoft account sign-in URL and show it to the user
//! 2. User signs in and is redirected to the desktop redirect URI; they paste
//!    the full URL back into the setup wizard
//! 3. The `code` query parameter is handed to `xbl_auth` for the token
//!    exchange and Xbox Live authorization

use url::Url;

use crate::error::{Result, XboxError};

pub const AUTHORIZE_URL: &str = "https://login.live.com/oauth20_authorize.srf";

/// Redirect target for desktop (native) clients; the user copies the final URL.
pub const OAUTH2_DESKTOP_REDIRECT_URI: &str = "https://login.live.com/oauth20_desktop.srf";

/// Scopes granting Xbox Live sign-in plus a refresh token.
pub const DEFAULT_SCOPES: &str = "Xboxlive.signin Xboxlive.offline_access";

/// Public client id of the Xbox web API desktop app.
const CLIENT_ID_DEFAULT: &str = "388ea51c-0b25-4029-aae2-17df49d23905";

/// XSTS relying party for Xbox Live API access.
pub const XSTS_RELYING_PARTY_XBOXLIVE: &str = "http://xboxlive.com";

/// OAuth client registration used for the code/refresh exchanges.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OAuthClient {
    pub client_id: String,
    pub client_secret: Option<String>,
    pub redirect_uri: String,
    pub scopes: String,
}

impl Default for OAuthClient {
    fn default() -> Self {
        Self {
            client_id: CLIENT_ID_DEFAULT.to_string(),
            client_secret: None,
            redirect_uri: OAUTH2_DESKTOP_REDIRECT_URI.to_string(),
            scopes: DEFAULT_SCOPES.to_string(),
        }
    }
}

impl OAuthClient {
    /// Default registration, overridable with `XBOX_CLIENT_ID` /
    /// `XBOX_CLIENT_SECRET`.
    pub fn from_env() -> Self {
        use crate::util::env::env_opt;
        let mut client = Self::default();
        if let Some(id) = env_opt("XBOX_CLIENT_ID") {
            client.client_id = id.trim().to_string();
        }
        client.client_secret = env_opt("XBOX_CLIENT_SECRET").map(|s| s.trim().to_string());
        client
    }

    /// Microsoft account sign-in URL for the authorization-code grant.
    pub fn authorization_url(&self) -> String {
        let params = [
            ("client_id", self.client_id.as_str()),
            ("response_type", "code"),
            ("approval_prompt", "auto"),
            ("scope", self.scopes.as_str()),
            ("redirect_uri", self.redirect_uri.as_str()),
        ];
        let query = params
            .iter()
            .map(|(k, v)| format!("{}={}", k, urlencoding::encode(v)))
            .collect::<Vec<_>>()
            .join("&");
        format!("{}?{}", AUTHORIZE_URL, query)
    }
}

/// Extract the authorization code from the redirect URL pasted by the user.
pub fn parse_redirect_url(redirect_url: &str) -> Result<String> {
    let trimmed = redirect_url.trim();
    let url = Url::parse(trimmed).map_err(|e| {
        XboxError::MalformedRedirect(format!("not a URL ({}): {}", e, redact(trimmed)))
    })?;
    url.query_pairs()
        .find(|(k, _)| k == "code")
        .map(|(_, v)| v.trim().to_string())
        .filter(|code| !code.is_empty())
        .ok_or_else(|| XboxError::MalformedRedirect(redact(trimmed)))
}

// The query string may carry the code itself; only keep scheme/host/path.
fn redact(url: &str) -> String {
    url.split('?').next().unwrap_or_default().to_string()
}
