//! Xbox Live Service Headers Construction
//!
//! Required Headers for Xbox Live Services:
//! - Authorization: XBL3.0 x=<userhash>;<xsts token>
//! - x-xbl-contract-version: API version, per service
//! - MS-CV: Correlation Vector for request tracking
//! - Accept-Language: locale used for presence text and title names

use reqwest::header::{HeaderMap, HeaderName, HeaderValue, ACCEPT, ACCEPT_LANGUAGE, AUTHORIZATION};
use tracing::debug;

use crate::error::{Result, XboxError};

/// Xbox Live API contract versions for different services
pub mod contract_versions {
    /// Profile settings API version
    pub const PROFILE: &str = "3";

    /// People hub (friends batch with presence decoration)
    pub const PEOPLE_HUB: &str = "3";

    /// User presence API version
    pub const PRESENCE: &str = "3";

    /// Title hub API version
    pub const TITLE_HUB: &str = "2";
}

/// Correlation Vector generator for MS-CV header
#[derive(Debug)]
pub struct CorrelationVector {
    base: String,
    counter: u32,
}

impl CorrelationVector {
    /// Create a new correlation vector with random base
    pub fn new() -> Self {
        use rand::Rng;
        let mut rng = rand::thread_rng();
        let base = format!("{}.{}", rng.gen::<u64>(), rng.gen::<u32>());
        Self { base, counter: 0 }
    }

    /// Get the next value in the correlation vector chain
    pub fn next(&mut self) -> String {
        let value = format!("{}.{}", self.base, self.counter);
        self.counter += 1;
        value
    }
}

impl Default for CorrelationVector {
    fn default() -> Self {
        Self::new()
    }
}

/// XSTS token plus the user hash it must be presented with.
#[derive(Clone)]
pub struct XblAuthorization {
    pub user_hash: String,
    pub xsts_token: String,
    pub xuid: String,
    pub gamertag: Option<String>,
}

impl XblAuthorization {
    pub fn header_value(&self) -> String {
        format!("XBL3.0 x={};{}", self.user_hash, self.xsts_token)
    }
}

impl std::fmt::Debug for XblAuthorization {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("XblAuthorization")
            .field("user_hash", &self.user_hash)
            .field("xuid", &self.xuid)
            .field("gamertag", &self.gamertag)
            .field("xsts_token", &"<redacted>")
            .finish()
    }
}

/// Build standard Xbox Live API request headers
///
/// # Arguments
/// * `auth` - user hash + XSTS token from the authorization chain
/// * `contract_version` - API contract version (use constants from contract_versions)
/// * `cv` - Correlation vector for request tracking
/// * `language` - Accept-Language value (e.g. "en-US")
pub fn build_xbox_live_headers(
    auth: &XblAuthorization,
    contract_version: &str,
    cv: &str,
    language: &str,
) -> Result<HeaderMap> {
    let mut headers = HeaderMap::new();

    headers.insert(AUTHORIZATION, header_value(&auth.header_value(), "Authorization")?);
    headers.insert(
        HeaderName::from_static("x-xbl-contract-version"),
        header_value(contract_version, "x-xbl-contract-version")?,
    );
    headers.insert(HeaderName::from_static("ms-cv"), header_value(cv, "MS-CV")?);
    headers.insert(ACCEPT_LANGUAGE, header_value(language, "Accept-Language")?);
    headers.insert(ACCEPT, HeaderValue::from_static("application/json"));

    // Never log the authorization value; it carries the XSTS token.
    debug!(contract_version, cv, "xbox::headers: built Xbox Live headers");

    Ok(headers)
}

fn header_value(value: &str, name: &str) -> Result<HeaderValue> {
    HeaderValue::from_str(value)
        .map_err(|e| XboxError::AuthExchange(format!("invalid {} header value: {}", name, e)))
}
