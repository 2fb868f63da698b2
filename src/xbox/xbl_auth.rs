/// Xbox Live authorization chain using the xal crate
///
/// Flow:
/// 1. Setup: the authorization code from the pasted redirect URL is exchanged
///    for Windows Live tokens
/// 2. Later runs: the stored refresh token is exchanged for fresh Windows Live
///    tokens
/// 3. Either way the traditional flow (device, user, XSTS) produces the XSTS
///    token used by every data call

use serde::Deserialize;
use tracing::{debug, info, warn};
use xal::oauth2::{AuthorizationCode, RedirectUrl, RefreshToken, Scope, TokenResponse};
use xal::response::{WindowsLiveTokens, XSTSToken};
use xal::{AccessTokenPrefix, Flows, XalAppParameters, XalAuthenticator, XalClientParameters};

use super::auth::{OAuthClient, XSTS_RELYING_PARTY_XBOXLIVE};
use super::headers::XblAuthorization;
use super::models::OAuth2Tokens;
use crate::error::{Result, XboxError};

const SANDBOX_RETAIL: &str = "RETAIL";

/// Authenticator registered with our OAuth client id and redirect URI.
fn authenticator(oauth: &OAuthClient) -> Result<XalAuthenticator> {
    let redirect_uri = RedirectUrl::new(oauth.redirect_uri.clone())
        .map_err(|e| XboxError::AuthExchange(format!("invalid redirect URI: {}", e)))?;
    let app_params = XalAppParameters {
        client_id: oauth.client_id.clone(),
        title_id: None,
        auth_scopes: oauth
            .scopes
            .split_whitespace()
            .map(|s| Scope::new(s.to_string()))
            .collect(),
        redirect_uri: Some(redirect_uri),
        client_secret: oauth.client_secret.clone(),
    };
    Ok(XalAuthenticator::new(
        app_params,
        XalClientParameters::default(),
        SANDBOX_RETAIL.to_string(),
    ))
}

/// Exchange an authorization code and authorize against Xbox Live.
pub async fn exchange_code(
    oauth: &OAuthClient,
    code: &str,
) -> Result<(OAuth2Tokens, XblAuthorization)> {
    let mut authenticator = authenticator(oauth)?;
    let live_tokens: WindowsLiveTokens = authenticator
        .exchange_code_for_token(AuthorizationCode::new(code.to_string()), None)
        .await
        .map_err(|e| XboxError::AuthExchange(format!("code exchange rejected: {}", e)))?;
    info!("xbl_auth: authorization code exchanged for Windows Live tokens");

    let tokens = oauth_tokens(&live_tokens);
    let auth = authorize_xbox_live_traditional(&mut authenticator, live_tokens).await?;
    Ok((tokens, auth))
}

/// Refresh Windows Live tokens and re-authorize against Xbox Live.
///
/// A refresh response without a rotated refresh token keeps the old one.
pub async fn refresh(
    oauth: &OAuthClient,
    refresh_token: &str,
) -> Result<(OAuth2Tokens, XblAuthorization)> {
    let mut authenticator = authenticator(oauth)?;
    let live_tokens: WindowsLiveTokens = authenticator
        .refresh_token(&RefreshToken::new(refresh_token.to_string()))
        .await
        .map_err(|e| XboxError::AuthExchange(format!("token refresh rejected: {}", e)))?;
    debug!("xbl_auth: Windows Live tokens refreshed");

    let mut tokens = oauth_tokens(&live_tokens);
    if tokens.refresh_token.as_deref().map_or(true, str::is_empty) {
        tokens.refresh_token = Some(refresh_token.to_string());
    }
    let auth = authorize_xbox_live_traditional(&mut authenticator, live_tokens).await?;
    Ok((tokens, auth))
}

async fn authorize_xbox_live_traditional(
    authenticator: &mut XalAuthenticator,
    live_tokens: WindowsLiveTokens,
) -> Result<XblAuthorization> {
    // Accounts differ in which access token prefix the XASU request accepts.
    let try_prefixes = [AccessTokenPrefix::D, AccessTokenPrefix::T];

    let mut last_err = None;
    for (idx, prefix) in try_prefixes.iter().cloned().enumerate() {
        debug!(
            "xbl_auth: attempting traditional Xbox Live authorization with prefix={:?}",
            prefix
        );
        match Flows::xbox_live_authorization_traditional_flow(
            authenticator,
            live_tokens.clone(),
            XSTS_RELYING_PARTY_XBOXLIVE.to_string(),
            prefix.clone(),
            false,
        )
        .await
        {
            Ok(store) => {
                let xsts = store.authorization_token.as_ref().ok_or_else(|| {
                    XboxError::AuthExchange(
                        "traditional flow did not return an XSTS token".to_string(),
                    )
                })?;
                let auth = authorization_from_xsts(xsts)?;
                info!(xuid = %auth.xuid, "xbl_auth: XSTS authorization obtained");
                return Ok(auth);
            }
            Err(e) => {
                if idx + 1 < try_prefixes.len() {
                    info!(
                        "xbl_auth: traditional authorization failed with prefix={:?}; trying next prefix",
                        prefix
                    );
                } else {
                    warn!(
                        "xbl_auth: traditional authorization failed with prefix={:?} (last prefix)",
                        prefix
                    );
                }
                debug!("xbl_auth: prefix={:?} error: {}", prefix, e);
                last_err = Some(e.to_string());
            }
        }
    }

    Err(XboxError::AuthExchange(format!(
        "Xbox Live authorization failed for all prefixes: {}",
        last_err.unwrap_or_default()
    )))
}

/// Persistable token bundle from the Windows Live token response.
fn oauth_tokens(live: &WindowsLiveTokens) -> OAuth2Tokens {
    OAuth2Tokens {
        token_type: "bearer".to_string(),
        expires_in: live
            .expires_in()
            .and_then(|d| i64::try_from(d.as_secs()).ok())
            .unwrap_or_default(),
        scope: live
            .scopes()
            .map(|scopes| {
                scopes
                    .iter()
                    .map(|s| s.as_str())
                    .collect::<Vec<_>>()
                    .join(" ")
            })
            .unwrap_or_default(),
        access_token: live.access_token().secret().to_string(),
        refresh_token: live.refresh_token().map(|t| t.secret().to_string()),
        user_id: String::new(),
        issued: chrono::Utc::now(),
        extra: Default::default(),
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct XstsWire {
    token: String,
    #[serde(default)]
    display_claims: Option<XstsClaims>,
}

#[derive(Debug, Default, Deserialize)]
struct XstsClaims {
    #[serde(default)]
    xui: Vec<XuiClaim>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct XuiClaim {
    uhs: String,
    xid: Option<String>,
    gtg: Option<String>,
}

/// User hash, xuid and gamertag claims of an XSTS token.
fn authorization_from_xsts(xsts: &XSTSToken) -> Result<XblAuthorization> {
    let wire: XstsWire = serde_json::from_value(serde_json::to_value(xsts)?)?;
    let claim = wire
        .display_claims
        .unwrap_or_default()
        .xui
        .into_iter()
        .next()
        .ok_or_else(|| XboxError::AuthExchange("XSTS token carried no user claims".to_string()))?;
    let xuid = claim
        .xid
        .filter(|x| !x.is_empty())
        .ok_or_else(|| XboxError::AuthExchange("XSTS token carried no xuid".to_string()))?;
    Ok(XblAuthorization {
        user_hash: claim.uhs,
        xsts_token: wire.token,
        xuid,
        gamertag: claim.gtg,
    })
}
