//! OAuth redirect sign-in (authorization code + PKCE).
//!
//! `/auth/oauth/login` parks the CSRF state and PKCE verifier in the store
//! and redirects to the provider; `/auth/oauth/callback` consumes that state,
//! exchanges the code, looks the user up by the provider-reported email
//! (creating the account and profile on first sign-in), and hands the client
//! a bearer token in the redirect fragment.

use axum::{
  extract::{Query, State},
  response::Redirect,
};
use chrono::Utc;
use crewhub_core::{
  account::{NewAccount, OAuthState},
  error::AsCoreError,
  store::MarketStore,
};
use oauth2::{
  AuthUrl, AuthorizationCode, ClientId, ClientSecret, CsrfToken,
  PkceCodeChallenge, PkceCodeVerifier, RedirectUrl, Scope, TokenResponse,
  TokenUrl, basic::BasicClient,
};
use serde::Deserialize;

use crate::{AppState, OAuthConfig, auth, error::ApiError};

type ConfiguredClient = oauth2::Client<
  oauth2::StandardErrorResponse<oauth2::basic::BasicErrorResponseType>,
  oauth2::StandardTokenResponse<oauth2::EmptyExtraTokenFields, oauth2::basic::BasicTokenType>,
  oauth2::StandardTokenIntrospectionResponse<oauth2::EmptyExtraTokenFields, oauth2::basic::BasicTokenType>,
  oauth2::StandardRevocableToken,
  oauth2::StandardErrorResponse<oauth2::RevocationErrorResponseType>,
  oauth2::EndpointSet,
  oauth2::EndpointNotSet,
  oauth2::EndpointNotSet,
  oauth2::EndpointNotSet,
  oauth2::EndpointSet,
>;

fn client(cfg: &OAuthConfig) -> Result<ConfiguredClient, ApiError> {
  let bad = |e: oauth2::url::ParseError| {
    ApiError::BadRequest(format!("oauth endpoint url: {e}"))
  };

  Ok(
    BasicClient::new(ClientId::new(cfg.client_id.clone()))
      .set_client_secret(ClientSecret::new(cfg.client_secret.clone()))
      .set_auth_uri(AuthUrl::new(cfg.auth_url.clone()).map_err(bad)?)
      .set_token_uri(TokenUrl::new(cfg.token_url.clone()).map_err(bad)?)
      .set_redirect_uri(RedirectUrl::new(cfg.redirect_url.clone()).map_err(bad)?),
  )
}

fn oauth_config<S: MarketStore>(state: &AppState<S>) -> Result<&OAuthConfig, ApiError> {
  state
    .config
    .oauth
    .as_ref()
    .ok_or_else(|| ApiError::NotFound("oauth sign-in is not configured".into()))
}

// ─── Login redirect ──────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct LoginQuery {
  pub return_url: Option<String>,
}

/// `GET /auth/oauth/login[?return_url=...]`
pub async fn login<S>(
  State(state): State<AppState<S>>,
  Query(query): Query<LoginQuery>,
) -> Result<Redirect, ApiError>
where
  S: MarketStore + Clone + Send + Sync + 'static,
  S::Error: std::error::Error + AsCoreError + Send + Sync + 'static,
{
  let client = client(oauth_config(&state)?)?;

  let (pkce_challenge, pkce_verifier) = PkceCodeChallenge::new_random_sha256();
  let (authorize_url, csrf_state) = client
    .authorize_url(CsrfToken::new_random)
    .add_scope(Scope::new("openid".to_string()))
    .add_scope(Scope::new("email".to_string()))
    .add_scope(Scope::new("profile".to_string()))
    .set_pkce_challenge(pkce_challenge)
    .url();

  state
    .store
    .put_oauth_state(OAuthState {
      state:         csrf_state.secret().clone(),
      pkce_verifier: pkce_verifier.secret().clone(),
      return_url:    query.return_url,
      created_at:    Utc::now(),
    })
    .await
    .map_err(ApiError::from_store)?;

  Ok(Redirect::to(authorize_url.as_str()))
}

// ─── Callback ────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct CallbackQuery {
  pub state: Option<String>,
  pub code:  Option<String>,
}

#[derive(Debug, Deserialize)]
struct UserInfo {
  email: Option<String>,
  name:  Option<String>,
}

/// `GET /auth/oauth/callback?state=...&code=...`
pub async fn callback<S>(
  State(state): State<AppState<S>>,
  Query(query): Query<CallbackQuery>,
) -> Result<Redirect, ApiError>
where
  S: MarketStore + Clone + Send + Sync + 'static,
  S::Error: std::error::Error + AsCoreError + Send + Sync + 'static,
{
  let cfg = oauth_config(&state)?.clone();

  let csrf_state = query
    .state
    .ok_or_else(|| ApiError::BadRequest("callback without state".into()))?;
  let code = query
    .code
    .ok_or_else(|| ApiError::BadRequest("callback without code".into()))?;

  // One shot per state string; a stale or forged state dies here.
  let parked = state
    .store
    .take_oauth_state(csrf_state)
    .await
    .map_err(ApiError::from_store)?
    .ok_or(ApiError::Unauthorized)?;

  let http_client = reqwest::ClientBuilder::new()
    .redirect(reqwest::redirect::Policy::none())
    .build()
    .map_err(|e| ApiError::Upstream(e.to_string()))?;

  let token_result = client(&cfg)?
    .exchange_code(AuthorizationCode::new(code))
    .set_pkce_verifier(PkceCodeVerifier::new(parked.pkce_verifier))
    .request_async(&http_client)
    .await
    .map_err(|e| ApiError::Upstream(format!("code exchange failed: {e}")))?;

  let userinfo: UserInfo = http_client
    .get(&cfg.userinfo_url)
    .bearer_auth(token_result.access_token().secret())
    .send()
    .await
    .map_err(|e| ApiError::Upstream(format!("userinfo fetch failed: {e}")))?
    .json()
    .await
    .map_err(|e| ApiError::Upstream(format!("malformed userinfo: {e}")))?;

  let email = userinfo
    .email
    .ok_or_else(|| ApiError::Upstream("provider reported no email".into()))?
    .to_lowercase();

  let account = match state
    .store
    .account_by_email(&email)
    .await
    .map_err(ApiError::from_store)?
  {
    Some(account) => account,
    None => {
      let name = userinfo
        .name
        .filter(|n| !n.trim().is_empty())
        .unwrap_or_else(|| {
          email.split('@').next().unwrap_or(email.as_str()).to_owned()
        });

      let (account, _) = state
        .store
        .create_account(NewAccount {
          email:         email.clone(),
          password_hash: None,
          name,
          role:          Default::default(),
        })
        .await
        .map_err(ApiError::from_store)?;
      tracing::info!(user = %account.user_id, "account created via oauth");
      account
    }
  };

  let token = auth::issue_session(&state, account.user_id).await?;

  let destination = parked
    .return_url
    .unwrap_or_else(|| state.config.base_url.clone());
  Ok(Redirect::to(&format!("{destination}#token={token}")))
}
