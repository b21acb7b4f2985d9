use std::future::Future;

use url::Url;

use super::{utils, AuthError, AuthSession, OAuthClient};

/// Execute the manual copy/paste OAuth flow.
pub async fn run_manual_flow<Notify, Input, Fut>(
    client: &OAuthClient,
    open_browser: bool,
    notify_authorization_url: Notify,
    mut read_input: Input,
) -> Result<AuthSession, AuthError>
where
    Notify: Fn(&Url) -> Result<(), AuthError>,
    Input: FnMut() -> Fut,
    Fut: Future<Output = Result<String, AuthError>>,
{
    let state = utils::random_state(32);
    let auth_url = client.authorization_url(&state);

    notify_authorization_url(&auth_url)?;

    if open_browser {
        open::that(auth_url.as_str()).map_err(|err| AuthError::BrowserLaunch(err.to_string()))?;
    }

    let raw = read_input().await?;
    let response = parse_manual_input(raw.trim())?;

    if let Some(returned_state) = response.state {
        if returned_state != state {
            return Err(AuthError::StateMismatch);
        }
    }

    client.exchange_code(&response.code).await
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct AuthorizationResponse {
    code: String,
    state: Option<String>,
}

/// Accepts either the bare code or the whole redirect URL the browser landed on.
fn parse_manual_input(input: &str) -> Result<AuthorizationResponse, AuthError> {
    if input.is_empty() {
        return Err(AuthError::InvalidAuthorizationResponse(
            "empty input".into(),
        ));
    }

    if let Ok(url) = Url::parse(input) {
        let params = utils::redirect_params(&url);
        if let Some(err) = params.error {
            return Err(AuthError::AccessDenied(err));
        }
        let code = params.code.ok_or(AuthError::MissingAuthorizationCode)?;
        return Ok(AuthorizationResponse {
            code,
            state: params.state,
        });
    }

    Ok(AuthorizationResponse {
        code: input.to_owned(),
        state: None,
    })
}
