use std::net::IpAddr;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::oneshot;
use url::Url;

use super::{utils, AuthError, AuthSession, OAuthClient};

const SUCCESS_HTML: &str = r#"<html><body><h1>Authentication complete</h1><p>You may close this window and return to the terminal.</p></body></html>"#;
const ERROR_HTML: &str = r#"<html><body><h1>Authentication failed</h1><p>Please return to the terminal for details.</p></body></html>"#;

/// Run the browser-based OAuth flow, listening on the configured loopback redirect URI.
pub async fn run_loopback_flow<F>(
    client: &OAuthClient,
    open_browser: bool,
    notify_authorization_url: F,
) -> Result<AuthSession, AuthError>
where
    F: Fn(&Url) -> Result<(), AuthError>,
{
    let (host, port) = loopback_address(&client.config().redirect_uri)?;
    let listener = TcpListener::bind((host.as_str(), port)).await?;
    let state = utils::random_state(32);
    let auth_url = client.authorization_url(&state);

    notify_authorization_url(&auth_url)?;

    if open_browser {
        open::that(auth_url.as_str()).map_err(|err| AuthError::BrowserLaunch(err.to_string()))?;
    }

    let (tx, rx) = oneshot::channel();
    tokio::spawn(async move {
        let result = accept_authorization(listener, state).await;
        let _ = tx.send(result);
    });

    let code = rx.await.map_err(|_| AuthError::ListenerClosed)??;

    client.exchange_code(&code).await
}

/// Host and port to bind for a redirect URI, or an error when it is not served locally.
fn loopback_address(redirect_uri: &Url) -> Result<(String, u16), AuthError> {
    let not_loopback = || AuthError::NonLoopbackRedirect(redirect_uri.to_string());
    if redirect_uri.scheme() != "http" {
        return Err(not_loopback());
    }
    let host = redirect_uri.host_str().ok_or_else(not_loopback)?;
    let is_loopback = host.eq_ignore_ascii_case("localhost")
        || host
            .trim_matches(|c| c == '[' || c == ']')
            .parse::<IpAddr>()
            .map(|ip| ip.is_loopback())
            .unwrap_or(false);
    if !is_loopback {
        return Err(not_loopback());
    }
    let port = redirect_uri.port_or_known_default().unwrap_or(80);
    let bind_host = if host.eq_ignore_ascii_case("localhost") {
        "127.0.0.1".to_owned()
    } else {
        host.trim_matches(|c| c == '[' || c == ']').to_owned()
    };
    Ok((bind_host, port))
}

async fn accept_authorization(
    listener: TcpListener,
    expected_state: String,
) -> Result<String, AuthError> {
    let (mut stream, _addr) = listener.accept().await?;
    let mut buffer = [0u8; 4096];
    let n = stream.read(&mut buffer).await?;
    let request = String::from_utf8_lossy(&buffer[..n]);
    let path = parse_request_path(&request)?;
    let url = Url::parse(&format!("http://localhost{path}"))?;
    let params = utils::redirect_params(&url);

    if let Some(err) = params.error {
        respond(&mut stream, 400, ERROR_HTML).await?;
        return Err(AuthError::AccessDenied(err));
    }

    let code = params.code.ok_or(AuthError::MissingAuthorizationCode)?;
    if params.state.as_deref() != Some(expected_state.as_str()) {
        respond(&mut stream, 400, ERROR_HTML).await?;
        return Err(AuthError::StateMismatch);
    }

    respond(&mut stream, 200, SUCCESS_HTML).await?;
    let _ = stream.shutdown().await;
    Ok(code)
}

fn parse_request_path(request: &str) -> Result<&str, AuthError> {
    let first_line = request
        .lines()
        .next()
        .ok_or_else(|| AuthError::InvalidAuthorizationResponse("missing request line".into()))?;
    let mut parts = first_line.split_whitespace();
    let _method = parts
        .next()
        .ok_or_else(|| AuthError::InvalidAuthorizationResponse("missing method".into()))?;
    let path = parts
        .next()
        .ok_or_else(|| AuthError::InvalidAuthorizationResponse("missing path".into()))?;
    Ok(path)
}

async fn respond(stream: &mut TcpStream, status: u16, body: &str) -> Result<(), AuthError> {
    let status_line = match status {
        200 => "HTTP/1.1 200 OK",
        400 => "HTTP/1.1 400 Bad Request",
        _ => "HTTP/1.1 500 Internal Server Error",
    };
    let response = format!(
        "{status_line}\r\nContent-Type: text/html; charset=utf-8\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
        body.len()
    );
    stream.write_all(response.as_bytes()).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;

    use crate::auth::{OAuthConfig, OAuthEndpoints};

    fn free_port() -> u16 {
        std::net::TcpListener::bind("127.0.0.1:0")
            .unwrap()
            .local_addr()
            .unwrap()
            .port()
    }

    fn loopback_client(token_url: Url, port: u16) -> OAuthClient {
        let config = OAuthConfig::new(
            "client",
            "secret",
            Url::parse(&format!("http://127.0.0.1:{port}/callback")).unwrap(),
        );
        let endpoints = OAuthEndpoints {
            authorization_url: Url::parse("http://localhost/OAuth2AccessRequest.action").unwrap(),
            token_url,
        };
        OAuthClient::with_endpoints(config, endpoints).unwrap()
    }

    fn send_redirect(port: u16, query: String) {
        tokio::spawn(async move {
            let mut stream = TcpStream::connect(("127.0.0.1", port)).await.unwrap();
            let request = format!(
                "GET /callback?{query} HTTP/1.1\r\nHost: 127.0.0.1:{port}\r\nConnection: close\r\n\r\n"
            );
            stream.write_all(request.as_bytes()).await.unwrap();
            let mut buf = [0u8; 512];
            let _ = stream.read(&mut buf).await;
        });
    }

    #[test]
    fn loopback_address_accepts_localhost_variants() {
        let url = Url::parse("http://localhost:8080/callback").unwrap();
        assert_eq!(loopback_address(&url).unwrap(), ("127.0.0.1".into(), 8080));
        let url = Url::parse("http://127.0.0.1/callback").unwrap();
        assert_eq!(loopback_address(&url).unwrap(), ("127.0.0.1".into(), 80));
    }

    #[test]
    fn loopback_address_rejects_remote_hosts() {
        let url = Url::parse("https://example.com/callback").unwrap();
        assert!(matches!(
            loopback_address(&url),
            Err(AuthError::NonLoopbackRedirect(_))
        ));
        let url = Url::parse("http://example.com/callback").unwrap();
        assert!(matches!(
            loopback_address(&url),
            Err(AuthError::NonLoopbackRedirect(_))
        ));
    }

    #[tokio::test]
    async fn loopback_flow_success() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(POST)
                .path("/token")
                .body_contains("code=test-code");
            then.status(200).json_body_obj(&serde_json::json!({
                "access_token": "abc",
                "refresh_token": "ref",
                "token_type": "Bearer",
                "expires_in": 3600
            }));
        });

        let port = free_port();
        let client = loopback_client(Url::parse(&server.url("/token")).unwrap(), port);

        let session = run_loopback_flow(&client, false, |url| {
            let state = url
                .query_pairs()
                .find(|(k, _)| k == "state")
                .map(|(_, v)| v.into_owned())
                .expect("state present");
            send_redirect(port, format!("code=test-code&state={state}"));
            Ok(())
        })
        .await
        .expect("loopback flow succeeded");

        mock.assert();
        assert_eq!(session.access_token, "abc");
        assert_eq!(session.refresh_token.as_deref(), Some("ref"));
    }

    #[tokio::test]
    async fn loopback_flow_state_mismatch() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(POST).path("/token");
            then.status(200).json_body_obj(&serde_json::json!({
                "access_token": "abc",
                "token_type": "Bearer",
                "expires_in": 3600
            }));
        });

        let port = free_port();
        let client = loopback_client(Url::parse(&server.url("/token")).unwrap(), port);

        let err = run_loopback_flow(&client, false, |_url| {
            send_redirect(port, "code=test-code&state=wrong".into());
            Ok(())
        })
        .await
        .unwrap_err();

        assert!(matches!(err, AuthError::StateMismatch));
    }

    #[tokio::test]
    async fn loopback_flow_access_denied() {
        let port = free_port();
        let client = loopback_client(Url::parse("http://localhost/token").unwrap(), port);

        let err = run_loopback_flow(&client, false, |_url| {
            send_redirect(port, "error=access_denied".into());
            Ok(())
        })
        .await
        .unwrap_err();

        assert!(matches!(err, AuthError::AccessDenied(reason) if reason == "access_denied"));
    }
}
