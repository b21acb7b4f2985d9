use async_trait::async_trait;
use reqwest::header::AUTHORIZATION;
use reqwest::multipart::{Form, Part};
use reqwest::{Client, RequestBuilder};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use thiserror::Error;
use url::Url;

use crate::auth::AuthSession;
use crate::config::Configuration;

use super::{
    ApiResponse, Attachment, Category, Milestone, Priority, Project, RemoteErrorMessage, Space,
    Ticket, TicketType, User,
};

const USER_AGENT: &str = "backlog-rs/0.1.0";

/// Errors raised while building the HTTP client. Request failures are
/// reported through [`ApiResponse::Failure`] instead.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("invalid API endpoint: {0}")]
    InvalidEndpoint(#[from] url::ParseError),
}

/// The remote calls the ticket client depends on.
#[async_trait]
pub trait BacklogApi: Send + Sync {
    async fn get_space(&self) -> ApiResponse<Space>;
    async fn get_project(&self, project_key: &str) -> ApiResponse<Project>;
    async fn get_ticket_types(&self, project_key: &str) -> ApiResponse<Vec<TicketType>>;
    async fn get_priority_types(&self) -> ApiResponse<Vec<Priority>>;
    async fn get_categories(&self, project_key: &str) -> ApiResponse<Vec<Category>>;
    async fn get_milestones(&self, project_key: &str) -> ApiResponse<Vec<Milestone>>;
    async fn get_users(&self, project_key: &str) -> ApiResponse<Vec<User>>;
    async fn get_ticket(&self, key: &str) -> ApiResponse<Ticket>;
    async fn add_ticket(&self, project: &Project, ticket: &Ticket) -> ApiResponse<Ticket>;
    async fn update_ticket(&self, ticket: &Ticket) -> ApiResponse<Ticket>;
    async fn add_attachment(&self, file_name: &str, bytes: &[u8]) -> ApiResponse<Attachment>;
}

/// REST client for Backlog API v2, authenticated with an OAuth2 bearer token.
#[derive(Debug, Clone)]
pub struct HttpBacklogClient {
    http: Client,
    base: Url,
    auth_header: String,
}

impl HttpBacklogClient {
    /// Build a client for the space named in `config`.
    pub fn from_session(config: &Configuration, session: &AuthSession) -> Result<Self, ApiError> {
        Self::with_base_url(session, &format!("{}/api/v2", config.space_url()))
    }

    /// Build a client with a custom API root (useful for testing).
    pub fn with_base_url(session: &AuthSession, base: &str) -> Result<Self, ApiError> {
        let base = Url::parse(base)?;
        if base.cannot_be_a_base() {
            return Err(ApiError::InvalidEndpoint(
                url::ParseError::RelativeUrlWithCannotBeABaseBase,
            ));
        }
        let http = Client::builder().user_agent(USER_AGENT).build()?;
        Ok(Self {
            http,
            base,
            auth_header: session.authorization_header(),
        })
    }

    /// API root joined with `segments`, each percent-encoded as a single path segment.
    fn endpoint(&self, segments: &[&str]) -> Url {
        let mut url = self.base.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    async fn get<R: DeserializeOwned>(&self, url: Url) -> ApiResponse<R> {
        tracing::debug!(path = url.path(), "GET");
        self.send(self.http.get(url)).await
    }

    async fn post_form<R: DeserializeOwned>(
        &self,
        url: Url,
        form: &[(String, String)],
    ) -> ApiResponse<R> {
        tracing::debug!(path = url.path(), "POST");
        self.send(self.http.post(url).form(form)).await
    }

    async fn patch_form<R: DeserializeOwned>(
        &self,
        url: Url,
        form: &[(String, String)],
    ) -> ApiResponse<R> {
        tracing::debug!(path = url.path(), "PATCH");
        self.send(self.http.patch(url).form(form)).await
    }

    async fn send<R: DeserializeOwned>(&self, request: RequestBuilder) -> ApiResponse<R> {
        let response = match request.header(AUTHORIZATION, &self.auth_header).send().await {
            Ok(response) => response,
            Err(err) => return ApiResponse::failure(format!("HTTP error: {err}")),
        };

        let status = response.status();
        if status.is_success() {
            return match response.json::<R>().await {
                Ok(content) => ApiResponse::Success(content),
                Err(err) => ApiResponse::failure(format!("failed to deserialize response: {err}")),
            };
        }

        let body = response.text().await.unwrap_or_default();
        match serde_json::from_str::<ErrorEnvelope>(&body) {
            Ok(envelope) if !envelope.errors.is_empty() => ApiResponse::Failure(envelope.errors),
            _ => ApiResponse::failure(format!("HTTP status {status} body: {body}")),
        }
    }
}

/// Keys end up as one path segment; dot segments would be dropped from the URL.
fn check_key<T>(kind: &str, key: &str) -> Result<(), ApiResponse<T>> {
    if key.is_empty() || key == "." || key == ".." {
        return Err(ApiResponse::failure(format!("invalid {kind} key '{key}'")));
    }
    Ok(())
}

#[async_trait]
impl BacklogApi for HttpBacklogClient {
    async fn get_space(&self) -> ApiResponse<Space> {
        self.get(self.endpoint(&["space"])).await
    }

    async fn get_project(&self, project_key: &str) -> ApiResponse<Project> {
        if let Err(failure) = check_key("project", project_key) {
            return failure;
        }
        self.get(self.endpoint(&["projects", project_key])).await
    }

    async fn get_ticket_types(&self, project_key: &str) -> ApiResponse<Vec<TicketType>> {
        if let Err(failure) = check_key("project", project_key) {
            return failure;
        }
        self.get(self.endpoint(&["projects", project_key, "issueTypes"]))
            .await
    }

    async fn get_priority_types(&self) -> ApiResponse<Vec<Priority>> {
        self.get(self.endpoint(&["priorities"])).await
    }

    async fn get_categories(&self, project_key: &str) -> ApiResponse<Vec<Category>> {
        if let Err(failure) = check_key("project", project_key) {
            return failure;
        }
        self.get(self.endpoint(&["projects", project_key, "categories"]))
            .await
    }

    async fn get_milestones(&self, project_key: &str) -> ApiResponse<Vec<Milestone>> {
        if let Err(failure) = check_key("project", project_key) {
            return failure;
        }
        self.get(self.endpoint(&["projects", project_key, "versions"]))
            .await
    }

    async fn get_users(&self, project_key: &str) -> ApiResponse<Vec<User>> {
        if let Err(failure) = check_key("project", project_key) {
            return failure;
        }
        self.get(self.endpoint(&["projects", project_key, "users"]))
            .await
    }

    async fn get_ticket(&self, key: &str) -> ApiResponse<Ticket> {
        if let Err(failure) = check_key("ticket", key) {
            return failure;
        }
        self.get(self.endpoint(&["issues", key])).await
    }

    async fn add_ticket(&self, project: &Project, ticket: &Ticket) -> ApiResponse<Ticket> {
        let mut form = vec![("projectId".to_string(), project.id.to_string())];
        form.extend(ticket.form_fields());
        self.post_form(self.endpoint(&["issues"]), &form).await
    }

    async fn update_ticket(&self, ticket: &Ticket) -> ApiResponse<Ticket> {
        let Some(key) = ticket.key.as_deref() else {
            return ApiResponse::failure("ticket has no key to update");
        };
        if let Err(failure) = check_key("ticket", key) {
            return failure;
        }
        self.patch_form(self.endpoint(&["issues", key]), &ticket.form_fields())
            .await
    }

    async fn add_attachment(&self, file_name: &str, bytes: &[u8]) -> ApiResponse<Attachment> {
        tracing::debug!(file_name, size = bytes.len(), "POST /space/attachment");
        let part = Part::bytes(bytes.to_vec()).file_name(file_name.to_owned());
        let form = Form::new().part("file", part);
        let url = self.endpoint(&["space", "attachment"]);
        self.send(self.http.post(url).multipart(form)).await
    }
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    #[serde(default)]
    errors: Vec<RemoteErrorMessage>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};
    use httpmock::prelude::*;
    use httpmock::Method::PATCH;

    fn sample_session() -> AuthSession {
        AuthSession::new_access_token("test-token".into(), None, Utc::now() + Duration::hours(1))
    }

    fn client(server: &MockServer) -> HttpBacklogClient {
        HttpBacklogClient::with_base_url(&sample_session(), &server.url("/api/v2")).unwrap()
    }

    fn sample_project() -> Project {
        Project {
            id: 10,
            project_key: "PRJ".into(),
            name: "Project".into(),
            archived: false,
        }
    }

    #[test]
    fn from_session_targets_space_api() {
        let config = Configuration {
            space_key: "acme".into(),
            ..Configuration::default()
        };
        let client = HttpBacklogClient::from_session(&config, &sample_session()).unwrap();
        assert_eq!(
            client.endpoint(&["space"]).as_str(),
            "https://acme.backlog.com/api/v2/space"
        );
    }

    #[tokio::test]
    async fn get_space_sends_bearer_token() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(GET)
                .path("/api/v2/space")
                .header("authorization", "Bearer test-token");
            then.status(200).json_body_obj(&serde_json::json!({
                "spaceKey": "acme",
                "name": "Acme Inc.",
                "lang": "en",
                "timezone": "UTC"
            }));
        });

        let response = client(&server).get_space().await;
        mock.assert();
        let space = response.into_content().expect("space returned");
        assert_eq!(space.space_key, "acme");
    }

    #[tokio::test]
    async fn error_envelope_becomes_failure() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET).path("/api/v2/issues/PRJ-999");
            then.status(404).json_body_obj(&serde_json::json!({
                "errors": [{ "message": "No issue.", "code": 6, "moreInfo": "" }]
            }));
        });

        let response = client(&server).get_ticket("PRJ-999").await;
        assert!(!response.is_success());
        assert_eq!(response.errors()[0].message, "No issue.");
        assert_eq!(response.errors()[0].code, Some(6));
    }

    #[tokio::test]
    async fn unstructured_error_body_is_reported() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET).path("/api/v2/priorities");
            then.status(502).body("bad gateway");
        });

        let response = client(&server).get_priority_types().await;
        assert!(!response.is_success());
        assert!(response.joined_errors().contains("bad gateway"));
    }

    #[tokio::test]
    async fn add_ticket_posts_form_with_project_id() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(POST)
                .path("/api/v2/issues")
                .header("content-type", "application/x-www-form-urlencoded")
                .body_contains("projectId=10")
                .body_contains("summary=Bug+A");
            then.status(201).json_body_obj(&serde_json::json!({
                "id": 101,
                "issueKey": "PRJ-101",
                "summary": "Bug A"
            }));
        });

        let response = client(&server)
            .add_ticket(&sample_project(), &Ticket::new("Bug A"))
            .await;
        mock.assert();
        assert_eq!(
            response.into_content().and_then(|ticket| ticket.key),
            Some("PRJ-101".to_string())
        );
    }

    #[tokio::test]
    async fn update_ticket_patches_by_key() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(PATCH)
                .path("/api/v2/issues/PRJ-7")
                .body_contains("summary=Renamed");
            then.status(200).json_body_obj(&serde_json::json!({
                "id": 7,
                "issueKey": "PRJ-7",
                "summary": "Renamed"
            }));
        });

        let mut ticket = Ticket::new("Renamed");
        ticket.key = Some("PRJ-7".into());
        let response = client(&server).update_ticket(&ticket).await;
        mock.assert();
        assert!(response.is_success());
    }

    #[test]
    fn keys_are_encoded_as_single_segments() {
        let server = MockServer::start();
        let client = client(&server);
        assert_eq!(
            client.endpoint(&["issues", "../space"]).path(),
            "/api/v2/issues/..%2Fspace"
        );
        assert_eq!(
            client.endpoint(&["issues", "A?b#c"]).path(),
            "/api/v2/issues/A%3Fb%23c"
        );
    }

    #[tokio::test]
    async fn traversing_key_does_not_reach_other_endpoints() {
        let server = MockServer::start();
        let space = server.mock(|when, then| {
            when.method(GET).path("/api/v2/space");
            then.status(200).json_body_obj(&serde_json::json!({
                "spaceKey": "acme",
                "name": "Acme Inc."
            }));
        });

        let response = client(&server).get_ticket("../space").await;
        space.assert_hits(0);
        assert!(!response.is_success());
    }

    #[tokio::test]
    async fn dot_segment_key_fails_locally() {
        let server = MockServer::start();
        let any = server.mock(|when, then| {
            when.any_request();
            then.status(200);
        });

        let response = client(&server).get_ticket("..").await;
        any.assert_hits(0);
        assert_eq!(response.joined_errors(), "invalid ticket key '..'");
    }

    #[tokio::test]
    async fn update_without_key_fails_locally() {
        let server = MockServer::start();
        let response = client(&server).update_ticket(&Ticket::new("x")).await;
        assert_eq!(response.joined_errors(), "ticket has no key to update");
    }

    #[tokio::test]
    async fn add_attachment_uploads_multipart_file() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(POST)
                .path("/api/v2/space/attachment")
                .body_contains("filename=\"log.txt\"")
                .body_contains("hello");
            then.status(200).json_body_obj(&serde_json::json!({
                "id": 42,
                "name": "log.txt",
                "size": 5
            }));
        });

        let response = client(&server).add_attachment("log.txt", b"hello").await;
        mock.assert();
        let attachment = response.into_content().unwrap();
        assert_eq!(attachment.id, 42);
        assert_eq!(attachment.size, 5);
    }
}
