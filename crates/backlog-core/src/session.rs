use std::path::Path;

use thiserror::Error;

use crate::api::{
    ApiResponse, Attachment, BacklogApi, Category, Milestone, Priority, Project, Space, Ticket,
    TicketType, User,
};
use crate::config::Configuration;
use crate::links;
use crate::retry::{resolve_result, retry_on_conflict};

/// Errors that prevent a session from being usable.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("failed to load {resource}: {message}")]
    Remote {
        resource: &'static str,
        message: String,
    },
}

/// Reference collections of the configured project.
#[derive(Debug, Clone, Default)]
pub struct ProjectData {
    pub ticket_types: Vec<TicketType>,
    pub priorities: Vec<Priority>,
    pub categories: Vec<Category>,
    pub milestones: Vec<Milestone>,
    pub users: Vec<User>,
}

impl ProjectData {
    pub fn ticket_type_named(&self, name: &str) -> Option<&TicketType> {
        self.ticket_types
            .iter()
            .find(|item| item.name.eq_ignore_ascii_case(name))
    }

    pub fn priority_named(&self, name: &str) -> Option<&Priority> {
        self.priorities
            .iter()
            .find(|item| item.name.eq_ignore_ascii_case(name))
    }

    pub fn category_named(&self, name: &str) -> Option<&Category> {
        self.categories
            .iter()
            .find(|item| item.name.eq_ignore_ascii_case(name))
    }

    pub fn milestone_named(&self, name: &str) -> Option<&Milestone> {
        self.milestones
            .iter()
            .find(|item| item.name.eq_ignore_ascii_case(name))
    }

    /// Match a project member by display name or login id.
    pub fn user_named(&self, name: &str) -> Option<&User> {
        self.users.iter().find(|user| {
            user.name.eq_ignore_ascii_case(name)
                || user
                    .user_id
                    .as_deref()
                    .is_some_and(|id| id.eq_ignore_ascii_case(name))
        })
    }
}

/// An authenticated connection to one Backlog project.
///
/// Built by [`Session::load`] after authentication; the space, project and
/// reference data are a snapshot that only changes through
/// [`Session::load_project_info`].
#[derive(Debug)]
pub struct Session<A> {
    api: A,
    config: Configuration,
    space: Space,
    project: Project,
    data: ProjectData,
}

impl<A: BacklogApi> Session<A> {
    /// Resolve the configured space and project, then snapshot its reference data.
    pub async fn load(api: A, config: Configuration) -> Result<Self, SessionError> {
        let space = required(api.get_space().await, "space")?;
        let project = required(api.get_project(&config.project_key).await, "project")?;
        let data = load_reference_data(&api, &project.project_key).await;
        Ok(Self {
            api,
            config,
            space,
            project,
            data,
        })
    }

    /// Re-read the space, project and reference collections.
    ///
    /// Reads are never retried. On error the previous snapshot is kept.
    pub async fn load_project_info(&mut self) -> Result<(), SessionError> {
        let space = required(self.api.get_space().await, "space")?;
        let project = required(
            self.api.get_project(&self.config.project_key).await,
            "project",
        )?;
        self.data = load_reference_data(&self.api, &project.project_key).await;
        self.space = space;
        self.project = project;
        Ok(())
    }

    pub fn api(&self) -> &A {
        &self.api
    }

    pub fn config(&self) -> &Configuration {
        &self.config
    }

    pub fn space(&self) -> &Space {
        &self.space
    }

    pub fn project(&self) -> &Project {
        &self.project
    }

    pub fn data(&self) -> &ProjectData {
        &self.data
    }

    /// Fetch a ticket by key; `None` (with the error logged) when it cannot be read.
    pub async fn get_ticket_by_key(&self, key: &str) -> Option<Ticket> {
        resolve_result(self.api.get_ticket(key).await)
    }

    /// Create `ticket` in the session's project.
    pub async fn add_ticket(&self, ticket: &Ticket) -> Option<Ticket> {
        let response = retry_on_conflict(|| self.api.add_ticket(&self.project, ticket)).await;
        resolve_result(response)
    }

    /// Push `ticket`'s fields to the ticket with the same key.
    pub async fn update_ticket(&self, ticket: &Ticket) -> Option<Ticket> {
        let response = retry_on_conflict(|| self.api.update_ticket(ticket)).await;
        resolve_result(response)
    }

    /// Upload a local file to the space attachment area.
    pub async fn add_attachment(&self, file_path: impl AsRef<Path>) -> Option<Attachment> {
        let file_path = file_path.as_ref();
        let file_name = match file_path.file_name().and_then(|name| name.to_str()) {
            Some(name) => name.to_owned(),
            None => {
                tracing::error!(path = %file_path.display(), "attachment path has no file name");
                return None;
            }
        };
        let bytes = match tokio::fs::read(file_path).await {
            Ok(bytes) => bytes,
            Err(err) => {
                tracing::error!(path = %file_path.display(), error = %err, "failed to read attachment");
                return None;
            }
        };
        let response =
            retry_on_conflict(|| self.api.add_attachment(&file_name, &bytes)).await;
        resolve_result(response)
    }

    pub fn ticket_list_url(&self) -> String {
        links::ticket_list_url(&self.config)
    }

    pub fn ticket_url(&self, ticket_key: &str) -> String {
        links::ticket_url(&self.config, ticket_key)
    }
}

fn required<T>(response: ApiResponse<T>, resource: &'static str) -> Result<T, SessionError> {
    match response {
        ApiResponse::Success(content) => Ok(content),
        failure @ ApiResponse::Failure(_) => Err(SessionError::Remote {
            resource,
            message: failure.joined_errors(),
        }),
    }
}

// TODO: reference reads get no conflict retry while mutations do; decide whether
// load_project_info should go through retry_on_conflict as well.
async fn load_reference_data<A: BacklogApi>(api: &A, project_key: &str) -> ProjectData {
    ProjectData {
        ticket_types: collection(api.get_ticket_types(project_key).await, "ticket types"),
        priorities: collection(api.get_priority_types().await, "priorities"),
        categories: collection(api.get_categories(project_key).await, "categories"),
        milestones: collection(api.get_milestones(project_key).await, "milestones"),
        users: collection(api.get_users(project_key).await, "users"),
    }
}

fn collection<T>(response: ApiResponse<Vec<T>>, resource: &'static str) -> Vec<T> {
    match response {
        ApiResponse::Success(items) => items,
        failure @ ApiResponse::Failure(_) => {
            tracing::error!(resource, "{}", failure.joined_errors());
            Vec::new()
        }
    }
}
