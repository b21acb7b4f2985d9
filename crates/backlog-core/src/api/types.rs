use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Space {
    pub space_key: String,
    pub name: String,
    #[serde(default)]
    pub lang: Option<String>,
    #[serde(default)]
    pub timezone: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Project {
    pub id: i64,
    pub project_key: String,
    pub name: String,
    #[serde(default)]
    pub archived: bool,
}

/// Backlog calls these "issue types".
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TicketType {
    pub id: i64,
    pub name: String,
    #[serde(default)]
    pub color: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Priority {
    pub id: i64,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Category {
    pub id: i64,
    pub name: String,
}

/// Backlog calls these "versions" on some endpoints and "milestones" on issues.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Milestone {
    pub id: i64,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub release_due_date: Option<String>,
    #[serde(default)]
    pub archived: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: i64,
    #[serde(default)]
    pub user_id: Option<String>,
    pub name: String,
    #[serde(default)]
    pub mail_address: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Status {
    pub id: i64,
    pub name: String,
}

/// Uploaded file registered at space level; referenced by id when creating tickets.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Attachment {
    pub id: i64,
    pub name: String,
    #[serde(default)]
    pub size: u64,
}

/// A Backlog issue. `key` is assigned by the server on creation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Ticket {
    #[serde(default)]
    pub id: Option<i64>,
    #[serde(default, rename = "issueKey")]
    pub key: Option<String>,
    pub summary: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub issue_type: Option<TicketType>,
    #[serde(default)]
    pub priority: Option<Priority>,
    #[serde(default)]
    pub status: Option<Status>,
    #[serde(default)]
    pub category: Vec<Category>,
    #[serde(default)]
    pub milestone: Vec<Milestone>,
    #[serde(default)]
    pub assignee: Option<User>,
    #[serde(default)]
    pub created: Option<DateTime<Utc>>,
    #[serde(default)]
    pub updated: Option<DateTime<Utc>>,
    /// Space attachments to link on creation; never returned by the server.
    #[serde(skip)]
    pub attachment_ids: Vec<i64>,
}

impl Ticket {
    pub fn new(summary: impl Into<String>) -> Self {
        Self {
            summary: summary.into(),
            ..Self::default()
        }
    }

    /// Form fields for create/update requests, using Backlog's `name[]` array convention.
    pub fn form_fields(&self) -> Vec<(String, String)> {
        let mut form = vec![("summary".to_string(), self.summary.clone())];
        if let Some(description) = &self.description {
            form.push(("description".into(), description.clone()));
        }
        if let Some(issue_type) = &self.issue_type {
            form.push(("issueTypeId".into(), issue_type.id.to_string()));
        }
        if let Some(priority) = &self.priority {
            form.push(("priorityId".into(), priority.id.to_string()));
        }
        if let Some(assignee) = &self.assignee {
            form.push(("assigneeId".into(), assignee.id.to_string()));
        }
        form.extend(
            self.category
                .iter()
                .map(|category| ("categoryId[]".to_string(), category.id.to_string())),
        );
        form.extend(
            self.milestone
                .iter()
                .map(|milestone| ("milestoneId[]".to_string(), milestone.id.to_string())),
        );
        form.extend(
            self.attachment_ids
                .iter()
                .map(|id| ("attachmentId[]".to_string(), id.to_string())),
        );
        form
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ticket_deserializes_issue_payload() {
        let raw = serde_json::json!({
            "id": 1,
            "projectId": 10,
            "issueKey": "PRJ-1",
            "keyId": 1,
            "summary": "Crash on load",
            "description": null,
            "issueType": { "id": 2, "projectId": 10, "name": "Bug", "color": "#990000", "displayOrder": 0 },
            "priority": { "id": 3, "name": "Normal" },
            "status": { "id": 1, "name": "Open" },
            "assignee": null,
            "category": [{ "id": 5, "name": "UI", "displayOrder": 0 }],
            "milestone": [],
            "created": "2024-07-01T12:00:00Z",
            "updated": "2024-07-02T12:00:00Z"
        });
        let ticket: Ticket = serde_json::from_value(raw).unwrap();
        assert_eq!(ticket.key.as_deref(), Some("PRJ-1"));
        assert_eq!(ticket.issue_type.unwrap().name, "Bug");
        assert_eq!(ticket.category.len(), 1);
        assert!(ticket.assignee.is_none());
        assert!(ticket.created.is_some());
    }

    #[test]
    fn form_fields_use_array_suffix() {
        let mut ticket = Ticket::new("Bug A");
        ticket.priority = Some(Priority {
            id: 3,
            name: "Normal".into(),
        });
        ticket.category = vec![
            Category {
                id: 5,
                name: "UI".into(),
            },
            Category {
                id: 6,
                name: "Audio".into(),
            },
        ];
        ticket.attachment_ids = vec![42];

        let form = ticket.form_fields();
        assert!(form.contains(&("summary".into(), "Bug A".into())));
        assert!(form.contains(&("priorityId".into(), "3".into())));
        let categories: Vec<_> = form.iter().filter(|(k, _)| k == "categoryId[]").collect();
        assert_eq!(categories.len(), 2);
        assert!(form.contains(&("attachmentId[]".into(), "42".into())));
        assert!(!form.iter().any(|(k, _)| k == "description"));
    }
}
