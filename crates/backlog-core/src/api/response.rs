use serde::{Deserialize, Serialize};

/// One entry of Backlog's `{"errors": [...]}` payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteErrorMessage {
    pub message: String,
    #[serde(default)]
    pub code: Option<i64>,
    #[serde(default)]
    pub more_info: Option<String>,
}

impl RemoteErrorMessage {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            code: None,
            more_info: None,
        }
    }
}

/// Outcome of one remote call. Content exists exactly when the call succeeded.
#[derive(Debug, Clone, PartialEq)]
pub enum ApiResponse<T> {
    Success(T),
    Failure(Vec<RemoteErrorMessage>),
}

impl<T> ApiResponse<T> {
    pub fn failure(message: impl Into<String>) -> Self {
        ApiResponse::Failure(vec![RemoteErrorMessage::new(message)])
    }

    pub fn is_success(&self) -> bool {
        matches!(self, ApiResponse::Success(_))
    }

    pub fn content(&self) -> Option<&T> {
        match self {
            ApiResponse::Success(content) => Some(content),
            ApiResponse::Failure(_) => None,
        }
    }

    pub fn errors(&self) -> &[RemoteErrorMessage] {
        match self {
            ApiResponse::Success(_) => &[],
            ApiResponse::Failure(errors) => errors,
        }
    }

    pub fn into_content(self) -> Option<T> {
        match self {
            ApiResponse::Success(content) => Some(content),
            ApiResponse::Failure(_) => None,
        }
    }

    /// Error messages joined with `", "`, as they are logged.
    pub fn joined_errors(&self) -> String {
        self.errors()
            .iter()
            .map(|error| error.message.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    }
}
