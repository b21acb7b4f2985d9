mod client;
mod response;
mod types;

pub use client::{ApiError, BacklogApi, HttpBacklogClient};
pub use response::{ApiResponse, RemoteErrorMessage};
pub use types::{
    Attachment, Category, Milestone, Priority, Project, Space, Status, Ticket, TicketType, User,
};
