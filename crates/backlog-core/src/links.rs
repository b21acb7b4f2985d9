//! Browser hand-off pages of a configured project.

use crate::config::Configuration;

/// Ticket list of the configured project.
pub fn ticket_list_url(config: &Configuration) -> String {
    format!("{}/find/{}", config.space_url(), config.project_key)
}

/// A single ticket page.
pub fn ticket_url(config: &Configuration, ticket_key: &str) -> String {
    format!("{}/view/{}", config.space_url(), ticket_key)
}

/// Project home page.
pub fn project_url(config: &Configuration) -> String {
    format!("{}/projects/{}", config.space_url(), config.project_key)
}

pub fn open_in_browser(url: &str) -> std::io::Result<()> {
    tracing::debug!(url, "opening browser");
    open::that(url)
}
