//! Core library for Backlog integrations: configuration, OAuth2, the REST
//! client and the ticket operations built on top of it.

pub mod api;
pub mod auth;
pub mod config;
pub mod links;
pub mod retry;
pub mod session;

#[cfg(test)]
mod test_support;
