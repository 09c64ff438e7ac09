//! Expense Tracker API client
//!
//! Authenticated HTTP client for the expense tracker REST API.
//!
//! This crate provides:
//! - Persisted session storage (access token, refresh token, user profile)
//! - Bearer authentication of outgoing requests
//! - One-shot token refresh and replay on 401, with forced logout otherwise
//! - Typed calls for authentication, expenses, categories and dashboard stats

pub mod auth;
pub mod client;
pub mod config;
pub mod error;
pub mod models;
pub mod token_store;
pub mod transport;

#[cfg(test)]
mod testing;

pub use auth::AuthEvent;
pub use client::ApiClient;
pub use config::ClientConfig;
pub use error::{ClientError, Result};
pub use models::{
    Category, CategoryRef, CategorySpending, DashboardStats, Expense, MonthlyTotal, NewExpense,
    Session, User,
};
pub use token_store::{FileTokenStore, MemoryTokenStore, TokenStore};
