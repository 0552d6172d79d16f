pub mod api;
pub mod config;
pub mod dispatch;
pub mod handlers;
pub mod humanize;
pub mod observability;
