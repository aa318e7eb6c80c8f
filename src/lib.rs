//! issue-stream - live issue list for an error-tracking backend
//!
//! Resolves saved searches and route parameters into listing requests,
//! follows cursor pagination and keeps the first page fresh with realtime
//! polling.

pub mod config;
pub mod data;
pub mod integrations;
pub mod stream;
pub mod util;
