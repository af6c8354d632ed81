//! Use-case services.
//!
//! # Responsibility
//! - Orchestrate backend calls into task-level APIs.
//! - Keep adapters (CLI, HTTP) decoupled from storage details.

pub mod todo_service;
