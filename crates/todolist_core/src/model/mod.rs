//! Domain model for todo items.
//!
//! # Responsibility
//! - Define the single record shape shared by every storage backend.
//! - Own the flat serialization contract used on the wire and in storage.
//!
//! # Invariants
//! - `id` is never regenerated once assigned.
//! - `updated_at >= created_at` for every constructed item.

pub mod todo;
