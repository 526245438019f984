//! Core data models used throughout Docpilot.
//!
//! These types represent the document chunks flowing through the index
//! pipeline and the conversation messages flowing through the chat pipeline.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// A bounded, possibly overlapping slice of one document's text.
///
/// Chunks are the unit stored in the vector index. They are immutable once
/// created and discarded wholesale when the index is rebuilt.
#[derive(Debug, Clone, PartialEq)]
pub struct Chunk {
    /// Path of the source file the chunk was cut from.
    pub source: PathBuf,
    /// The chunk text span.
    pub text: String,
    /// Position of this chunk within its document, starting at 0.
    pub seq: usize,
}

/// Message author role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }

    /// Role name with the first letter capitalized, as rendered into
    /// the chat-history block of the prompt.
    pub fn display_name(&self) -> &'static str {
        match self {
            Role::User => "User",
            Role::Assistant => "Assistant",
        }
    }

    pub fn parse(s: &str) -> Option<Role> {
        match s {
            "user" => Some(Role::User),
            "assistant" => Some(Role::Assistant),
            _ => None,
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One stored conversation turn.
///
/// Messages are never mutated after insertion; `id` is the SQLite rowid and
/// defines the replay order within a conversation.
#[derive(Debug, Clone)]
pub struct Message {
    pub id: i64,
    pub session_id: String,
    pub user_id: i64,
    pub role: Role,
    pub content: String,
}

/// A registered account, as returned by the signup endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct UserInfo {
    pub id: i64,
    pub username: String,
    pub email: String,
}
