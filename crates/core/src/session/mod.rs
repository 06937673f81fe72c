//! Pure helpers for continuing a stored Gemini chat.

mod hashing;
mod prefix;

pub use hashing::hash_conversation;
pub use prefix::{candidate_prefixes, SessionMatch};
