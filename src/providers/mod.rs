//! External collaborators the core consumes through narrow interfaces:
//! the three AI service clients plus auth/sink/history.

pub mod auth;
pub mod history;
pub mod llm;
pub mod sink;
pub mod stt;
pub mod tts;
