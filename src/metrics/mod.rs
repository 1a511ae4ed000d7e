//! Pure-function metrics engine: conversation metrics and voice metrics,
//! computed with no I/O so they are trivially deterministic and testable.

pub mod conversation;
pub mod voice;
