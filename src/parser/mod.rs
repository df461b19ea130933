//! Wire-format parsing (§6): request-line/status-line tokenising via `nom`, with
//! header-line unfolding and field parsing done by [`crate::header`]/[`crate::value`].

mod message;

pub use message::parse_message;
