//! Dialog exchange with the language model
//!
//! The conversation log lives in [`ConversationHistory`]; only its most
//! recent turns are sent upstream through a [`DialogExchange`].

mod chat;
mod history;

pub use chat::{ChatCompletions, DialogExchange};
pub use history::{ConversationHistory, ConversationTurn, Role};
