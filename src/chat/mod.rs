pub mod session;

pub use session::{ChatSession, ConversationTurn, Role};
