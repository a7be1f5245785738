pub mod database;
pub mod models;

pub use database::Database;
pub use models::{ConversationTurn, NewReport, ResearchThread, Role};
