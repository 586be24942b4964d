pub mod history;
mod message;
mod store;

pub use history::{HistoryManager, SessionMetadata};
pub use message::{default_title, AttachedFile, Message, Role, Session, SessionId, PDF_MIME_TYPE};
pub use store::{SessionStore, StoreSnapshot};
