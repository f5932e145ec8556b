// Identifiers, limits, error taxonomy and input checks shared across the workspace.

pub mod constants;
pub mod error;
pub mod types;
pub mod validation;

pub use error::{AuthError, ErrorKind, NotFound, SyncError, ValidationError};
pub use types::{ChatId, MessageId, MessageType, UserId};
