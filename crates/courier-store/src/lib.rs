//! # courier-store
//!
//! Remote persistence for the Courier chat client.
//!
//! The backend is a realtime key-path database. This crate defines the
//! [`RemoteStore`] contract, the domain models and their wire record codec,
//! an in-process [`MemoryStore`] implementation, and a typed [`Repository`]
//! with CRUD helpers for users, chats and messages. Session credentials live
//! in a separate [`CredentialStore`].

pub mod chats;
pub mod credentials;
pub mod memory;
pub mod messages;
pub mod models;
pub mod path;
pub mod record;
pub mod remote;
pub mod repository;
pub mod users;

mod error;

pub use credentials::{CredentialStore, FileCredentialStore, MemoryCredentialStore};
pub use error::{Result, StoreError};
pub use memory::{Fault, MemoryStore};
pub use models::*;
pub use path::StorePath;
pub use record::{from_record, to_record, Record, RecordEvent, RecordEventKind};
pub use remote::{RemoteStore, Subscription};
pub use repository::Repository;
