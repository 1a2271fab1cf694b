//! Authentication module for the admin API
//!
//! Holds the stored token pair, decides when an access token needs
//! refreshing, coordinates the refresh exchange, and tracks the session.

pub mod events;
pub mod jwt;
pub mod refresh;
pub mod session;
pub mod tokens;

pub use events::{NoticeLevel, NoopObserver, SessionEvent, SessionObserver};
pub use session::{login, logout, register, status, whoami, Registration, Session};
pub use tokens::{Credential, CredentialStore, MemoryStore};
