//! # msgcenter-api
//!
//! Client for the remote message-center mailbox service.
//!
//! ## Features
//!
//! - **Stateless calls**: every operation takes the current [`Credentials`];
//!   nothing is cached between calls
//! - **Full and incremental listings**: `since` tokens when the service
//!   supports them, full listings otherwise
//! - **Partial acknowledgment**: mutations return exactly the IDs the service
//!   confirmed
//! - **Typed failures**: every error classifies as `Unauthorized`, `Transient`
//!   or `Rejected` via [`Error::kind`]
//!
//! ## Quick Start
//!
//! ```ignore
//! use msgcenter_api::{ApiConfig, Credentials, HttpMailboxApi, MailboxApi};
//!
//! #[tokio::main]
//! async fn main() -> msgcenter_api::Result<()> {
//!     let api = HttpMailboxApi::new(ApiConfig::new("https://inbox.example.com/")?)?;
//!     let credentials = Credentials::new("user-id", "password", "channel-id");
//!
//!     let listing = api.list_messages(&credentials, None).await?;
//!     for message in &listing.messages {
//!         println!("{} read={}", message.id, message.is_read);
//!     }
//!
//!     let ids: Vec<_> = listing.messages.iter().map(|m| m.id.clone()).collect();
//!     let acknowledged = api.mark_read(&credentials, &ids).await?;
//!     println!("{} acknowledged", acknowledged.len());
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

pub mod client;
pub mod config;
mod error;
pub mod types;

pub use client::{CHANNEL_HEADER, HttpMailboxApi, MailboxApi};
pub use config::{ApiConfig, ApiConfigBuilder, DEFAULT_CONNECT_TIMEOUT, DEFAULT_REQUEST_TIMEOUT};
pub use error::{Error, ErrorKind, Result};
pub use types::{Credentials, Listing, MessageId, Mutation, RemoteMessage};
