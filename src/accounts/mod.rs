//! Account records: signup, lookups and self-service mutation.

mod service;

pub use service::{authorize_owner, AccountError, AccountService, AccountUpdate};
