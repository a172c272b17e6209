//! Credential custody, identity tokens and login brute-force protection.

pub mod error;
pub mod guard;
pub mod lockout;
pub mod password;
pub mod throttle;
pub mod token;

pub use error::{AuthError, GuardError, TokenError};
pub use guard::require_identity;
pub use lockout::{LockoutPolicy, LockoutState, LockoutStatus};
pub use password::CredentialStore;
pub use throttle::{LoginAttempt, LoginThrottle, Refusal};
pub use token::{Identity, SigningKey, TokenService};
