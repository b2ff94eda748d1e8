//! `warden-auth` — token lifecycle and authorization engine.
//!
//! Transport-agnostic: storage is reached only through the ports in
//! [`store`], HTTP lives in `warden-api`.

pub mod authorize;
pub mod bootstrap;
pub mod claims;
pub mod config;
pub mod credential;
pub mod error;
pub mod issuer;
pub mod memory;
pub mod operation;
pub mod password;
pub mod revocation;
pub mod session;
pub mod store;
pub mod subject;
pub mod verifier;

pub use authorize::{AuthorizationEvaluator, AuthorizationExplanation, PublicOperations};
pub use claims::{Claims, TokenBody, TokenKind};
pub use config::TokenConfig;
pub use credential::Credential;
pub use error::{AuthError, FailureClass};
pub use issuer::{IssuedToken, TokenIssuer};
pub use memory::InMemoryStore;
pub use operation::Operation;
pub use password::{Argon2Passwords, PasswordVerifier};
pub use revocation::{RevocationGuard, RevocationPolicy};
pub use session::{PersonalToken, RevokeOutcome, SessionService, TokenPair};
pub use store::{
    BlacklistColumn, BootstrapStore, GrantStore, NewPersonalToken, PersonalTokenRecord,
    PersonalTokenStore, RevocationRecord, RevocationStore, UserDirectory,
};
pub use subject::{Subject, SubjectResolver};
pub use verifier::{Authenticated, Stage, TokenVerifier};
