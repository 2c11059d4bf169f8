//! Session identity: claims, token codec, revocation and the per-call context.
//! Keep the public surface thin and split implementation across sub-modules.

mod claims;
mod token;
mod revocation;
mod request_context;
mod provider;

pub use claims::{Identity, IdentityClaims, ROLE_ADMIN, ROLE_CUSTOMER};
pub use token::{IssuedToken, TokenCodec, SIGNING_ALGORITHM};
pub use revocation::RevocationStore;
pub use request_context::CallContext;
pub use provider::{
    AuthService, ChangePasswordRequest, CredentialStore, InMemoryCredentials, LoginRequest, LoginResponse, RegisterRequest,
    UserRecord,
};
