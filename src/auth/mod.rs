/// Authentication and authorization
///
/// JWT issue/verify, the token revocation blacklist, OTP email
/// verification, request extractors, and the capability guards built on
/// top of them.

pub mod extract;
pub mod guard;
pub mod otp;
pub mod revocation;
pub mod token;

pub use extract::{authenticate_token, AdminUser, AuthUser, OptionalAuthUser};
pub use otp::OtpStore;
pub use revocation::RevocationStore;
pub use token::{Claims, TokenPair, TokenService, TokenType};
