// Authentication module
// Token grants, expiry classification and the login/refresh/replay strategy

mod credentials;
mod expiry;
mod grant;
mod strategy;
mod types;

pub use credentials::{token_jti, GrantCredentials, DEFAULT_CLIENT_ID};
pub use expiry::{classify, ResponseClass};
pub use grant::TokenGrantClient;
pub use strategy::{ApiResponse, AuthStrategy, RequestTemplate};
pub use types::{Credentials, ErrorBody, GrantType, TokenResponse, REVOKED};
