//! OAuth 2.0 protocol building blocks
//!
//! - Authorization server / protected resource metadata (RFC 8414, RFC 9728)
//! - Dynamic client registration payloads (RFC 7591)
//! - PKCE S256 (RFC 7636) and the per-session flow selector
//! - HTML error pages for browser-facing endpoints

pub mod metadata;
pub mod pages;
pub mod pkce;

pub use metadata::{
    AuthorizationServerMetadata, ClientRegistrationRequest, ClientRegistrationResponse,
    ProtectedResourceMetadata,
};
pub use pages::ErrorPage;
pub use pkce::PkceFlow;
