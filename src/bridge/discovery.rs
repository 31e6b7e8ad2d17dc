//! Discovery documents and dynamic client registration.

use tracing::info;

use super::BridgeCore;
use crate::Result;
use crate::oauth::{
    AuthorizationServerMetadata, ClientRegistrationRequest, ClientRegistrationResponse,
    ProtectedResourceMetadata,
};
use crate::unix_now;

impl BridgeCore {
    /// Scopes advertised in discovery.
    ///
    /// Ends with `session:<start time>`, so clients caching discovery can
    /// tell that the server restarted and its tokens are gone.
    #[must_use]
    pub fn scopes_supported(&self) -> Vec<String> {
        let mut scopes = self.scopes.clone();
        scopes.push(format!("session:{}", self.started_at));
        scopes
    }

    /// RFC 8414 document.
    #[must_use]
    pub fn authorization_server_metadata(&self) -> AuthorizationServerMetadata {
        AuthorizationServerMetadata::new(&self.issuer, self.scopes_supported())
    }

    /// RFC 9728 document.
    #[must_use]
    pub fn protected_resource_metadata(&self) -> ProtectedResourceMetadata {
        ProtectedResourceMetadata::new(&self.resource, &self.issuer, self.scopes_supported())
    }

    /// Register a public client. Nothing is persisted.
    pub fn register(&self, body: &[u8]) -> Result<ClientRegistrationResponse> {
        let request = ClientRegistrationRequest::parse(body)?;
        let response = ClientRegistrationResponse::issue(request, self.default_scope(), unix_now());
        info!(
            client_id = %response.client_id,
            client_name = response.client_name.as_deref().unwrap_or("-"),
            "Registered client"
        );
        Ok(response)
    }
}

#[cfg(test)]
mod tests {
    use crate::bridge::BridgeCore;
    use crate::config::Config;
    use crate::provider::ProviderRegistry;

    fn core() -> BridgeCore {
        let mut config = Config::default();
        config.scopes = vec!["read".to_string(), "write".to_string()];
        BridgeCore::new(&config, ProviderRegistry::new()).unwrap()
    }

    #[test]
    fn discovery_scopes_end_with_session_scope() {
        let core = core();
        let scopes = core.scopes_supported();

        assert_eq!(&scopes[..2], ["read", "write"]);
        assert!(scopes[2].starts_with("session:"));
        assert_eq!(core.authorization_server_metadata().scopes_supported, scopes);
        assert_eq!(core.protected_resource_metadata().scopes_supported, scopes);
    }

    #[test]
    fn registration_grants_default_scope() {
        let response = core()
            .register(br#"{"redirect_uris":["http://localhost:9000/cb"]}"#)
            .unwrap();
        assert_eq!(response.scope, "read write");
    }
}
