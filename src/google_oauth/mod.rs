pub mod endpoints;
pub mod provider;
pub mod state;

pub use endpoints::GoogleOauthEndpoints;
pub use provider::{AuthorizationProvider, GoogleIdentity, ProviderError, TokenSet};
pub use state::StateSigner;
