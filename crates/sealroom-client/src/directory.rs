//! Key directory: resolves a username to that user's public key.

use async_trait::async_trait;
use sealroom_crypto::PublicKey;

use crate::error::DirectoryError;

/// Lookup service for peers' public keys.
///
/// Any error is surfaced by the session as `PeerKeyUnavailable` for every
/// send waiting on the lookup.
#[async_trait]
pub trait KeyDirectory: Send + Sync {
    /// Fetch the public key registered for `username`.
    async fn public_key(&self, username: &str) -> Result<PublicKey, DirectoryError>;
}

#[cfg(feature = "http")]
pub use http::HttpKeyDirectory;

#[cfg(feature = "http")]
mod http {
    use async_trait::async_trait;
    use reqwest::Url;
    use sealroom_crypto::PublicKey;
    use serde::Deserialize;

    use super::KeyDirectory;
    use crate::error::DirectoryError;

    #[derive(Deserialize)]
    #[serde(rename_all = "camelCase")]
    struct PublicKeyResponse {
        public_key: String,
    }

    /// Key directory backed by the account server's REST API.
    ///
    /// `GET {base_url}/api/public-key/{username}` with a bearer token,
    /// answering `{ "publicKey": "<base64 SPKI>" }`. The username is
    /// percent-encoded as a single path segment.
    #[derive(Debug, Clone)]
    pub struct HttpKeyDirectory {
        client: reqwest::Client,
        base_url: Url,
        token: String,
    }

    impl HttpKeyDirectory {
        /// Directory at `base_url` authenticated with `token`.
        pub fn new(base_url: &str, token: impl Into<String>) -> Result<Self, DirectoryError> {
            let base_url = Url::parse(base_url).map_err(|e| DirectoryError::Unreachable {
                reason: format!("invalid directory url {base_url}: {e}"),
            })?;
            if base_url.cannot_be_a_base() {
                return Err(DirectoryError::Unreachable {
                    reason: format!("directory url {base_url} cannot carry a path"),
                });
            }

            let client = reqwest::Client::builder()
                .use_rustls_tls()
                .build()
                .map_err(|e| DirectoryError::Unreachable { reason: e.to_string() })?;

            Ok(Self { client, base_url, token: token.into() })
        }

        fn url_for(&self, username: &str) -> Result<Url, DirectoryError> {
            let mut url = self.base_url.clone();
            url.path_segments_mut()
                .map_err(|()| DirectoryError::Unreachable {
                    reason: format!("directory url {} cannot carry a path", self.base_url),
                })?
                .pop_if_empty()
                .extend(["api", "public-key", username]);
            Ok(url)
        }
    }

    #[async_trait]
    impl KeyDirectory for HttpKeyDirectory {
        async fn public_key(&self, username: &str) -> Result<PublicKey, DirectoryError> {
            let response = self
                .client
                .get(self.url_for(username)?)
                .bearer_auth(&self.token)
                .send()
                .await
                .map_err(|e| DirectoryError::Unreachable { reason: e.to_string() })?;

            let status = response.status();
            if status == reqwest::StatusCode::NOT_FOUND {
                return Err(DirectoryError::NotFound { username: username.to_string() });
            }
            if !status.is_success() {
                return Err(DirectoryError::Status { status: status.as_u16() });
            }

            let body: PublicKeyResponse = response
                .json()
                .await
                .map_err(|e| DirectoryError::InvalidKey { reason: e.to_string() })?;

            PublicKey::from_base64(&body.public_key)
                .map_err(|e| DirectoryError::InvalidKey { reason: e.to_string() })
        }
    }

}
