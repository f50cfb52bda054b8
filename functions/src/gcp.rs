//! Credentials for calling Google Cloud REST APIs.
use google_cloud_auth::credentials::{Builder, CacheableResource, Credentials};

pub const CLOUD_PLATFORM_SCOPE: &str = "https://www.googleapis.com/auth/cloud-platform";

#[derive(thiserror::Error, Debug)]
pub enum AuthError {
    #[error("could not load application default credentials: {0}")]
    Build(#[from] google_cloud_auth::build_errors::Error),
    #[error("could not obtain auth headers: {0}")]
    Credentials(#[from] google_cloud_auth::errors::CredentialsError),
    #[error("credentials returned no auth headers")]
    NoHeaders,
}

#[derive(Clone)]
enum TokenSourceKind {
    // Emulators and local runs.
    Anonymous,
    ApplicationDefault(Credentials),
}

/// Attaches auth headers to outgoing Google API requests. Application
/// default credentials cover key files, workload identity, gcloud user
/// credentials and the metadata server; token refresh and caching happen
/// inside the credentials and are shared across clones.
#[derive(Clone)]
pub struct TokenSource {
    kind: TokenSourceKind,
}

impl TokenSource {
    pub fn anonymous() -> Self {
        TokenSource {
            kind: TokenSourceKind::Anonymous,
        }
    }

    pub fn application_default() -> Result<Self, AuthError> {
        let credentials = Builder::default()
            .with_scopes([CLOUD_PLATFORM_SCOPE])
            .build()?;
        Ok(TokenSource {
            kind: TokenSourceKind::ApplicationDefault(credentials),
        })
    }

    pub async fn authorize(
        &self,
        request: reqwest::RequestBuilder,
    ) -> Result<reqwest::RequestBuilder, AuthError> {
        match &self.kind {
            TokenSourceKind::Anonymous => Ok(request),
            TokenSourceKind::ApplicationDefault(credentials) => {
                // No entity tag is passed, so fresh headers always come back.
                match credentials.headers(http::Extensions::new()).await? {
                    CacheableResource::New { data, .. } => Ok(request.headers(data)),
                    CacheableResource::NotModified => Err(AuthError::NoHeaders),
                }
            }
        }
    }
}
