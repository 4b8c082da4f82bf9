//! HTTP client for chart repositories
//!
//! Redirects are followed manually so credentials are never forwarded to
//! another origin.

use std::time::Duration;
use url::Url;

use crate::credentials::{CredentialValues, HttpAuth};
use crate::error::{RepoError, Result};

const MAX_REDIRECTS: u32 = 10;

/// HTTP client bound to one repository's credentials
pub struct HttpClient {
    client: reqwest::Client,
    auth: Option<HttpAuth>,
}

impl HttpClient {
    /// Client for a repository, honouring basic/bearer auth and `caFile`
    pub fn new(credentials: Option<&CredentialValues>) -> Result<Self> {
        let mut builder = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .timeout(Duration::from_secs(30));

        if let Some(ca_file) = credentials
            .and_then(|c| c.ca_file.as_deref())
            .filter(|path| !path.is_empty())
        {
            let pem = std::fs::read(ca_file)?;
            let certificate =
                reqwest::Certificate::from_pem(&pem).map_err(|e| RepoError::AuthFailed {
                    message: format!("invalid CA file {}: {}", ca_file, e),
                })?;
            builder = builder.add_root_certificate(certificate);
        }

        let client = builder.build().map_err(|e| RepoError::NetworkError {
            message: e.to_string(),
        })?;

        Ok(Self {
            client,
            auth: credentials.and_then(CredentialValues::http_auth),
        })
    }

    /// Client without credentials
    pub fn public() -> Result<Self> {
        Self::new(None)
    }

    pub async fn get(&self, url: &str) -> Result<reqwest::Response> {
        let original = Url::parse(url).map_err(|e| RepoError::InvalidRepositoryUrl {
            url: url.to_string(),
            reason: e.to_string(),
        })?;
        let mut current = original.clone();
        let mut redirects = 0;

        loop {
            let mut request = self.client.get(current.as_str());
            if same_origin(&original, &current) {
                if let Some(auth) = &self.auth {
                    request = request.header(reqwest::header::AUTHORIZATION, auth.header_value());
                }
            } else {
                tracing::warn!(
                    from = %original,
                    to = %current,
                    "cross-origin redirect, credentials not forwarded"
                );
            }

            let response = request.send().await?;
            let status = response.status();

            if status.is_redirection() {
                redirects += 1;
                if redirects > MAX_REDIRECTS {
                    return Err(RepoError::NetworkError {
                        message: format!("too many redirects (max {})", MAX_REDIRECTS),
                    });
                }
                let location = response
                    .headers()
                    .get(reqwest::header::LOCATION)
                    .and_then(|v| v.to_str().ok())
                    .ok_or_else(|| RepoError::NetworkError {
                        message: "redirect without Location header".to_string(),
                    })?;
                current = current.join(location).map_err(|e| RepoError::NetworkError {
                    message: format!("invalid redirect target {}: {}", location, e),
                })?;
                continue;
            }

            if status == reqwest::StatusCode::UNAUTHORIZED {
                return Err(RepoError::AuthRequired {
                    url: current.to_string(),
                });
            }
            if status == reqwest::StatusCode::FORBIDDEN {
                return Err(RepoError::AuthFailed {
                    message: format!("access denied to {}", current),
                });
            }
            if !status.is_success() {
                return Err(RepoError::HttpError {
                    status: status.as_u16(),
                    url: current.to_string(),
                });
            }

            return Ok(response);
        }
    }

    pub async fn get_bytes(&self, url: &str) -> Result<Vec<u8>> {
        let response = self.get(url).await?;
        let bytes = response.bytes().await.map_err(|e| RepoError::NetworkError {
            message: e.to_string(),
        })?;
        Ok(bytes.to_vec())
    }

    /// Download and check the SHA256 digest when one is published
    pub async fn download_verified(&self, url: &str, digest: Option<&str>) -> Result<Vec<u8>> {
        let data = self.get_bytes(url).await?;
        if let Some(expected) = digest.filter(|d| !d.is_empty()) {
            let actual = compute_digest(&data);
            if !digest_matches(expected, &actual) {
                return Err(RepoError::DigestMismatch {
                    url: url.to_string(),
                    expected: expected.to_string(),
                    actual,
                });
            }
        }
        Ok(data)
    }
}

fn same_origin(a: &Url, b: &Url) -> bool {
    a.scheme() == b.scheme()
        && a.host() == b.host()
        && a.port_or_known_default() == b.port_or_known_default()
}

/// SHA256 digest of data as `sha256:<hex>`
pub fn compute_digest(data: &[u8]) -> String {
    use sha2::{Digest, Sha256};
    let mut hasher = Sha256::new();
    hasher.update(data);
    format!("sha256:{}", hex::encode(hasher.finalize()))
}

/// Compare digests ignoring case and an optional `sha256:` prefix
pub fn digest_matches(expected: &str, actual: &str) -> bool {
    let normalize = |d: &str| {
        let d = d.trim().to_lowercase();
        d.strip_prefix("sha256:").map(str::to_string).unwrap_or(d)
    };
    normalize(expected) == normalize(actual)
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn test_same_origin() {
        let parse = |s: &str| Url::parse(s).unwrap();
        assert!(same_origin(
            &parse("https://example.com:443/foo"),
            &parse("https://example.com/bar")
        ));
        assert!(!same_origin(
            &parse("https://example.com/foo"),
            &parse("http://example.com/foo")
        ));
        assert!(!same_origin(
            &parse("https://example.com/foo"),
            &parse("https://other.com/foo")
        ));
    }

    #[test]
    fn test_digest_matches() {
        let digest = compute_digest(b"hello world");
        assert_eq!(digest.len(), 7 + 64);
        assert!(digest_matches(&digest.to_uppercase(), &digest));
        assert!(digest_matches(digest.trim_start_matches("sha256:"), &digest));
        assert!(!digest_matches("sha256:abc", &digest));
    }

    #[tokio::test]
    async fn test_sends_auth_and_maps_status() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/index.yaml"))
            .and(header("authorization", "Bearer token"))
            .respond_with(ResponseTemplate::new(200).set_body_string("apiVersion: v1\n"))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/missing.tgz"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let credentials = CredentialValues {
            bearer_token: Some("token".to_string()),
            ..Default::default()
        };
        let client = HttpClient::new(Some(&credentials)).unwrap();

        let body = client
            .get_bytes(&format!("{}/index.yaml", server.uri()))
            .await
            .unwrap();
        assert_eq!(body, b"apiVersion: v1\n");

        let err = client
            .get_bytes(&format!("{}/missing.tgz", server.uri()))
            .await
            .unwrap_err();
        assert!(matches!(err, RepoError::HttpError { status: 404, .. }));
    }

    #[tokio::test]
    async fn test_download_verified_rejects_bad_digest() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/chart.tgz"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"payload".to_vec()))
            .mount(&server)
            .await;

        let client = HttpClient::public().unwrap();
        let url = format!("{}/chart.tgz", server.uri());

        let good = compute_digest(b"payload");
        assert!(client.download_verified(&url, Some(&good)).await.is_ok());

        let err = client
            .download_verified(&url, Some("sha256:0000"))
            .await
            .unwrap_err();
        assert!(matches!(err, RepoError::DigestMismatch { .. }));
    }
}
