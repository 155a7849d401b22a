//! HTTPS implementation of [`RemoteClient`].
//!
//! JSON request/response bodies; the caller's fingerprint travels in the
//! `authorization` header. Status mapping: 404 → `NotFound`, 403 →
//! `Forbidden`, everything else non-2xx → `Transport`.

use super::{ApiError, JoinRequestSummary, RemoteClient};
use crate::crypto::{PublicKey, Signature};
use crate::team::{Fingerprint, TeamUuid};
use async_trait::async_trait;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};

/// Default service endpoint; override with `api.base_url` in the config or
/// the `TEAMSYNC_API_URL` environment variable.
pub const DEFAULT_BASE_URL: &str = "https://api.teamsync.example.com/v1";

#[derive(Debug, Serialize, Deserialize)]
struct RosterDocument {
    roster: String,
    signature: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct PublicKeyDocument {
    armored_public_key: String,
}

#[derive(Debug, Serialize)]
struct CreateJoinRequestBody<'a> {
    email: &'a str,
}

#[derive(Debug, Deserialize)]
struct JoinRequestEntry {
    fingerprint: String,
    email: String,
}

#[derive(Debug, Deserialize)]
struct ListJoinRequestsResponse {
    requests: Vec<JoinRequestEntry>,
}

/// Remote roster service over HTTPS.
pub struct HttpClient {
    client: reqwest::Client,
    base_url: String,
}

impl HttpClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        let base_url = base_url.into();
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path)
    }

    fn authorization(auth: &Fingerprint) -> String {
        format!("fingerprint {}", auth.hex())
    }

    /// Map a non-success status to the API error taxonomy.
    async fn check(response: reqwest::Response) -> Result<reqwest::Response, ApiError> {
        match response.status() {
            status if status.is_success() => Ok(response),
            StatusCode::NOT_FOUND => Err(ApiError::NotFound),
            StatusCode::FORBIDDEN => Err(ApiError::Forbidden),
            status => {
                let detail = response.text().await.unwrap_or_default();
                Err(ApiError::Transport(format!("http {status}: {detail}")))
            }
        }
    }
}

impl From<reqwest::Error> for ApiError {
    fn from(err: reqwest::Error) -> Self {
        ApiError::Transport(err.to_string())
    }
}

#[async_trait]
impl RemoteClient for HttpClient {
    async fn get_roster(
        &self,
        team: &TeamUuid,
        auth: &Fingerprint,
    ) -> Result<(Vec<u8>, Signature), ApiError> {
        let response = self
            .client
            .get(self.url(&format!("team/{team}/roster")))
            .header("authorization", Self::authorization(auth))
            .send()
            .await?;
        let document: RosterDocument = Self::check(response).await?.json().await?;

        let signature = Signature::from_hex(&document.signature)
            .map_err(|e| ApiError::Transport(format!("bad signature encoding: {e}")))?;
        Ok((document.roster.into_bytes(), signature))
    }

    async fn put_roster(
        &self,
        roster: &[u8],
        signature: &Signature,
        auth: &Fingerprint,
    ) -> Result<(), ApiError> {
        let roster = String::from_utf8(roster.to_vec())
            .map_err(|e| ApiError::Transport(format!("roster is not utf-8: {e}")))?;
        let body = RosterDocument {
            roster,
            signature: signature.to_hex(),
        };

        let response = self
            .client
            .post(self.url("teams"))
            .header("authorization", Self::authorization(auth))
            .json(&body)
            .send()
            .await?;
        Self::check(response).await?;
        Ok(())
    }

    async fn get_public_key(&self, fingerprint: &Fingerprint) -> Result<PublicKey, ApiError> {
        let response = self
            .client
            .get(self.url(&format!("key/{}", fingerprint.hex())))
            .send()
            .await?;
        let document: PublicKeyDocument = Self::check(response).await?.json().await?;

        PublicKey::from_hex(&document.armored_public_key)
            .map_err(|e| ApiError::Transport(format!("bad key encoding: {e}")))
    }

    async fn publish_public_key(&self, key: &PublicKey) -> Result<(), ApiError> {
        let body = PublicKeyDocument {
            armored_public_key: key.to_hex(),
        };
        let response = self
            .client
            .post(self.url("keys"))
            .header("authorization", Self::authorization(key.fingerprint()))
            .json(&body)
            .send()
            .await?;
        Self::check(response).await?;
        Ok(())
    }

    async fn create_join_request(
        &self,
        team: &TeamUuid,
        fingerprint: &Fingerprint,
        email: &str,
    ) -> Result<(), ApiError> {
        let response = self
            .client
            .post(self.url(&format!("team/{team}/requests-to-join")))
            .header("authorization", Self::authorization(fingerprint))
            .json(&CreateJoinRequestBody { email })
            .send()
            .await?;
        Self::check(response).await?;
        Ok(())
    }

    async fn list_join_requests(
        &self,
        team: &TeamUuid,
        auth: &Fingerprint,
    ) -> Result<Vec<JoinRequestSummary>, ApiError> {
        let response = self
            .client
            .get(self.url(&format!("team/{team}/requests-to-join")))
            .header("authorization", Self::authorization(auth))
            .send()
            .await?;
        let decoded: ListJoinRequestsResponse = Self::check(response).await?.json().await?;

        // Entries with unparsable fingerprints are skipped rather than
        // failing the listing; the service is not trusted to be clean.
        let requests = decoded
            .requests
            .into_iter()
            .filter_map(|entry| {
                let fingerprint = Fingerprint::parse(&entry.fingerprint).ok()?;
                Some(JoinRequestSummary {
                    fingerprint,
                    email: entry.email,
                })
            })
            .collect();
        Ok(requests)
    }

    async fn delete_join_request(
        &self,
        team: &TeamUuid,
        fingerprint: &Fingerprint,
    ) -> Result<(), ApiError> {
        let response = self
            .client
            .delete(self.url(&format!(
                "team/{team}/requests-to-join/{}",
                fingerprint.hex()
            )))
            .header("authorization", Self::authorization(fingerprint))
            .send()
            .await?;
        Self::check(response).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_url_trailing_slash_normalized() {
        let client = HttpClient::new("https://api.example.com/v1/");
        assert_eq!(
            client.url("team/x/roster"),
            "https://api.example.com/v1/team/x/roster"
        );
    }

    #[test]
    fn test_authorization_header_format() {
        let fp = Fingerprint::of_public_key(&[1u8; 32]);
        let header = HttpClient::authorization(&fp);
        assert!(header.starts_with("fingerprint "));
        assert!(header.ends_with(fp.hex()));
    }
}
