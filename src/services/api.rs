/// Worker API client
///
/// Thin wrapper around `reqwest` that adds the engine's bearer token to every
/// request. The token is issued by the worker; the engine performs no
/// authentication logic of its own.

use anyhow::Result;
use reqwest::{Client, RequestBuilder, Url};

#[derive(Debug, Clone)]
pub struct WorkerApi {
    base_url: Url,
    token: String,
    client: Client,
}

impl WorkerApi {
    /// Create a client for `base_url` (e.g. "http://localhost:3000/api")
    pub fn new(base_url: &str, token: &str) -> Result<Self> {
        // Url::join drops the last segment unless the base ends with '/'
        let normalized = if base_url.ends_with('/') {
            base_url.to_string()
        } else {
            format!("{}/", base_url)
        };
        let base_url = Url::parse(&normalized)
            .map_err(|e| anyhow::anyhow!("Invalid worker API url '{}': {}", base_url, e))?;

        Ok(Self {
            base_url,
            token: token.to_string(),
            client: Client::new(),
        })
    }

    /// Build an absolute URL from path segments (each segment is percent-encoded)
    pub fn url(&self, segments: &[&str]) -> Result<Url> {
        let mut url = self.base_url.clone();
        {
            let mut path = url
                .path_segments_mut()
                .map_err(|_| anyhow::anyhow!("Worker API url cannot be a base: {}", self.base_url))?;
            path.pop_if_empty();
            path.extend(segments);
        }
        Ok(url)
    }

    pub fn get(&self, url: Url) -> RequestBuilder {
        self.client.get(url).bearer_auth(&self.token)
    }

    pub fn post(&self, url: Url) -> RequestBuilder {
        self.client.post(url).bearer_auth(&self.token)
    }

    pub fn delete(&self, url: Url) -> RequestBuilder {
        self.client.delete(url).bearer_auth(&self.token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn url_segments_are_appended_and_encoded() {
        let api = WorkerApi::new("http://localhost:3000/api", "token").unwrap();
        let url = api.url(&["v1", "worker", "app-connections", "my conn"]).unwrap();
        assert_eq!(url.as_str(), "http://localhost:3000/api/v1/worker/app-connections/my%20conn");

        let api = WorkerApi::new("http://localhost:3000/", "token").unwrap();
        assert_eq!(api.url(&["v1", "store-entries"]).unwrap().as_str(), "http://localhost:3000/v1/store-entries");
    }

    #[test]
    fn invalid_base_url_is_rejected() {
        assert!(WorkerApi::new("not a url", "token").is_err());
    }
}
