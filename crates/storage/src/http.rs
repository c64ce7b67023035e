use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, StatusCode};
use std::collections::BTreeMap;

use progress_core::model::{ContentId, LearningType, ProgressState, RecordPatch};

use crate::remote::{RemoteError, RemoteProgressStore};

/// HTTP client for the remote progress endpoint.
///
/// `GET <endpoint>` returns the full snapshot; `PUT <endpoint>` with body
/// `{ "<type>": { "<id>": { fields } } }` applies a partial merge
/// server-side. A 401 response maps to `RemoteError::Unauthorized`.
#[derive(Clone)]
pub struct HttpRemoteStore {
    client: Client,
    endpoint: String,
    api_token: Option<String>,
}

impl HttpRemoteStore {
    #[must_use]
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            endpoint: endpoint.into(),
            api_token: None,
        }
    }

    /// Attach a bearer token to every request.
    #[must_use]
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.api_token = Some(token.into());
        self
    }

    fn authorized(&self, builder: RequestBuilder) -> RequestBuilder {
        match &self.api_token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }
}

#[async_trait]
impl RemoteProgressStore for HttpRemoteStore {
    async fn fetch(&self) -> Result<ProgressState, RemoteError> {
        let response = self
            .authorized(self.client.get(&self.endpoint))
            .send()
            .await?;

        if response.status() == StatusCode::UNAUTHORIZED {
            return Err(RemoteError::Unauthorized);
        }
        if !response.status().is_success() {
            return Err(RemoteError::HttpStatus(response.status()));
        }

        Ok(response.json().await?)
    }

    async fn push(
        &self,
        ty: LearningType,
        id: &ContentId,
        patch: &RecordPatch,
    ) -> Result<(), RemoteError> {
        let mut fragment: BTreeMap<LearningType, BTreeMap<&ContentId, &RecordPatch>> =
            BTreeMap::new();
        fragment.entry(ty).or_default().insert(id, patch);

        let response = self
            .authorized(self.client.put(&self.endpoint))
            .json(&fragment)
            .send()
            .await?;

        if response.status() == StatusCode::UNAUTHORIZED {
            return Err(RemoteError::Unauthorized);
        }
        if !response.status().is_success() {
            return Err(RemoteError::HttpStatus(response.status()));
        }

        // The response body is intentionally ignored; local state stays
        // authoritative after a successful partial update.
        Ok(())
    }
}
