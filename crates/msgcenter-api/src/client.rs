//! Mailbox service client.

use std::future::Future;
use std::sync::Arc;

use reqwest::{Client, RequestBuilder, Response, StatusCode};
use tracing::{debug, info, warn};
use url::Url;

use crate::config::ApiConfig;
use crate::error::{Error, Result};
use crate::types::{
    AckResponse, Credentials, ListResponse, Listing, MessageId, Mutation, MutationRequest,
};

/// Header carrying the device channel ID.
pub const CHANNEL_HEADER: &str = "X-Channel-ID";

/// Protocol-level operations against the remote mailbox.
///
/// Implementations are stateless per call: credentials are passed to every
/// operation and never cached. Mutations report which IDs the service
/// acknowledged, which may be a strict subset of the requested IDs.
pub trait MailboxApi: Send + Sync + 'static {
    /// Lists messages, optionally only the changes since `since`.
    fn list_messages(
        &self,
        credentials: &Credentials,
        since: Option<&str>,
    ) -> impl Future<Output = Result<Listing>> + Send;

    /// Marks messages as read; returns the acknowledged IDs.
    fn mark_read(
        &self,
        credentials: &Credentials,
        ids: &[MessageId],
    ) -> impl Future<Output = Result<Vec<MessageId>>> + Send;

    /// Deletes messages; returns the acknowledged IDs.
    fn delete(
        &self,
        credentials: &Credentials,
        ids: &[MessageId],
    ) -> impl Future<Output = Result<Vec<MessageId>>> + Send;

    /// Applies `mutation` to `ids`.
    fn apply(
        &self,
        credentials: &Credentials,
        mutation: Mutation,
        ids: &[MessageId],
    ) -> impl Future<Output = Result<Vec<MessageId>>> + Send {
        async move {
            match mutation {
                Mutation::MarkRead => self.mark_read(credentials, ids).await,
                Mutation::Delete => self.delete(credentials, ids).await,
            }
        }
    }
}

impl<T: MailboxApi> MailboxApi for Arc<T> {
    fn list_messages(
        &self,
        credentials: &Credentials,
        since: Option<&str>,
    ) -> impl Future<Output = Result<Listing>> + Send {
        T::list_messages(self, credentials, since)
    }

    fn mark_read(
        &self,
        credentials: &Credentials,
        ids: &[MessageId],
    ) -> impl Future<Output = Result<Vec<MessageId>>> + Send {
        T::mark_read(self, credentials, ids)
    }

    fn delete(
        &self,
        credentials: &Credentials,
        ids: &[MessageId],
    ) -> impl Future<Output = Result<Vec<MessageId>>> + Send {
        T::delete(self, credentials, ids)
    }
}

/// HTTP implementation of [`MailboxApi`].
#[derive(Debug, Clone)]
pub struct HttpMailboxApi {
    http: Client,
    config: ApiConfig,
}

impl HttpMailboxApi {
    /// Creates a client with the given configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(config: ApiConfig) -> Result<Self> {
        let http = Client::builder()
            .timeout(config.request_timeout)
            .connect_timeout(config.connect_timeout)
            .user_agent(config.user_agent.clone())
            .build()?;
        Ok(Self { http, config })
    }

    /// Returns the client configuration.
    #[must_use]
    pub const fn config(&self) -> &ApiConfig {
        &self.config
    }

    /// Resolves `api/user/{user_id}/messages/[action/]` below the base URL.
    fn endpoint(&self, credentials: &Credentials, action: Option<&str>) -> Result<Url> {
        let mut url = self.config.base_url.clone();
        {
            let mut segments = url.path_segments_mut().map_err(|()| {
                Error::InvalidConfig(format!("{} cannot be a base URL", self.config.base_url))
            })?;
            segments
                .pop_if_empty()
                .extend(["api", "user", credentials.user_id.as_str(), "messages"]);
            if let Some(action) = action {
                segments.push(action);
            }
            segments.push("");
        }
        Ok(url)
    }

    fn authorized(request: RequestBuilder, credentials: &Credentials) -> RequestBuilder {
        request
            .basic_auth(&credentials.user_id, Some(&credentials.password))
            .header(CHANNEL_HEADER, &credentials.channel_id)
    }

    fn transport_error(&self, error: reqwest::Error) -> Error {
        if error.is_timeout() {
            Error::Timeout(self.config.request_timeout)
        } else {
            Error::Http(error)
        }
    }

    async fn send(&self, request: RequestBuilder) -> Result<Response> {
        request.send().await.map_err(|e| self.transport_error(e))
    }

    /// Reads the body, turning non-success statuses into errors.
    async fn read_body(&self, response: Response) -> Result<String> {
        let status = response.status();
        let body = response.text().await.map_err(|e| self.transport_error(e))?;
        if status.is_success() {
            Ok(body)
        } else {
            Err(Error::from_status(status, body))
        }
    }

    async fn mutate(
        &self,
        credentials: &Credentials,
        mutation: Mutation,
        ids: &[MessageId],
    ) -> Result<Vec<MessageId>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let url = self.endpoint(credentials, Some(mutation.endpoint()))?;
        debug!("Mailbox: {} {} message(s)", mutation, ids.len());

        let request = Self::authorized(self.http.post(url), credentials)
            .json(&MutationRequest { ids });
        let response = self.send(request).await?;
        let body = self.read_body(response).await?;

        let ack: AckResponse = if body.trim().is_empty() {
            AckResponse::default()
        } else {
            serde_json::from_str(&body)?
        };

        // A bare 2xx acknowledges everything that was sent.
        let acknowledged: Vec<MessageId> = match ack.acknowledged {
            None => ids.to_vec(),
            Some(acked) => acked.into_iter().filter(|id| ids.contains(id)).collect(),
        };

        if acknowledged.len() < ids.len() {
            warn!(
                "Mailbox: {} acknowledged {} of {} message(s)",
                mutation,
                acknowledged.len(),
                ids.len()
            );
        }
        Ok(acknowledged)
    }
}

impl MailboxApi for HttpMailboxApi {
    async fn list_messages(&self, credentials: &Credentials, since: Option<&str>) -> Result<Listing> {
        let url = self.endpoint(credentials, None)?;
        debug!(
            "Mailbox: listing messages for {} (since={:?})",
            credentials.user_id, since
        );

        let mut request = Self::authorized(self.http.get(url), credentials);
        if let Some(token) = since {
            request = request.query(&[("since", token)]);
        }

        let response = self.send(request).await?;
        if response.status() == StatusCode::NOT_MODIFIED {
            debug!("Mailbox: not modified since {:?}", since);
            return Ok(Listing::incremental(Vec::new(), since.map(str::to_string)));
        }

        let body = self.read_body(response).await?;
        let list: ListResponse = serde_json::from_str(&body)?;

        info!(
            "Mailbox: got {} message(s), full={}",
            list.messages.len(),
            list.full
        );
        Ok(Listing {
            messages: list.messages,
            next_token: list.next_token,
            full: list.full,
        })
    }

    async fn mark_read(&self, credentials: &Credentials, ids: &[MessageId]) -> Result<Vec<MessageId>> {
        self.mutate(credentials, Mutation::MarkRead, ids).await
    }

    async fn delete(&self, credentials: &Credentials, ids: &[MessageId]) -> Result<Vec<MessageId>> {
        self.mutate(credentials, Mutation::Delete, ids).await
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use mockito::Matcher;

    use super::*;
    use crate::error::ErrorKind;

    const LIST_PATH: &str = "/api/user/user-1/messages/";
    const BASIC_AUTH: &str = "Basic dXNlci0xOnNlY3JldA==";

    fn credentials() -> Credentials {
        Credentials::new("user-1", "secret", "channel-1")
    }

    fn client(server: &mockito::ServerGuard) -> HttpMailboxApi {
        HttpMailboxApi::new(ApiConfig::new(&server.url()).unwrap()).unwrap()
    }

    #[test]
    fn test_endpoint_layout() {
        let api = HttpMailboxApi::new(ApiConfig::new("https://inbox.example.com/v1/").unwrap())
            .unwrap();
        let url = api.endpoint(&credentials(), Some("mark-read")).unwrap();
        assert_eq!(
            url.as_str(),
            "https://inbox.example.com/v1/api/user/user-1/messages/mark-read/"
        );
    }

    #[tokio::test]
    async fn test_list_full() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", LIST_PATH)
            .match_header("authorization", BASIC_AUTH)
            .match_header("x-channel-id", "channel-1")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                r#"{
                    "messages": [
                        {"id": "m1", "createdAt": "2026-01-24T10:00:00Z", "bodyRef": "https://x/m1"},
                        {"id": "m2", "createdAt": "2026-01-25T10:00:00Z", "bodyRef": "https://x/m2",
                         "isRead": true, "title": "Hello", "extra": {"campaign": "spring"}}
                    ],
                    "nextToken": "tok-1",
                    "full": true
                }"#,
            )
            .create_async()
            .await;

        let listing = client(&server)
            .list_messages(&credentials(), None)
            .await
            .unwrap();

        mock.assert_async().await;
        assert!(listing.full);
        assert_eq!(listing.next_token.as_deref(), Some("tok-1"));
        assert_eq!(listing.messages.len(), 2);
        assert!(listing.messages[1].is_read);
        assert_eq!(listing.messages[1].title.as_deref(), Some("Hello"));
        assert_eq!(listing.messages[1].extra["campaign"], "spring");
    }

    #[tokio::test]
    async fn test_list_incremental_sends_token() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", LIST_PATH)
            .match_query(Matcher::UrlEncoded("since".into(), "tok-1".into()))
            .with_status(200)
            .with_body(r#"{"messages": [], "nextToken": "tok-2", "full": false}"#)
            .create_async()
            .await;

        let listing = client(&server)
            .list_messages(&credentials(), Some("tok-1"))
            .await
            .unwrap();

        mock.assert_async().await;
        assert!(!listing.full);
        assert_eq!(listing.next_token.as_deref(), Some("tok-2"));
    }

    #[tokio::test]
    async fn test_list_not_modified_keeps_token() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", LIST_PATH)
            .match_query(Matcher::Any)
            .with_status(304)
            .create_async()
            .await;

        let listing = client(&server)
            .list_messages(&credentials(), Some("tok-1"))
            .await
            .unwrap();

        assert!(!listing.full);
        assert!(listing.messages.is_empty());
        assert_eq!(listing.next_token.as_deref(), Some("tok-1"));
    }

    #[tokio::test]
    async fn test_list_unauthorized() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", LIST_PATH)
            .with_status(401)
            .create_async()
            .await;

        let err = client(&server)
            .list_messages(&credentials(), None)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Unauthorized);
    }

    #[tokio::test]
    async fn test_list_server_error_is_transient() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", LIST_PATH)
            .with_status(503)
            .create_async()
            .await;

        let err = client(&server)
            .list_messages(&credentials(), None)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Transient);
    }

    #[tokio::test]
    async fn test_list_garbage_body_is_transient() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", LIST_PATH)
            .with_status(200)
            .with_body("<html>maintenance</html>")
            .create_async()
            .await;

        let err = client(&server)
            .list_messages(&credentials(), None)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Json(_)));
        assert_eq!(err.kind(), ErrorKind::Transient);
    }

    #[tokio::test]
    async fn test_mark_read_partial_ack() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/api/user/user-1/messages/mark-read/")
            .match_body(Matcher::Json(serde_json::json!({"ids": ["m1", "m2"]})))
            .with_status(200)
            .with_body(r#"{"acknowledged": ["m2", "unknown"]}"#)
            .create_async()
            .await;

        let acked = client(&server)
            .mark_read(&credentials(), &[MessageId::from("m1"), MessageId::from("m2")])
            .await
            .unwrap();

        mock.assert_async().await;
        assert_eq!(acked, vec![MessageId::from("m2")]);
    }

    #[tokio::test]
    async fn test_delete_empty_body_acknowledges_all() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/api/user/user-1/messages/delete/")
            .with_status(200)
            .create_async()
            .await;

        let ids = [MessageId::from("m1"), MessageId::from("m2")];
        let acked = client(&server).delete(&credentials(), &ids).await.unwrap();
        assert_eq!(acked, ids.to_vec());
    }

    #[tokio::test]
    async fn test_delete_rejected() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/api/user/user-1/messages/delete/")
            .with_status(400)
            .with_body("bad id")
            .create_async()
            .await;

        let err = client(&server)
            .delete(&credentials(), &[MessageId::from("m1")])
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Rejected);
        assert!(matches!(err, Error::Rejected { status: 400, .. }));
    }

    #[tokio::test]
    async fn test_empty_mutation_sends_nothing() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", Matcher::Any)
            .expect(0)
            .create_async()
            .await;

        let acked = client(&server)
            .apply(&credentials(), Mutation::MarkRead, &[])
            .await
            .unwrap();

        mock.assert_async().await;
        assert!(acked.is_empty());
    }
}
