use futures::StreamExt;
use std::fmt;
use tracing::instrument;

use crate::{
    error::{Error, Result},
    http,
    presence::{model::*, stream, SnapshotStream},
};

/// The collection all presence records live in.
pub(crate) static USERS_PATH: &str = "users";

/// Provides methods to read, write and subscribe to presence records.
#[derive(Debug, Clone)]
pub struct Client {
    http_client: http::Client,
}

impl Client {
    pub(crate) fn new(http_client: http::Client) -> Self {
        Self { http_client }
    }

    /// Pushes a new record onto the collection and returns the identifier
    /// the database generated for it.
    ///
    /// # Errors
    /// If the API call fails or the database returns no key.
    #[instrument(skip(self))]
    pub async fn create(&self, record: &NewPresence) -> Result<String> {
        let res: PushResponse = self
            .http_client
            .post(USERS_PATH, record)
            .await?
            .json()
            .await?;
        if res.name.is_empty() {
            return Err(Error::MissingKey);
        }
        Ok(res.name)
    }

    /// Get a record by its identifier. Returns `None` if it doesn't exist.
    ///
    /// # Errors
    /// If the API call fails
    #[instrument(skip(self))]
    pub async fn get(&self, id: impl fmt::Display + fmt::Debug) -> Result<Option<PresenceRecord>> {
        self.http_client
            .get(format!("{USERS_PATH}/{id}"))
            .await?
            .json()
            .await
    }

    /// Updates the given fields of a record.
    ///
    /// # Errors
    /// If the API call fails
    #[instrument(skip(self))]
    pub async fn update(
        &self,
        id: impl fmt::Display + fmt::Debug,
        update: &PresenceUpdate,
    ) -> Result<()> {
        self.http_client
            .patch(format!("{USERS_PATH}/{id}"), update)
            .await?
            .check_error()
            .await?;
        Ok(())
    }

    /// Reads the whole collection once.
    ///
    /// # Errors
    /// If the API call fails
    #[instrument(skip(self))]
    pub async fn list(&self) -> Result<PresenceSnapshot> {
        self.http_client.get(USERS_PATH).await?.json().await
    }

    /// Subscribes to the whole collection. The stream yields a full snapshot
    /// on every change and ends when the connection closes or the database
    /// cancels the subscription.
    ///
    /// # Errors
    /// If the stream can't be opened.
    #[instrument(skip(self))]
    pub async fn subscribe(&self) -> Result<SnapshotStream> {
        let res = self
            .http_client
            .event_stream(USERS_PATH)
            .await?
            .check_error()
            .await?;
        Ok(stream::snapshots(res.into()).boxed())
    }
}

#[cfg(test)]
mod tests {
    use futures::StreamExt;
    use httpmock::{prelude::*, Method::PATCH};
    use serde_json::json;

    use crate::{
        presence::{Location, NewPresence, PresenceUpdate, Role, Status},
        Client,
    };

    fn client(server: &MockServer) -> Result<Client, crate::Error> {
        Client::builder()
            .no_env()
            .with_url(server.base_url())
            .with_auth_token("s3cret")
            .build()
    }

    #[tokio::test]
    async fn create() -> Result<(), Box<dyn std::error::Error>> {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(POST)
                .path("/users.json")
                .query_param("auth", "s3cret")
                .json_body_partial(r#"{ "name": "Pak Joko", "role": "vendor", "status": "active" }"#);
            then.status(200).json_body(json!({ "name": "-NvX1" }));
        });

        let id = client(&server)?
            .presence()
            .create(&NewPresence::active("Pak Joko", Role::Vendor))
            .await?;
        assert_eq!(id, "-NvX1");
        mock.assert_hits_async(1).await;
        Ok(())
    }

    #[tokio::test]
    async fn get_missing_record() -> Result<(), Box<dyn std::error::Error>> {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(GET).path("/users/-Nnone.json");
            then.status(200).body("null");
        });

        let record = client(&server)?.presence().get("-Nnone").await?;
        assert!(record.is_none());
        mock.assert_hits_async(1).await;
        Ok(())
    }

    #[tokio::test]
    async fn update() -> Result<(), Box<dyn std::error::Error>> {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(PATCH).path("/users/-NvX1.json").json_body(json!({
                "location": { "latitude": -6.2, "longitude": 106.8 },
                "status": "active"
            }));
            then.status(200)
                .json_body(json!({ "location": { "latitude": -6.2, "longitude": 106.8 }, "status": "active" }));
        });

        client(&server)?
            .presence()
            .update("-NvX1", &PresenceUpdate::located(Location::new(-6.2, 106.8)))
            .await?;
        mock.assert_hits_async(1).await;
        Ok(())
    }

    #[tokio::test]
    async fn list() -> Result<(), Box<dyn std::error::Error>> {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(GET).path("/users.json");
            then.status(200).json_body(json!({
                "-Na": { "name": "Pak Joko", "role": "vendor", "status": "active" },
                "-Nb": { "name": "Sari", "role": "customer", "status": "inactive" }
            }));
        });

        let snapshot = client(&server)?.presence().list().await?;
        assert_eq!(snapshot.len(), 2);
        assert_eq!(snapshot.get("-Nb").map(|r| r.status), Some(Status::Inactive));
        mock.assert_hits_async(1).await;
        Ok(())
    }

    #[tokio::test]
    async fn subscribe() -> Result<(), Box<dyn std::error::Error>> {
        let server = MockServer::start();
        let body = concat!(
            "event: put\n",
            "data: {\"path\":\"/\",\"data\":{\"-Na\":{\"name\":\"Pak Joko\",\"role\":\"vendor\",\"status\":\"active\"}}}\n\n",
            "event: keep-alive\n",
            "data: null\n\n",
            "event: patch\n",
            "data: {\"path\":\"/-Na\",\"data\":{\"location\":{\"latitude\":-6.2,\"longitude\":106.8}}}\n\n",
            "event: cancel\n",
            "data: \"Permission denied\"\n\n",
        );
        let mock = server.mock(|when, then| {
            when.method(GET)
                .path("/users.json")
                .header("accept", "text/event-stream");
            then.status(200)
                .header("content-type", "text/event-stream")
                .body(body);
        });

        let stream = client(&server)?.presence().subscribe().await?;
        let items: Vec<_> = stream.collect().await;
        assert_eq!(items.len(), 3);

        let first = items[0].as_ref().expect("first snapshot");
        assert_eq!(first.get("-Na").and_then(|r| r.location), None);
        let second = items[1].as_ref().expect("second snapshot");
        assert_eq!(
            second.get("-Na").and_then(|r| r.location),
            Some(Location::new(-6.2, 106.8))
        );
        assert!(matches!(
            items[2],
            Err(crate::Error::SubscriptionCancelled(ref reason)) if reason == "Permission denied"
        ));

        mock.assert_hits_async(1).await;
        Ok(())
    }
}
