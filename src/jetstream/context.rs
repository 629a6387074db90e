//! The entrypoint to the JetStream API: a thin layer over [`crate::Client`]
//! that knows the `$JS.API.` subject space and turns its replies into typed
//! results.

use bytes::Bytes;

use super::consumer;
use super::error::Error;
use super::options::JetStreamOptions;
use super::response::parse_response;
use super::stream;

/// A handle to JetStream on one NATS account. Cheap to clone; clones share
/// the underlying [`crate::Client`].
#[derive(Clone)]
pub struct Context {
    client: crate::Client,
    options: JetStreamOptions,
}

impl Context {
    pub(crate) async fn new(client: crate::Client) -> Result<Self, Error> {
        Self::with_options(client, JetStreamOptions::default()).await
    }

    pub(crate) async fn with_domain(client: crate::Client, domain: impl AsRef<str>) -> Result<Self, Error> {
        let options = JetStreamOptions::builder().domain(domain.as_ref()).build()?;
        Self::with_options(client, options).await
    }

    pub(crate) async fn with_prefix(client: crate::Client, prefix: impl Into<String>) -> Result<Self, Error> {
        let options = JetStreamOptions::builder().api_prefix(prefix).build()?;
        Self::with_options(client, options).await
    }

    /// Probes the account for JetStream support by requesting `<prefix>INFO`,
    /// then switches the client to the pre-multiplexed ("old") request style:
    /// attach and pull replies can race across distinct inboxes, which the
    /// shared-inbox multiplexer isn't built to disambiguate.
    async fn with_options(client: crate::Client, options: JetStreamOptions) -> Result<Self, Error> {
        let reply = client
            .request(
                format!("{}INFO", options.api_prefix),
                Bytes::new(),
                options.request_timeout,
            )
            .await
            .map_err(Error::Transport)?;

        match reply {
            None => return Err(Error::Timeout),
            Some(message) if message.payload.is_empty() => return Err(Error::JetStreamNotEnabled),
            Some(_) => {}
        }

        client.use_old_request_style();

        Ok(Context { client, options })
    }

    pub fn client(&self) -> &crate::Client {
        &self.client
    }

    pub fn options(&self) -> &JetStreamOptions {
        &self.options
    }

    fn api_subject(&self, suffix: &str) -> String {
        format!("{}{}", self.options.api_prefix, suffix)
    }

    async fn api_request<T: serde::de::DeserializeOwned>(
        &self,
        suffix: &str,
        payload: Bytes,
    ) -> Result<T, Error> {
        let reply = self
            .client
            .request(self.api_subject(suffix), payload, self.options.request_timeout)
            .await
            .map_err(Error::Transport)?
            .ok_or(Error::Timeout)?;
        parse_response(&reply.payload)
    }

    pub async fn add_stream(&self, config: stream::Config) -> Result<stream::Info, Error> {
        let body = serde_json::to_vec(&config)
            .map_err(|e| Error::InvalidArgument(format!("invalid stream config: {e}")))?;
        self.api_request(&format!("STREAM.CREATE.{}", config.name), Bytes::from(body))
            .await
    }

    pub async fn update_stream(&self, config: stream::Config) -> Result<stream::Info, Error> {
        let body = serde_json::to_vec(&config)
            .map_err(|e| Error::InvalidArgument(format!("invalid stream config: {e}")))?;
        self.api_request(&format!("STREAM.UPDATE.{}", config.name), Bytes::from(body))
            .await
    }

    pub async fn stream_info(&self, stream: &str) -> Result<stream::Info, Error> {
        self.api_request(&format!("STREAM.INFO.{stream}"), Bytes::new()).await
    }

    pub async fn delete_stream(&self, stream: &str) -> Result<(), Error> {
        #[derive(serde::Deserialize)]
        struct DeleteResponse {
            success: bool,
        }
        let response: DeleteResponse = self
            .api_request(&format!("STREAM.DELETE.{stream}"), Bytes::new())
            .await?;
        if response.success {
            Ok(())
        } else {
            Err(Error::InvalidState(format!("server refused to delete stream {stream}")))
        }
    }

    /// Finds the stream whose subject filter covers `subject`, the lookup a
    /// subscriber without a known stream name performs before attaching.
    pub async fn lookup_stream_by_subject(&self, subject: &str) -> Result<String, Error> {
        #[derive(serde::Serialize)]
        struct Request<'a> {
            subject: &'a str,
        }
        #[derive(serde::Deserialize)]
        struct NamesResponse {
            streams: Vec<String>,
        }
        let body = serde_json::to_vec(&Request { subject })
            .map_err(|e| Error::InvalidArgument(format!("invalid subject: {e}")))?;
        let response: NamesResponse = self.api_request("STREAM.NAMES", Bytes::from(body)).await?;
        response
            .streams
            .into_iter()
            .next()
            .ok_or_else(|| Error::NotFound(format!("no stream matches subject {subject}")))
    }

    /// Creates a consumer, choosing the durable or ephemeral creation
    /// subject depending on whether `config.durable_name` is set.
    pub async fn add_consumer(
        &self,
        stream: &str,
        config: consumer::ConsumerConfig,
    ) -> Result<consumer::Info, Error> {
        #[derive(serde::Serialize)]
        struct Request<'a> {
            stream_name: &'a str,
            config: &'a consumer::ConsumerConfig,
        }
        let body = serde_json::to_vec(&Request {
            stream_name: stream,
            config: &config,
        })
        .map_err(|e| Error::InvalidArgument(format!("invalid consumer config: {e}")))?;

        let suffix = match &config.durable_name {
            Some(durable) => format!("CONSUMER.DURABLE.CREATE.{stream}.{durable}"),
            None => format!("CONSUMER.CREATE.{stream}"),
        };
        self.api_request(&suffix, Bytes::from(body)).await
    }

    pub async fn consumer_info(&self, stream: &str, name: &str) -> Result<consumer::Info, Error> {
        self.api_request(&format!("CONSUMER.INFO.{stream}.{name}"), Bytes::new())
            .await
    }

    pub async fn delete_consumer(&self, stream: &str, name: &str) -> Result<(), Error> {
        #[derive(serde::Deserialize)]
        struct DeleteResponse {
            success: bool,
        }
        let response: DeleteResponse = self
            .api_request(&format!("CONSUMER.DELETE.{stream}.{name}"), Bytes::new())
            .await?;
        if response.success {
            Ok(())
        } else {
            Err(Error::InvalidState(format!(
                "server refused to delete consumer {name} on {stream}"
            )))
        }
    }

    /// Lists every consumer on `stream`, paging through `CONSUMER.LIST`
    /// until the server reports no more results.
    pub async fn get_consumers(&self, stream: &str) -> Result<Vec<consumer::Info>, Error> {
        #[derive(serde::Serialize)]
        struct Request {
            offset: usize,
        }
        #[derive(serde::Deserialize)]
        struct ListResponse {
            consumers: Vec<consumer::Info>,
            total: usize,
            offset: usize,
        }

        let mut all = Vec::new();
        let mut offset = 0;
        loop {
            let body = serde_json::to_vec(&Request { offset }).expect("offset always serializes");
            let response: ListResponse = self
                .api_request(&format!("CONSUMER.LIST.{stream}"), Bytes::from(body))
                .await?;
            let page_len = response.consumers.len();
            all.extend(response.consumers);
            offset = response.offset + page_len;
            if page_len == 0 || all.len() >= response.total {
                break;
            }
        }
        Ok(all)
    }
}
