use std::future::Future;
use std::time::Duration;

use bytes::Bytes;
use futures_util::stream::BoxStream;
use futures_util::StreamExt;
use tracing::debug;

use crate::config::Endpoints;
use crate::error::{LiveMapError, Result};

pub type ByteStream = BoxStream<'static, Result<Bytes>>;

/// Where vehicle data comes from
pub trait VehicleSource {
    /// One `/vehicles` payload
    fn fetch_vehicles(&self) -> impl Future<Output = Result<String>> + Send;

    /// The raw body of the event stream
    fn open_stream(&self) -> impl Future<Output = Result<ByteStream>> + Send;
}

/// Talks to the live map server over HTTP
#[derive(Clone, Debug)]
pub struct HttpSource {
    endpoints: Endpoints,
    client: reqwest::Client,
    timeout: Duration,
}

impl HttpSource {
    pub fn new(endpoints: Endpoints, timeout: Duration) -> Self {
        Self {
            endpoints,
            client: reqwest::Client::new(),
            timeout,
        }
    }

    pub fn endpoints(&self) -> &Endpoints {
        &self.endpoints
    }

    /// GET `url` and return the body as text
    pub async fn get_text(&self, url: &str) -> Result<String> {
        debug!("GET {url}");
        let response = self.client.get(url).timeout(self.timeout).send().await?;

        if !response.status().is_success() {
            return Err(LiveMapError::Status {
                status: response.status().as_u16(),
                url: url.to_owned(),
            });
        }

        Ok(response.text().await?)
    }

    pub async fn fetch_shapes(&self) -> Result<String> {
        self.get_text(&self.endpoints.shapes()).await
    }

    pub async fn fetch_alerts(&self) -> Result<String> {
        self.get_text(&self.endpoints.alerts()).await
    }
}

impl VehicleSource for HttpSource {
    async fn fetch_vehicles(&self) -> Result<String> {
        self.get_text(&self.endpoints.vehicles()).await
    }

    async fn open_stream(&self) -> Result<ByteStream> {
        let url = self.endpoints.vehicle_stream();
        debug!("opening event stream {url}");

        // No overall timeout: the body never ends on its own
        let response = self
            .client
            .get(&url)
            .header(reqwest::header::ACCEPT, "text/event-stream")
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(LiveMapError::Status {
                status: response.status().as_u16(),
                url,
            });
        }

        Ok(response
            .bytes_stream()
            .map(|chunk| chunk.map_err(LiveMapError::from))
            .boxed())
    }
}
