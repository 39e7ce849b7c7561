//! The shared request/reply client.
//!
//! The model answers exactly one reply per request, in order, and cannot cope
//! with a second request while one is outstanding. Every magnet in the service
//! talks to it through one `ModelClient`, so the client owns the link behind an
//! async mutex: a request holds the lock from the moment it is written until
//! its reply has been read.
//!
//! Replies are bounded by a timeout. When a request times out or the link
//! fails, the connection is dropped; the next request reconnects. A late reply
//! can therefore never be read as the answer to a newer request.

use std::sync::Arc;
use std::time::Duration;

use magsim_core::error::{SimError, SimResult};
use magsim_core::limits::{DEFAULT_REPLY_TIMEOUT, MAX_REPLY_BYTES};
use tokio::io::{AsyncWriteExt, BufReader};
use tokio::sync::Mutex;
use tracing::{debug, info, instrument, warn};

use crate::link::{read_line_bounded, Link, ModelConnector, TcpConnector};
use crate::protocol::{ModelReply, ModelRequest};
use crate::table::{parse_table, LatticeRow};

/// Mutex-guarded request/reply client for the physics model.
pub struct ModelClient {
    connector: Arc<dyn ModelConnector>,
    link: Mutex<Option<Link>>,
    reply_timeout: Duration,
}

impl std::fmt::Debug for ModelClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelClient")
            .field("endpoint", &self.connector.endpoint())
            .field("reply_timeout", &self.reply_timeout)
            .finish_non_exhaustive()
    }
}

impl ModelClient {
    /// Create a client. No connection is opened until the first request.
    pub fn new(connector: Arc<dyn ModelConnector>, reply_timeout: Duration) -> Self {
        Self {
            connector,
            link: Mutex::new(None),
            reply_timeout,
        }
    }

    /// Client for a model listening on `host:port` over TCP.
    pub fn tcp(host: &str, port: u16, reply_timeout: Duration) -> Self {
        Self::new(Arc::new(TcpConnector::new(host, port)), reply_timeout)
    }

    /// Client with the default reply timeout.
    pub fn with_connector(connector: Arc<dyn ModelConnector>) -> Self {
        Self::new(connector, DEFAULT_REPLY_TIMEOUT)
    }

    /// Endpoint description for logs.
    pub fn endpoint(&self) -> String {
        self.connector.endpoint()
    }

    /// Reply timeout applied to each round trip.
    pub fn reply_timeout(&self) -> Duration {
        self.reply_timeout
    }

    /// Send one request and wait for its reply.
    pub async fn request(&self, request: &ModelRequest) -> SimResult<ModelReply> {
        let mut link = self.link.lock().await;
        self.round_trip(&mut link, request).await
    }

    /// Fetch and parse an attribute table.
    #[instrument(skip(self), err)]
    pub async fn query_lattice(
        &self,
        attribute: &str,
        selection: &str,
    ) -> SimResult<Vec<LatticeRow>> {
        let reply = self
            .request(&ModelRequest::show_lattice(attribute, selection))
            .await?;
        let rows = parse_table(reply.rows()?);
        debug!(count = rows.len(), "Parsed lattice rows");
        Ok(rows)
    }

    /// Set an element attribute, then make the model recompute the orbit.
    ///
    /// Both requests are issued under one lock hold so no other request can
    /// land between the set and the recompute. The reply to the set is logged
    /// and returned; the recompute reply is discarded.
    #[instrument(skip(self), err)]
    pub async fn push_element(
        &self,
        element: &str,
        attribute: &str,
        value: f64,
    ) -> SimResult<ModelReply> {
        let mut link = self.link.lock().await;
        let reply = self
            .round_trip(
                &mut link,
                &ModelRequest::set_element(element, attribute, value),
            )
            .await?;
        info!(%reply, "Model acknowledged set");
        self.round_trip(&mut link, &ModelRequest::SendOrbit).await?;
        Ok(reply)
    }

    /// Ask the model to recompute the orbit.
    pub async fn send_orbit(&self) -> SimResult<()> {
        self.request(&ModelRequest::SendOrbit).await.map(|_| ())
    }

    /// Switch kickers and quadrupoles to absolute field units.
    pub async fn use_absolute_field_basis(&self) -> SimResult<()> {
        let reply = self.request(&ModelRequest::absolute_field_basis()).await?;
        debug!(%reply, "Field basis set to absolute");
        Ok(())
    }

    /// Drop the current connection, if any.
    pub async fn disconnect(&self) {
        if self.link.lock().await.take().is_some() {
            debug!(endpoint = %self.endpoint(), "Model link closed");
        }
    }

    async fn round_trip(
        &self,
        slot: &mut Option<Link>,
        request: &ModelRequest,
    ) -> SimResult<ModelReply> {
        let outcome = tokio::time::timeout(self.reply_timeout, self.exchange(slot, request)).await;
        match outcome {
            Ok(Ok(reply)) => Ok(reply),
            Ok(Err(err)) => {
                if err.is_link_failure() {
                    warn!(request = request.label(), error = %err, "Model link failed; dropping connection");
                    *slot = None;
                }
                Err(err)
            }
            Err(_) => {
                warn!(
                    request = request.label(),
                    timeout = ?self.reply_timeout,
                    "Model reply timed out; dropping connection"
                );
                *slot = None;
                Err(SimError::ModelTimeout(self.reply_timeout))
            }
        }
    }

    async fn exchange(
        &self,
        slot: &mut Option<Link>,
        request: &ModelRequest,
    ) -> SimResult<ModelReply> {
        if slot.is_none() {
            let stream = self.connector.connect().await?;
            info!(endpoint = %self.endpoint(), "Connected to model");
            *slot = Some(BufReader::new(stream));
        }
        let Some(link) = slot.as_mut() else {
            return Err(SimError::ModelDisconnected);
        };

        let line = request.encode()?;
        debug!(request = request.label(), "-> model");
        let writer = link.get_mut();
        writer.write_all(line.as_bytes()).await?;
        writer.flush().await?;

        let reply_line = read_line_bounded(link, MAX_REPLY_BYTES).await?;
        ModelReply::decode(&reply_line)
    }
}
