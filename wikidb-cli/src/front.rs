//! Line-oriented front component
//!
//! Reads one JSON envelope per line, forwards it to the database queue and
//! writes one JSON line back:
//!
//! ```text
//! {"headers":{"action":"get-page"},"body":{"page":"Home"}}
//! {"ok":{"found":true,"id":1,"rawContent":"# Home"}}
//! ```
//!
//! Failures come back as `{"error":{"code":n,"message":"..."}}`. Transport
//! errors (no consumer, dropped reply) use code -1.

use std::io;

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader, Stdin, Stdout};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use wikidb_core::{Envelope, Failure};
use wikidb_server::bootstrap::ComponentError;
use wikidb_server::{BusError, Component, EventBus};

const TRANSPORT_ERROR_CODE: i32 = -1;

/// Front that relays NDJSON envelopes between a reader/writer pair and the bus
pub struct LineFront<R, W> {
    queue: String,
    io: Mutex<Option<(R, W)>>,
    task: Mutex<Option<JoinHandle<io::Result<usize>>>>,
}

impl LineFront<BufReader<Stdin>, Stdout> {
    /// Front over the process's stdin/stdout
    pub fn stdio(queue: &str) -> Self {
        Self::new(queue, BufReader::new(tokio::io::stdin()), tokio::io::stdout())
    }
}

impl<R, W> LineFront<R, W>
where
    R: AsyncBufRead + Unpin + Send + 'static,
    W: AsyncWrite + Unpin + Send + 'static,
{
    pub fn new(queue: &str, reader: R, writer: W) -> Self {
        Self {
            queue: queue.to_owned(),
            io: Mutex::new(Some((reader, writer))),
            task: Mutex::new(None),
        }
    }

    /// Wait for input to close; yields the number of envelopes relayed.
    pub async fn finished(&self) -> io::Result<usize> {
        let Some(handle) = self.task.lock().await.take() else {
            return Ok(0);
        };
        handle
            .await
            .map_err(|err| io::Error::new(io::ErrorKind::Other, err))?
    }
}

async fn relay<R, W>(bus: EventBus, queue: String, reader: R, mut writer: W) -> io::Result<usize>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut lines = reader.lines();
    let mut handled = 0;

    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let response = respond(&bus, &queue, line).await;
        let mut encoded = response.to_string();
        encoded.push('\n');
        writer.write_all(encoded.as_bytes()).await?;
        writer.flush().await?;
        handled += 1;
    }

    writer.shutdown().await?;
    Ok(handled)
}

async fn respond(bus: &EventBus, queue: &str, line: &str) -> Value {
    let envelope: Envelope = match serde_json::from_str(line) {
        Ok(envelope) => envelope,
        Err(err) => {
            let failure = Failure::invalid_payload(format!("malformed envelope: {err}"));
            return json!({ "error": failure });
        }
    };

    match bus.request(queue, envelope).await {
        Ok(body) => json!({ "ok": body }),
        Err(BusError::Recipient(failure)) => json!({ "error": failure }),
        Err(other) => {
            tracing::warn!(queue = %queue, error = %other, "Request not delivered");
            json!({ "error": { "code": TRANSPORT_ERROR_CODE, "message": other.to_string() } })
        }
    }
}

#[async_trait]
impl<R, W> Component for LineFront<R, W>
where
    R: AsyncBufRead + Unpin + Send + 'static,
    W: AsyncWrite + Unpin + Send + 'static,
{
    fn name(&self) -> &str {
        "line-front"
    }

    async fn start(&self, bus: &EventBus) -> Result<(), ComponentError> {
        let (reader, writer) = self
            .io
            .lock()
            .await
            .take()
            .ok_or("line front already started")?;

        let handle = tokio::spawn(relay(bus.clone(), self.queue.clone(), reader, writer));
        *self.task.lock().await = Some(handle);
        Ok(())
    }
}
