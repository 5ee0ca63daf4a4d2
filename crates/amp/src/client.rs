//! A multiplexing AMP client.
//!
//! One connection carries any number of concurrent calls. Each call that
//! wants an answer gets a fresh `_ask` tag; the reader task routes `_answer`
//! and `_error` boxes back to the waiting caller by tag.

use std::{
    collections::HashMap,
    sync::{
        Arc, Mutex, MutexGuard, PoisonError,
        atomic::{AtomicU64, Ordering},
    },
    time::Duration,
};

use {
    bytes::Bytes,
    futures::{SinkExt, StreamExt},
    tokio::{
        io::{AsyncRead, AsyncWrite},
        net::TcpStream,
        sync::{mpsc, oneshot},
        task::JoinHandle,
    },
    tokio_util::codec::{FramedRead, FramedWrite},
    tracing::{debug, warn},
};

use crate::{
    AmpBox,
    boxes::{UNHANDLED_ERROR_CODE, UNKNOWN_ERROR_CODE, keys},
    codec::{self, AmpCodec},
    error::{Error, Result},
};

type Reply = Result<AmpBox>;

#[derive(Default)]
struct Pending {
    closed: bool,
    calls: HashMap<String, oneshot::Sender<Reply>>,
}

type SharedPending = Arc<Mutex<Pending>>;

fn lock(pending: &Mutex<Pending>) -> MutexGuard<'_, Pending> {
    pending.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Removes the tag if the caller stops waiting before the answer arrives.
struct PendingCall<'a> {
    pending: &'a Mutex<Pending>,
    tag: String,
}

impl Drop for PendingCall<'_> {
    fn drop(&mut self) {
        lock(self.pending).calls.remove(&self.tag);
    }
}

/// Client side of one AMP connection.
///
/// Dropping the client closes the connection and fails every outstanding
/// call with [`Error::ConnectionClosed`].
pub struct AmpClient {
    outbound: mpsc::UnboundedSender<AmpBox>,
    pending: SharedPending,
    next_tag: AtomicU64,
    reader: JoinHandle<()>,
    writer: JoinHandle<()>,
}

impl AmpClient {
    /// Dial `address` (`host:port`), giving up after `timeout`.
    pub async fn connect(address: &str, timeout: Duration) -> Result<Self> {
        let stream = tokio::time::timeout(timeout, TcpStream::connect(address))
            .await
            .map_err(|_| Error::Timeout(timeout))??;
        stream.set_nodelay(true)?;
        debug!(address, "AMP connection established");
        Ok(Self::from_stream(stream))
    }

    /// Run the protocol over an already-connected byte stream.
    pub fn from_stream<T>(stream: T) -> Self
    where
        T: AsyncRead + AsyncWrite + Send + 'static,
    {
        let (read_half, write_half) = tokio::io::split(stream);
        let (outbound, outbound_rx) = mpsc::unbounded_channel();
        let pending = SharedPending::default();

        let writer = tokio::spawn(write_loop(
            FramedWrite::new(write_half, AmpCodec),
            outbound_rx,
            Arc::clone(&pending),
        ));
        let reader = tokio::spawn(read_loop(
            FramedRead::new(read_half, AmpCodec),
            outbound.clone(),
            Arc::clone(&pending),
        ));

        Self {
            outbound,
            pending,
            next_tag: AtomicU64::new(1),
            reader,
            writer,
        }
    }

    /// Whether the connection has gone away.
    pub fn is_closed(&self) -> bool {
        lock(&self.pending).closed || self.outbound.is_closed()
    }

    /// Send `command` with `arguments`.
    ///
    /// With `requires_answer` the call waits for the matching answer box and
    /// returns it; a remote `_error` becomes [`Error::Remote`]. Without it
    /// the box is sent with no `_ask` tag and `None` is returned at once.
    pub async fn call_remote(
        &self,
        command: &str,
        requires_answer: bool,
        mut arguments: AmpBox,
    ) -> Result<Option<AmpBox>> {
        if self.is_closed() {
            return Err(Error::ConnectionClosed);
        }
        arguments.insert(keys::COMMAND, Bytes::copy_from_slice(command.as_bytes()));
        arguments.remove(keys::ASK);

        if !requires_answer {
            codec::validate(&arguments)?;
            self.outbound
                .send(arguments)
                .map_err(|_| Error::ConnectionClosed)?;
            return Ok(None);
        }

        let tag = format!("{:x}", self.next_tag.fetch_add(1, Ordering::Relaxed));
        arguments.insert(keys::ASK, tag.clone());
        codec::validate(&arguments)?;

        let (tx, rx) = oneshot::channel();
        // Register before sending so a fast answer always finds its caller.
        {
            let mut pending = lock(&self.pending);
            if pending.closed {
                return Err(Error::ConnectionClosed);
            }
            pending.calls.insert(tag.clone(), tx);
        }
        let _guard = PendingCall {
            pending: &self.pending,
            tag,
        };

        self.outbound
            .send(arguments)
            .map_err(|_| Error::ConnectionClosed)?;

        match rx.await {
            Ok(reply) => reply.map(Some),
            Err(_) => Err(Error::ConnectionClosed),
        }
    }
}

impl Drop for AmpClient {
    fn drop(&mut self) {
        self.reader.abort();
        self.writer.abort();
        close(&self.pending);
    }
}

/// Mark the connection closed and fail every waiting call.
fn close(pending: &Mutex<Pending>) {
    let calls = {
        let mut pending = lock(pending);
        pending.closed = true;
        std::mem::take(&mut pending.calls)
    };
    for (_, tx) in calls {
        let _ = tx.send(Err(Error::ConnectionClosed));
    }
}

async fn write_loop<W>(
    mut sink: FramedWrite<W, AmpCodec>,
    mut outbound: mpsc::UnboundedReceiver<AmpBox>,
    pending: SharedPending,
) where
    W: AsyncWrite + Unpin,
{
    while let Some(amp_box) = outbound.recv().await {
        if let Err(e) = sink.send(amp_box).await {
            warn!(error = %e, "AMP write failed");
            break;
        }
    }
    close(&pending);
}

async fn read_loop<R>(
    mut stream: FramedRead<R, AmpCodec>,
    outbound: mpsc::UnboundedSender<AmpBox>,
    pending: SharedPending,
) where
    R: AsyncRead + Unpin,
{
    while let Some(frame) = stream.next().await {
        match frame {
            Ok(amp_box) => route(amp_box, &outbound, &pending),
            Err(e) => {
                warn!(error = %e, "AMP read failed");
                break;
            },
        }
    }
    debug!("AMP connection closed by peer");
    close(&pending);
}

fn route(mut amp_box: AmpBox, outbound: &mpsc::UnboundedSender<AmpBox>, pending: &Mutex<Pending>) {
    if let Some(tag) = amp_box.get_str(keys::ANSWER).map(str::to_owned) {
        complete(pending, &tag, Ok(amp_box));
    } else if let Some(tag) = amp_box.get_str(keys::ERROR).map(str::to_owned) {
        let code = amp_box
            .remove(keys::ERROR_CODE)
            .map(|v| String::from_utf8_lossy(&v).into_owned())
            .unwrap_or_else(|| UNKNOWN_ERROR_CODE.to_owned());
        let description = amp_box
            .remove(keys::ERROR_DESCRIPTION)
            .map(|v| String::from_utf8_lossy(&v).into_owned())
            .unwrap_or_default();
        complete(pending, &tag, Err(Error::Remote { code, description }));
    } else if let Some(command) = amp_box.get_str(keys::COMMAND) {
        // The backend does not get to call us.
        debug!(command, "rejecting inbound AMP command");
        if let Some(tag) = amp_box.get(keys::ASK) {
            let reply: AmpBox = [
                (keys::ERROR, tag.clone()),
                (keys::ERROR_CODE, Bytes::from_static(UNHANDLED_ERROR_CODE.as_bytes())),
                (
                    keys::ERROR_DESCRIPTION,
                    Bytes::from(format!("Unhandled Command: {command:?}")),
                ),
            ]
            .into_iter()
            .collect();
            let _ = outbound.send(reply);
        }
    } else {
        warn!(keys = ?amp_box.keys().collect::<Vec<_>>(), "ignoring unrecognised AMP box");
    }
}

fn complete(pending: &Mutex<Pending>, tag: &str, reply: Reply) {
    match lock(pending).calls.remove(tag) {
        Some(tx) => {
            let _ = tx.send(reply);
        },
        None => debug!(tag, "AMP reply for unknown or abandoned call"),
    }
}
