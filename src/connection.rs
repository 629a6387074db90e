//! The connection actor: owns the socket, multiplexes inbound `MSG` frames
//! out to subscribers, and serializes outbound writes.
//!
//! This is the concrete, in-process implementation of the "external
//! collaborator" transport: a reader task drives a [`ProtocolCodec`] over a
//! socket and fans messages out by sid; callers write through a shared,
//! locked sink. There is no reconnect logic and no TLS here — those are
//! explicitly out of scope for this crate.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bytes::{Bytes, BytesMut};
use futures::StreamExt;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::{mpsc, oneshot, Mutex};
use tokio_util::codec::FramedRead;

use crate::proto::{ClientOp, ConnectInfo, ProtocolCodec, ProtocolError, ServerInfo, ServerOp};
use crate::{Error, Message};

const INBOX_PREFIX: &str = "_INBOX";

struct Shared {
    write: Mutex<Box<dyn AsyncWrite + Send + Unpin>>,
    subs: Mutex<HashMap<u64, mpsc::Sender<Message>>>,
    /// Pending multiplexed requests, keyed by the unique token appended to
    /// the shared inbox subject (e.g. `_INBOX.<nuid>.<token>`).
    requests: Mutex<HashMap<String, oneshot::Sender<Message>>>,
    sid_counter: AtomicU64,
    inbox_prefix: String,
    old_request_style: AtomicBool,
    server_info: Mutex<ServerInfo>,
    mux_sid: Mutex<Option<u64>>,
    pong_waiters: Mutex<VecDeque<oneshot::Sender<()>>>,
}

/// A handle to a live connection. Cloning is cheap; all clones share the
/// same socket and subscription table.
#[derive(Clone)]
pub struct Connection {
    shared: Arc<Shared>,
}

impl Connection {
    pub(crate) async fn connect<S>(stream: S) -> Result<(Self, tokio::task::JoinHandle<()>), Error>
    where
        S: AsyncRead + AsyncWrite + Send + Unpin + 'static,
    {
        let (read_half, write_half) = tokio::io::split(stream);
        let mut reader = FramedRead::new(read_half, ProtocolCodec::default());
        let mut write_half: Box<dyn AsyncWrite + Send + Unpin> = Box::new(write_half);

        let info = match reader.next().await {
            Some(Ok(ServerOp::Info(info))) => *info,
            Some(Ok(_)) => return Err(Box::new(ProtocolError("expected INFO".into()))),
            Some(Err(e)) => return Err(Box::new(e)),
            None => return Err(Box::new(ProtocolError("connection closed before INFO".into()))),
        };

        write_raw(
            &mut write_half,
            ClientOp::Connect(ConnectInfo {
                verbose: false,
                pedantic: false,
                lang: "rust",
                version: env!("CARGO_PKG_VERSION"),
                protocol: 1,
                echo: true,
            }),
        )
        .await?;

        let shared = Arc::new(Shared {
            write: Mutex::new(write_half),
            subs: Mutex::new(HashMap::new()),
            requests: Mutex::new(HashMap::new()),
            sid_counter: AtomicU64::new(1),
            inbox_prefix: format!("{}.{}", INBOX_PREFIX, nuid::next()),
            old_request_style: AtomicBool::new(false),
            server_info: Mutex::new(info),
            mux_sid: Mutex::new(None),
            pong_waiters: Mutex::new(VecDeque::new()),
        });

        let dispatch_shared = shared.clone();
        let handle = tokio::spawn(async move {
            Self::read_loop(dispatch_shared, reader).await;
        });

        Ok((Connection { shared }, handle))
    }

    async fn read_loop<R>(shared: Arc<Shared>, mut reader: FramedRead<R, ProtocolCodec>)
    where
        R: AsyncRead + Unpin,
    {
        while let Some(frame) = reader.next().await {
            match frame {
                Ok(ServerOp::Msg {
                    subject,
                    sid,
                    reply,
                    payload,
                }) => {
                    let message = Message {
                        subject,
                        reply,
                        payload,
                    };
                    Self::dispatch(&shared, sid, message).await;
                }
                Ok(ServerOp::Ping) => {
                    let mut write = shared.write.lock().await;
                    let _ = write_raw(&mut *write, ClientOp::Pong).await;
                }
                Ok(ServerOp::Pong) => {
                    if let Some(waiter) = shared.pong_waiters.lock().await.pop_front() {
                        let _ = waiter.send(());
                    }
                }
                Ok(ServerOp::Ok) => {}
                Ok(ServerOp::Info(info)) => {
                    *shared.server_info.lock().await = *info;
                }
                Ok(ServerOp::Err(e)) => {
                    log::warn!("server error: {e}");
                }
                Err(e) => {
                    log::error!("protocol error, closing reader: {e}");
                    break;
                }
            }
        }
    }

    async fn dispatch(shared: &Arc<Shared>, sid: u64, message: Message) {
        let mux_sid = *shared.mux_sid.lock().await;
        if Some(sid) == mux_sid {
            let token = message
                .subject
                .rsplit('.')
                .next()
                .unwrap_or_default()
                .to_string();
            if let Some(tx) = shared.requests.lock().await.remove(&token) {
                let _ = tx.send(message);
                return;
            }
        }
        let subs = shared.subs.lock().await;
        if let Some(tx) = subs.get(&sid) {
            let _ = tx.send(message).await;
        }
    }

    pub fn new_inbox(&self) -> String {
        format!("{}.{}", self.shared.inbox_prefix, nuid::next())
    }

    pub fn use_old_request_style(&self) {
        self.shared.old_request_style.store(true, Ordering::SeqCst);
    }

    fn next_sid(&self) -> u64 {
        self.shared.sid_counter.fetch_add(1, Ordering::SeqCst)
    }

    pub async fn publish(&self, subject: impl Into<String>, payload: Bytes) -> Result<(), Error> {
        self.publish_with_reply_opt(subject, None, payload).await
    }

    pub async fn publish_with_reply(
        &self,
        subject: impl Into<String>,
        reply: impl Into<String>,
        payload: Bytes,
    ) -> Result<(), Error> {
        self.publish_with_reply_opt(subject, Some(reply.into()), payload)
            .await
    }

    async fn publish_with_reply_opt(
        &self,
        subject: impl Into<String>,
        reply: Option<String>,
        payload: Bytes,
    ) -> Result<(), Error> {
        let mut write = self.shared.write.lock().await;
        write_raw(
            &mut *write,
            ClientOp::Pub {
                subject: subject.into(),
                reply,
                payload,
            },
        )
        .await
    }

    pub async fn subscribe(
        &self,
        subject: impl Into<String>,
        queue: Option<String>,
    ) -> Result<Subscription, Error> {
        let sid = self.next_sid();
        let subject = subject.into();
        let (tx, rx) = mpsc::channel(256);
        self.shared.subs.lock().await.insert(sid, tx);
        let mut write = self.shared.write.lock().await;
        write_raw(
            &mut *write,
            ClientOp::Sub {
                subject: subject.clone(),
                queue,
                sid,
            },
        )
        .await?;
        drop(write);
        Ok(Subscription {
            sid,
            subject,
            receiver: rx,
            connection: self.clone(),
        })
    }

    pub(crate) async fn unsubscribe(&self, sid: u64) -> Result<(), Error> {
        self.shared.subs.lock().await.remove(&sid);
        let mut write = self.shared.write.lock().await;
        write_raw(&mut *write, ClientOp::Unsub { sid, max_msgs: None }).await
    }

    /// Ensures a shared inbox subscription exists for multiplexed requests.
    ///
    /// Replies land on `<inbox_prefix>.<token>`; [`Self::dispatch`] recognizes
    /// the subscription's sid and routes by token instead of handing the
    /// message to a per-sid channel, so no receiver is created here.
    async fn ensure_mux_subscription(&self) -> Result<(), Error> {
        let mut mux_sid = self.shared.mux_sid.lock().await;
        if mux_sid.is_some() {
            return Ok(());
        }
        let sid = self.next_sid();
        let subject = format!("{}.*", self.shared.inbox_prefix);
        let mut write = self.shared.write.lock().await;
        write_raw(&mut *write, ClientOp::Sub { subject, queue: None, sid }).await?;
        *mux_sid = Some(sid);
        Ok(())
    }

    /// Sends a request and waits up to `timeout` for a reply.
    ///
    /// Returns `Ok(None)` on timeout (no reply arrived in time), mirroring
    /// the external "request returns Message or null" contract.
    pub async fn request(
        &self,
        subject: impl Into<String>,
        payload: Bytes,
        timeout: Duration,
    ) -> Result<Option<Message>, Error> {
        let subject = subject.into();
        if self.shared.old_request_style.load(Ordering::SeqCst) {
            return self.request_old_style(subject, payload, timeout).await;
        }

        self.ensure_mux_subscription().await?;
        let token = nuid::next();
        let reply_subject = format!("{}.{}", self.shared.inbox_prefix, token);
        let (tx, rx) = oneshot::channel();
        self.shared.requests.lock().await.insert(token, tx);
        self.publish_with_reply(subject, reply_subject, payload)
            .await?;
        match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(message)) => Ok(Some(message)),
            Ok(Err(_)) => Ok(None),
            Err(_) => Ok(None),
        }
    }

    /// The pre-multiplexed request style: a fresh, one-shot subscription
    /// per request. Required when replies may race across distinct inboxes,
    /// as JetStream attach/pull flows do (see the context constructor).
    async fn request_old_style(
        &self,
        subject: String,
        payload: Bytes,
        timeout: Duration,
    ) -> Result<Option<Message>, Error> {
        let inbox = self.new_inbox();
        let mut sub = self.subscribe(inbox.clone(), None).await?;
        self.publish_with_reply(subject, inbox, payload).await?;
        let result = tokio::time::timeout(timeout, sub.receiver.recv()).await;
        let _ = sub.unsubscribe().await;
        match result {
            Ok(Some(message)) => Ok(Some(message)),
            Ok(None) => Ok(None),
            Err(_) => Ok(None),
        }
    }

    pub async fn flush(&self, timeout: Duration) -> Result<(), Error> {
        let (tx, rx) = oneshot::channel();
        self.shared.pong_waiters.lock().await.push_back(tx);
        {
            let mut write = self.shared.write.lock().await;
            write_raw(&mut *write, ClientOp::Ping).await?;
        }
        match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(())) => Ok(()),
            _ => Err(Box::new(ProtocolError("flush timed out waiting for PONG".into()))),
        }
    }

    /// Best-effort flush with no confirmation and no error propagation,
    /// used after enqueuing a pull request.
    pub async fn lenient_flush_buffer(&self) {
        let mut write = self.shared.write.lock().await;
        let _ = write_raw(&mut *write, ClientOp::Ping).await;
    }

    pub async fn server_info(&self) -> ServerInfo {
        self.shared.server_info.lock().await.clone()
    }
}

async fn write_raw<W>(write: &mut W, op: ClientOp) -> Result<(), Error>
where
    W: AsyncWrite + Send + Unpin + ?Sized,
{
    let mut codec = ProtocolCodec::default();
    let mut buf = BytesMut::new();
    {
        use tokio_util::codec::Encoder;
        codec
            .encode(op, &mut buf)
            .map_err(|e| Box::new(e) as Error)?;
    }
    use tokio::io::AsyncWriteExt;
    write.write_all(&buf).await.map_err(|e| Box::new(e) as Error)?;
    write.flush().await.map_err(|e| Box::new(e) as Error)?;
    Ok(())
}


/// A plain core subscription. JetStream layers a pull protocol and
/// auto-ack handling on top of this.
pub struct Subscription {
    pub(crate) sid: u64,
    pub subject: String,
    pub(crate) receiver: mpsc::Receiver<Message>,
    connection: Connection,
}

impl Subscription {
    pub async fn next_message(&mut self) -> Option<Message> {
        self.receiver.recv().await
    }

    pub async fn next_message_timeout(&mut self, timeout: Duration) -> Option<Message> {
        tokio::time::timeout(timeout, self.receiver.recv())
            .await
            .ok()
            .flatten()
    }

    pub async fn unsubscribe(&mut self) -> Result<(), Error> {
        self.connection.unsubscribe(self.sid).await
    }
}
