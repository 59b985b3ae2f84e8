use std::cell::RefCell;
use std::rc::Rc;

use bytes::BytesMut;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::Notify;

use crate::http::accesslog::TracingAccessLog;
use crate::http::dispatcher::{Dispatcher, DispatcherSettings, Handler, Protocol};
use crate::http::request::ConnectionId;
use crate::http::writer::{Outbox, ResponseWriter};

const READ_CHUNK: usize = 4096;

/// Everything one worker thread shares between its connection tasks.
pub struct Worker<H: Handler> {
    pub dispatcher: Dispatcher,
    pub handler: H,
    pub outbox: Outbox,
    pub log: TracingAccessLog,
}

/// Workers are single-threaded; tasks share them through a `RefCell` and
/// never hold a borrow across an `.await`.
pub type SharedWorker<H> = Rc<RefCell<Worker<H>>>;

impl<H: Handler> Worker<H> {
    pub fn new(settings: DispatcherSettings, handler: H) -> Self {
        Self {
            dispatcher: Dispatcher::new(settings),
            handler,
            outbox: Outbox::new(),
            log: TracingAccessLog,
        }
    }

    pub fn shared(settings: DispatcherSettings, handler: H) -> SharedWorker<H> {
        Rc::new(RefCell::new(Self::new(settings, handler)))
    }

    /// One dispatcher pass over every request of this worker.
    pub fn pass(&mut self) -> usize {
        let Worker {
            dispatcher,
            handler,
            outbox,
            log,
        } = self;
        dispatcher.process(handler, outbox, log)
    }

    fn receive(&mut self, conn: ConnectionId, bytes: &[u8]) {
        let Worker {
            dispatcher,
            outbox,
            ..
        } = self;

        if let Err(e) = dispatcher.feed(conn, None, bytes, outbox) {
            tracing::debug!(conn = %conn, error = %e, "Input rejected");
        }
        self.pass();
    }

    /// Stops the worker: every request is freed.
    pub fn shutdown(&mut self) {
        let Worker {
            dispatcher,
            handler,
            log,
            ..
        } = self;
        dispatcher.drain(handler, log);
    }
}

pub enum ConnectionState {
    Reading,
    Writing(ResponseWriter),
    Closed,
}

/// Byte-stream connection feeding one worker's dispatcher.
pub struct Connection<S, H: Handler> {
    stream: S,
    worker: SharedWorker<H>,
    id: ConnectionId,
    waker: Rc<Notify>,
    state: ConnectionState,
}

impl<S, H> Connection<S, H>
where
    S: AsyncRead + AsyncWrite + Unpin,
    H: Handler,
{
    pub fn new(stream: S, worker: SharedWorker<H>) -> Self {
        let (id, waker) = {
            let mut w = worker.borrow_mut();
            let id = w.dispatcher.open_connection(Protocol::Http1);
            let waker = w.outbox.register(id);
            (id, waker)
        };

        Self {
            stream,
            worker,
            id,
            waker,
            state: ConnectionState::Reading,
        }
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub async fn run(&mut self) -> anyhow::Result<()> {
        let result = self.drive().await;
        if let Err(e) = self.stream.shutdown().await {
            tracing::trace!(conn = %self.id, error = %e, "Shutdown after close failed");
        }

        let mut w = self.worker.borrow_mut();
        w.dispatcher.close_connection(self.id);
        w.outbox.unregister(self.id);

        result
    }

    async fn drive(&mut self) -> anyhow::Result<()> {
        let mut chunk = vec![0u8; READ_CHUNK];

        loop {
            match &mut self.state {
                ConnectionState::Reading => {
                    // Either the peer sent bytes or a dispatcher pass queued output.
                    let read = tokio::select! {
                        res = self.stream.read(&mut chunk) => Some(res?),
                        _ = self.waker.notified() => None,
                    };

                    match read {
                        Some(0) => {
                            tracing::debug!(conn = %self.id, "Peer closed connection");
                            self.state = ConnectionState::Closed;
                            continue;
                        }
                        Some(n) => self.worker.borrow_mut().receive(self.id, &chunk[..n]),
                        None => {}
                    }

                    self.state = ConnectionState::Writing(ResponseWriter::new(self.take_output()));
                }

                ConnectionState::Writing(writer) => {
                    if !writer.is_empty() {
                        writer.write_to_stream(&mut self.stream).await?;
                    }

                    self.state = if self.worker.borrow().dispatcher.is_closing(self.id) {
                        ConnectionState::Closed
                    } else {
                        ConnectionState::Reading
                    };
                }

                ConnectionState::Closed => {
                    break;
                }
            }
        }

        Ok(())
    }

    fn take_output(&self) -> BytesMut {
        self.worker.borrow_mut().outbox.take(self.id)
    }
}
