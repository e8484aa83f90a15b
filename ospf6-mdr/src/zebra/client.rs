//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

//! The Zebra client connection: a reconnecting Unix-stream socket carrying
//! the length-prefixed frames defined in [`super::messages`] (spec.md
//! §4.G).

use std::collections::BTreeSet;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use bytes::BytesMut;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::net::UnixStream;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tracing::{info, warn};

use super::messages::{Message, HEADER_SIZE};

const RECONNECT_INITIAL_BACKOFF: Duration = Duration::from_millis(500);
const RECONNECT_MAX_BACKOFF: Duration = Duration::from_secs(30);

/// A handle to the background task that owns the Zebra connection.
/// Outgoing messages are queued through [`Client::send`]; incoming ones
/// arrive on the receiver returned by [`Client::connect`].
#[derive(Debug)]
pub struct Client {
    outgoing: UnboundedSender<Message>,
    subscribed: Arc<Mutex<BTreeSet<u32>>>,
}

impl Client {
    /// Spawns the background connection task and returns a handle plus the
    /// channel on which decoded messages from Zebra will arrive.
    pub fn connect(path: PathBuf) -> (Client, UnboundedReceiver<Message>) {
        let (outgoing_tx, outgoing_rx) = mpsc::unbounded_channel();
        let (incoming_tx, incoming_rx) = mpsc::unbounded_channel();
        let subscribed = Arc::new(Mutex::new(BTreeSet::new()));

        tokio::spawn(run(path, outgoing_rx, incoming_tx, subscribed.clone()));

        (Client { outgoing: outgoing_tx, subscribed }, incoming_rx)
    }

    /// Queues a message for delivery to Zebra. Dropped silently if the
    /// background task has already exited (e.g. during shutdown).
    pub fn send(&self, msg: Message) {
        if self.outgoing.send(msg).is_err() {
            warn!("zebra client task is gone, dropping outgoing message");
        }
    }

    /// Subscribes to link-metrics updates for `ifindex`. The subscription
    /// is remembered and replayed automatically after a reconnect.
    pub fn subscribe_link_metrics(&self, ifindex: u32) {
        self.subscribed.lock().unwrap().insert(ifindex);
        self.send(Message::LinkMetricsSubscribe(ifindex));
    }

    pub fn unsubscribe_link_metrics(&self, ifindex: u32) {
        self.subscribed.lock().unwrap().remove(&ifindex);
        self.send(Message::LinkMetricsUnsubscribe(ifindex));
    }
}

async fn run(
    path: PathBuf,
    mut outgoing_rx: UnboundedReceiver<Message>,
    incoming_tx: UnboundedSender<Message>,
    subscribed: Arc<Mutex<BTreeSet<u32>>>,
) {
    let mut backoff = RECONNECT_INITIAL_BACKOFF;

    loop {
        let stream = match UnixStream::connect(&path).await {
            Ok(stream) => stream,
            Err(error) => {
                warn!(%error, path = %path.display(), "failed to connect to zebra, retrying");
                tokio::time::sleep(backoff).await;
                backoff = (backoff * 2).min(RECONNECT_MAX_BACKOFF);
                continue;
            }
        };
        info!(path = %path.display(), "connected to zebra");
        backoff = RECONNECT_INITIAL_BACKOFF;

        let (mut reader, mut writer) = stream.into_split();

        // Re-announce subscriptions lost across the previous disconnect.
        let to_replay: Vec<u32> =
            subscribed.lock().unwrap().iter().copied().collect();
        let mut reconnect_failed = false;
        for ifindex in to_replay {
            let frame = Message::LinkMetricsSubscribe(ifindex).encode();
            if writer.write_all(&frame).await.is_err() {
                reconnect_failed = true;
                break;
            }
        }
        if reconnect_failed {
            continue;
        }

        let mut read_buf = BytesMut::new();
        loop {
            tokio::select! {
                msg = outgoing_rx.recv() => {
                    match msg {
                        Some(msg) => {
                            let frame = msg.encode();
                            if let Err(error) = writer.write_all(&frame).await {
                                warn!(%error, "zebra write failed, reconnecting");
                                break;
                            }
                        }
                        None => return,
                    }
                }
                result = read_frame(&mut reader, &mut read_buf) => {
                    match result {
                        Ok(FrameResult::Message(msg)) => {
                            if incoming_tx.send(msg).is_err() {
                                return;
                            }
                        }
                        Ok(FrameResult::Eof) => {
                            warn!("zebra closed the connection, reconnecting");
                            break;
                        }
                        Ok(FrameResult::Dropped) => {
                            // A malformed single frame does not warrant
                            // tearing down the connection; keep reading.
                        }
                        Err(error) => {
                            warn!(%error, "zebra read failed, reconnecting");
                            break;
                        }
                    }
                }
            }
        }
    }
}

/// Outcome of reading one length-prefixed frame: a decoded message, a
/// clean EOF, or a single malformed frame that was dropped without
/// disturbing the connection.
enum FrameResult {
    Message(Message),
    Eof,
    Dropped,
}

/// Reads one length-prefixed frame off `reader`, buffering partial reads.
/// A length field shorter than the header or a frame that fails to decode
/// is logged and dropped as [`FrameResult::Dropped`] rather than treated
/// as a connection-level error: a single corrupt frame from Zebra does
/// not mean the stream itself is broken.
async fn read_frame(
    reader: &mut (impl AsyncRead + Unpin),
    buf: &mut BytesMut,
) -> std::io::Result<FrameResult> {
    loop {
        if buf.len() >= 2 {
            let len = u16::from_be_bytes([buf[0], buf[1]]) as usize;
            if len < HEADER_SIZE {
                warn!(len, "zebra frame shorter than its own header, dropping");
                buf.clear();
                return Ok(FrameResult::Dropped);
            }
            if buf.len() >= len {
                let frame = buf.split_to(len).freeze();
                return match Message::decode(frame) {
                    Ok(msg) => Ok(FrameResult::Message(msg)),
                    Err(error) => {
                        warn!(%error, "failed to decode zebra frame, dropping");
                        Ok(FrameResult::Dropped)
                    }
                };
            }
        }

        let mut tmp = [0u8; 4096];
        let n = reader.read(&mut tmp).await?;
        if n == 0 {
            return Ok(FrameResult::Eof);
        }
        buf.extend_from_slice(&tmp[..n]);
    }
}
