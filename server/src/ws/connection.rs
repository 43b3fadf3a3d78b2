//! Transport seam between the session runtime and the underlying socket.
//!
//! A connection is split once at registration: the write half is shared by the
//! delivery loop and the liveness probe, the read half belongs to the inbound
//! drain.

use std::fmt::Display;
use std::future::Future;
use axum::extract::ws::{close_code, CloseFrame, Message, Utf8Bytes, WebSocket};
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};

/// An encoded event. Clones share one reference-counted buffer, so a frame
/// serialized once can sit in every target session's queue.
pub type Frame = Utf8Bytes;

/// What the inbound drain observed on the read half.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundFrame {
    /// Ping or pong, answered by the transport itself.
    Control,
    /// Application payload. The push channel never accepts any.
    Data,
    /// Peer-initiated close, with the close code if one was sent.
    Close(Option<u16>),
}

/// A freshly accepted connection that can be split into its two halves.
pub trait PushConnection: Send + 'static {
    type Sink: PushSink;
    type Stream: PushStream;

    fn split(self) -> (Self::Sink, Self::Stream);
}

/// Write half: event frames, pings and the final close.
pub trait PushSink: Send + 'static {
    type Error: Display + Send;

    fn send_text(&mut self, frame: Frame) -> impl Future<Output = Result<(), Self::Error>> + Send;

    fn send_ping(&mut self) -> impl Future<Output = Result<(), Self::Error>> + Send;

    fn close(&mut self) -> impl Future<Output = Result<(), Self::Error>> + Send;
}

/// Read half, consumed only for control frames.
pub trait PushStream: Send + 'static {
    type Error: Display + Send;

    /// Next frame, or `None` once the stream has ended.
    fn next_frame(&mut self) -> impl Future<Output = Option<Result<InboundFrame, Self::Error>>> + Send;
}

impl PushConnection for WebSocket {
    type Sink = SplitSink<WebSocket, Message>;
    type Stream = SplitStream<WebSocket>;

    fn split(self) -> (Self::Sink, Self::Stream) {
        StreamExt::split(self)
    }
}

impl PushSink for SplitSink<WebSocket, Message> {
    type Error = axum::Error;

    async fn send_text(&mut self, frame: Frame) -> Result<(), Self::Error> {
        self.send(Message::Text(frame)).await
    }

    async fn send_ping(&mut self) -> Result<(), Self::Error> {
        self.send(Message::Ping(Vec::new().into())).await
    }

    async fn close(&mut self) -> Result<(), Self::Error> {
        let frame = CloseFrame {
            code: close_code::NORMAL,
            reason: "bye".into(),
        };
        self.send(Message::Close(Some(frame))).await?;
        SinkExt::close(self).await
    }
}

impl PushStream for SplitStream<WebSocket> {
    type Error = axum::Error;

    async fn next_frame(&mut self) -> Option<Result<InboundFrame, Self::Error>> {
        let frame = match self.next().await? {
            Ok(Message::Ping(_)) | Ok(Message::Pong(_)) => Ok(InboundFrame::Control),
            Ok(Message::Text(_)) | Ok(Message::Binary(_)) => Ok(InboundFrame::Data),
            Ok(Message::Close(frame)) => Ok(InboundFrame::Close(frame.map(|f| f.code))),
            Err(e) => Err(e),
        };
        Some(frame)
    }
}
