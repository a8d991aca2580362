//! WebSocket transport.
//!
//! Data travels as binary frames, diagnostics as text frames. Text frames
//! received from a peer are treated as data so older text-only clients keep
//! working.

use crate::domain::error::{RemoteUartError, RemoteUartResult};
use crate::infrastructure::transport::{Connection, FrameReceiver, FrameSender};
use async_trait::async_trait;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use std::net::SocketAddr;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tracing::debug;

pub struct WsSender<S> {
    sink: SplitSink<WebSocketStream<S>, Message>,
    closed: bool,
}

pub struct WsReceiver<S> {
    stream: SplitStream<WebSocketStream<S>>,
    finished: bool,
}

#[async_trait]
impl<S> FrameSender for WsSender<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    async fn send(&mut self, data: Vec<u8>) -> RemoteUartResult<()> {
        if self.closed {
            return Err(RemoteUartError::ConnectionClosed);
        }
        self.sink.send(Message::Binary(data)).await.map_err(map_ws_error)
    }

    async fn send_diagnostic(&mut self, text: &str) -> RemoteUartResult<()> {
        if self.closed {
            return Err(RemoteUartError::ConnectionClosed);
        }
        self.sink
            .send(Message::Text(text.to_string()))
            .await
            .map_err(map_ws_error)
    }

    async fn close(&mut self) -> RemoteUartResult<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        match self.sink.close().await {
            Ok(()) => Ok(()),
            Err(WsError::ConnectionClosed) | Err(WsError::AlreadyClosed) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

#[async_trait]
impl<S> FrameReceiver for WsReceiver<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    async fn recv(&mut self) -> Option<RemoteUartResult<Vec<u8>>> {
        if self.finished {
            return None;
        }
        loop {
            match self.stream.next().await {
                Some(Ok(Message::Binary(data))) => return Some(Ok(data)),
                Some(Ok(Message::Text(text))) => return Some(Ok(text.into_bytes())),
                Some(Ok(Message::Close(frame))) => {
                    debug!("WebSocket close frame received: {:?}", frame);
                    self.finished = true;
                    return None;
                }
                // Pings are answered by tungstenite itself.
                Some(Ok(_)) => continue,
                Some(Err(WsError::ConnectionClosed)) | Some(Err(WsError::AlreadyClosed)) | None => {
                    self.finished = true;
                    return None;
                }
                Some(Err(e)) => {
                    self.finished = true;
                    return Some(Err(e.into()));
                }
            }
        }
    }
}

fn map_ws_error(error: WsError) -> RemoteUartError {
    match error {
        WsError::ConnectionClosed | WsError::AlreadyClosed => RemoteUartError::ConnectionClosed,
        other => RemoteUartError::WebSocket(other),
    }
}

/// Wrap an established WebSocket stream as a [`Connection`].
pub fn into_connection<S>(stream: WebSocketStream<S>, peer: Option<SocketAddr>) -> Connection
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let (sink, stream) = stream.split();
    Connection::new(
        Box::new(WsSender {
            sink,
            closed: false,
        }),
        Box::new(WsReceiver {
            stream,
            finished: false,
        }),
        peer,
    )
}

/// Complete the server side of the WebSocket handshake.
///
/// Returns the connection together with the request target
/// (path and query) the client asked for.
pub async fn accept(stream: TcpStream, peer: SocketAddr) -> RemoteUartResult<(Connection, String)> {
    let mut target = String::new();
    let callback = |request: &Request, response: Response| -> Result<Response, ErrorResponse> {
        target = request
            .uri()
            .path_and_query()
            .map(|pq| pq.as_str().to_string())
            .unwrap_or_else(|| request.uri().path().to_string());
        Ok(response)
    };

    let ws_stream = tokio_tungstenite::accept_hdr_async(stream, callback).await?;
    Ok((into_connection(ws_stream, Some(peer)), target))
}

/// Open an outbound WebSocket connection.
pub async fn connect(url: &url::Url) -> RemoteUartResult<Connection> {
    let (ws_stream, _response) = tokio_tungstenite::connect_async(url.as_str()).await?;
    let peer = match ws_stream.get_ref() {
        MaybeTlsStream::Plain(tcp) => tcp.peer_addr().ok(),
        _ => None,
    };
    Ok(into_connection(ws_stream, peer))
}
