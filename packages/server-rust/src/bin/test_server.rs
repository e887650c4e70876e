//! Test server: serves the packet dispatcher over length-delimited TCP frames.
//!
//! Frame body layout: `[group: i32 BE][cmd: i32 BE][payload bytes]`. Replies
//! use the same layout, addressed by the resolved outbound target or the
//! request's own `(group, cmd)`.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Result;
use bytes::{Buf, BufMut, Bytes, BytesMut};
use clap::Parser;
use futures_util::future::BoxFuture;
use futures_util::{FutureExt, SinkExt, StreamExt};
use packetmap_core::{
    OutboundMapping, OutboundTarget, PacketGroup, PacketMapping, PacketPayload, RouteKey,
};
use packetmap_server::dispatch::{
    build_dispatch_pipeline, DispatcherConfig, HandlerMethod, HandlerReturn, HeaderValue,
    MethodParameter, PacketClassifier, PacketController, PacketDispatcher, PacketRequester,
    PacketSender, RawPacket, ResponseOutcome, ResponseReceiver, PACKET_REQUESTER_HEADER,
};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_util::codec::{Framed, LengthDelimitedCodec};
use tokio_util::sync::CancellationToken;
use tower::ServiceExt;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

const FRAME_HEADER_LEN: usize = 8;

#[derive(Parser, Debug)]
#[command(name = "test-server")]
#[command(about = "Packet dispatch test server")]
#[command(version)]
struct Args {
    /// Address to bind
    #[arg(long, env = "PACKETMAP_HOST", default_value = "127.0.0.1")]
    host: String,

    /// Port to bind
    #[arg(long, env = "PACKETMAP_PORT", default_value_t = 7000)]
    port: u16,

    /// Per-packet dispatch timeout in milliseconds
    #[arg(long, env = "PACKETMAP_TIMEOUT_MS", default_value_t = 30_000)]
    timeout_ms: u64,

    /// In-flight dispatches before packets are shed
    #[arg(long, env = "PACKETMAP_MAX_CONCURRENT", default_value_t = 1000)]
    max_concurrent: u32,

    /// Emit logs as JSON
    #[arg(long, env = "PACKETMAP_JSON_LOGS")]
    json_logs: bool,
}

impl Args {
    fn dispatcher_config(&self) -> DispatcherConfig {
        DispatcherConfig {
            default_timeout_ms: self.timeout_ms,
            max_concurrent_dispatches: self.max_concurrent,
            ..DispatcherConfig::default()
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(args.json_logs);

    let config = args.dispatcher_config();
    let dispatcher = PacketDispatcher::builder().config(config.clone()).build();
    dispatcher.handlers().register(Arc::new(LoginController))?;

    let pipeline = build_dispatch_pipeline(dispatcher, &config);
    let classifier = Arc::new(PacketClassifier::new(Arc::new(config)));

    let addr: SocketAddr = format!("{}:{}", args.host, args.port).parse()?;
    let listener = TcpListener::bind(addr).await?;
    info!(%addr, "test server listening");

    let shutdown = CancellationToken::new();
    loop {
        tokio::select! {
            accepted = listener.accept() => {
                let (stream, peer) = accepted?;
                debug!(%peer, "connection accepted");
                let pipeline = pipeline.clone();
                let classifier = Arc::clone(&classifier);
                let token = shutdown.child_token();
                tokio::spawn(async move {
                    if let Err(err) = serve_connection(stream, pipeline, classifier, token).await {
                        warn!(%peer, error = %err, "connection closed with error");
                    }
                });
            }
            signal = tokio::signal::ctrl_c() => {
                signal?;
                info!("shutdown requested");
                shutdown.cancel();
                break;
            }
        }
    }
    Ok(())
}

fn init_logging(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    if json {
        tracing_subscriber::fmt().with_env_filter(filter).json().init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

// ---------------------------------------------------------------------------
// Connection handling
// ---------------------------------------------------------------------------

type Outbox = mpsc::UnboundedSender<(RouteKey, PacketPayload)>;

/// Pushes server-initiated packets into the connection's outbox.
struct OutboxSender(Outbox);

impl PacketSender for OutboxSender {
    fn send(
        &self,
        target: OutboundTarget,
        payload: PacketPayload,
    ) -> BoxFuture<'static, Result<()>> {
        let sent = self
            .0
            .send((RouteKey::new(target.group, target.cmd), payload))
            .map_err(|_| anyhow::anyhow!("connection closed"));
        async move { sent }.boxed()
    }
}

async fn serve_connection<S>(
    stream: TcpStream,
    pipeline: S,
    classifier: Arc<PacketClassifier>,
    cancel: CancellationToken,
) -> Result<()>
where
    S: tower::Service<
            packetmap_server::dispatch::InboundMessage,
            Response = packetmap_server::dispatch::Dispatched,
            Error = packetmap_server::dispatch::DispatchError,
        > + Clone
        + Send
        + 'static,
    S::Future: Send + 'static,
{
    let (mut sink, mut frames) = Framed::new(stream, LengthDelimitedCodec::new()).split();
    let (outbox, mut pending) = mpsc::unbounded_channel::<(RouteKey, PacketPayload)>();
    let requester = PacketRequester::new(Arc::new(OutboxSender(outbox.clone())));

    let writer = tokio::spawn(async move {
        while let Some((key, payload)) = pending.recv().await {
            sink.send(encode_frame(key, &payload)).await?;
        }
        anyhow::Ok(())
    });

    loop {
        let frame = tokio::select! {
            () = cancel.cancelled() => break,
            next = frames.next() => match next {
                Some(frame) => frame?,
                None => break,
            },
        };
        let Some((key, payload)) = decode_frame(frame.freeze()) else {
            warn!("dropping frame shorter than its header");
            continue;
        };

        let packet = RawPacket::to_destination(key, &payload)
            .with_header(PACKET_REQUESTER_HEADER, HeaderValue::any(requester.clone()))
            .with_cancellation(cancel.child_token());
        let (message, reply) = match classifier.classify(packet) {
            Ok(classified) => classified,
            Err(err) => {
                warn!(%key, error = %err, "unclassifiable packet");
                continue;
            }
        };

        let service = pipeline.clone();
        let outbox = outbox.clone();
        tokio::spawn(async move {
            if let Err(err) = service.oneshot(message).await {
                debug!(%key, error = %err, "dispatch failed");
            }
            forward_reply(key, reply, &outbox).await;
        });
    }

    cancel.cancel();
    drop(outbox);
    drop(requester);
    writer.await?
}

async fn forward_reply(request: RouteKey, reply: ResponseReceiver, outbox: &Outbox) {
    let call_id = reply.call_id();
    match reply.recv().await {
        Ok(ResponseOutcome::Content(mut packets)) => {
            while let Some(packet) = packets.next().await {
                match packet {
                    Ok(packet) => {
                        let key = packet.reply_key(request);
                        if outbox.send((key, packet.payload)).is_err() {
                            return;
                        }
                    }
                    Err(err) => {
                        warn!(call_id, error = %err, "reply stream failed");
                        return;
                    }
                }
            }
        }
        Ok(ResponseOutcome::NoContent) => {}
        Ok(ResponseOutcome::Failed(err)) => {
            warn!(call_id, %request, kind = err.kind(), error = %err, "packet failed");
        }
        Err(err) => warn!(call_id, error = %err, "reply lost"),
    }
}

fn encode_frame(key: RouteKey, payload: &PacketPayload) -> Bytes {
    let data = payload.data();
    let mut frame = BytesMut::with_capacity(FRAME_HEADER_LEN + data.len());
    frame.put_i32(key.group);
    frame.put_i32(key.cmd);
    frame.extend_from_slice(&data);
    frame.freeze()
}

fn decode_frame(mut frame: Bytes) -> Option<(RouteKey, PacketPayload)> {
    if frame.len() < FRAME_HEADER_LEN {
        return None;
    }
    let group = frame.get_i32();
    let cmd = frame.get_i32();
    Some((RouteKey::new(group, cmd), PacketPayload::from(frame)))
}

// ---------------------------------------------------------------------------
// Demo controller
// ---------------------------------------------------------------------------

/// Login group handlers: `1.1` echoes text, `1.2` greets through the
/// requester and replies on `2.1`.
struct LoginController;

impl PacketController for LoginController {
    fn name(&self) -> &'static str {
        "login"
    }

    fn mapping(&self) -> Option<PacketMapping> {
        Some(
            PacketMapping::inbound_group(PacketGroup::LOGIN)
                .with_outbound(OutboundMapping::group(PacketGroup::ROLE)),
        )
    }

    fn handler_methods(self: Arc<Self>) -> Vec<HandlerMethod> {
        vec![
            HandlerMethod::new("echo", |mut args| async move {
                let body: String = args.take(0)?;
                Ok(HandlerReturn::value(format!("{body}::response")))
            })
            .with_mapping(PacketMapping::inbound_cmd(1))
            .with_param(MethodParameter::payload::<String>("body")),
            HandlerMethod::new("hello", |mut args| async move {
                let requester: PacketRequester = args.take(0)?;
                let name: String = args.take(1)?;
                requester
                    .send(PacketGroup::FRIEND, 1, format!("{name} is online"))
                    .await?;
                Ok(HandlerReturn::value(format!("welcome {name}")))
            })
            .with_mapping(
                PacketMapping::inbound_cmd(2)
                    .with_outbound(OutboundMapping::default().target::<String>(0, 1)),
            )
            .with_param(MethodParameter::of::<PacketRequester>("requester"))
            .with_param(MethodParameter::payload::<String>("name")),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frames_carry_route_key_and_body() {
        let frame = encode_frame(RouteKey::new(1, 2), &PacketPayload::from_text("hi"));
        assert_eq!(frame.len(), FRAME_HEADER_LEN + 2);
        let (key, payload) = decode_frame(frame).unwrap();
        assert_eq!(key, RouteKey::new(1, 2));
        assert_eq!(payload.data_utf8().unwrap(), "hi");
    }

    #[test]
    fn short_frames_are_rejected() {
        assert!(decode_frame(Bytes::from_static(&[0, 0, 0, 1])).is_none());
    }

    #[test]
    fn cli_flags_map_onto_config() {
        let args = Args::parse_from([
            "test-server",
            "--timeout-ms",
            "500",
            "--max-concurrent",
            "4",
        ]);
        let config = args.dispatcher_config();
        assert_eq!(config.default_timeout_ms, 500);
        assert_eq!(config.max_concurrent_dispatches, 4);
    }

    struct StalledController;

    impl PacketController for StalledController {
        fn name(&self) -> &'static str {
            "stalled"
        }

        fn handler_methods(self: Arc<Self>) -> Vec<HandlerMethod> {
            vec![HandlerMethod::new("wait", |_| async {
                std::future::pending::<()>().await;
                Ok(HandlerReturn::Empty)
            })
            .with_mapping(PacketMapping::inbound_pattern("1.9").unwrap())]
        }
    }

    #[tokio::test]
    async fn peer_close_cancels_in_flight_dispatches() {
        let config = DispatcherConfig::default();
        let dispatcher = PacketDispatcher::builder().config(config.clone()).build();
        dispatcher.handlers().register(Arc::new(StalledController)).unwrap();
        let pipeline = build_dispatch_pipeline(dispatcher, &config);
        let classifier = Arc::new(PacketClassifier::new(Arc::new(config)));

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            serve_connection(stream, pipeline, classifier, CancellationToken::new()).await
        });

        let mut client = Framed::new(
            TcpStream::connect(addr).await.unwrap(),
            LengthDelimitedCodec::new(),
        );
        client
            .send(encode_frame(RouteKey::new(1, 9), &PacketPayload::from_text("x")))
            .await
            .unwrap();
        drop(client);

        let served = tokio::time::timeout(std::time::Duration::from_secs(5), server)
            .await
            .expect("connection should close once the peer leaves");
        served.unwrap().unwrap();
    }
}
