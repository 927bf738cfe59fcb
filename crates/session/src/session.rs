//! The per-venue session driver.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::Notify;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, error, info, warn};

use kimp_codec::{binance, bithumb, mexc, upbit, VenueMessage};
use kimp_core::{Error, OrderBook, Result, Ticker, Venue};
use kimp_primitives::{ObjectPool, SpscQueue};

use crate::backoff::ReconnectBackoff;
use crate::event::SessionEvent;
use crate::subscribe;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Consecutive decode failures tolerated before the connection is torn
/// down and rebuilt. Isolated bad frames are logged and dropped.
const MAX_CONSECUTIVE_PARSE_ERRORS: u64 = 3;

/// Which streams a session subscribes.
#[derive(Debug, Clone, Copy)]
pub struct StreamFlags {
    pub ticker: bool,
    pub book: bool,
    pub trade: bool,
}

impl Default for StreamFlags {
    fn default() -> Self {
        Self {
            ticker: true,
            book: true,
            trade: false,
        }
    }
}

/// Static session parameters.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub venue: Venue,
    /// Base WebSocket URL, e.g. `wss://api.upbit.com/websocket/v1`.
    pub url: String,
    /// Venue-specific market codes to subscribe.
    pub codes: Vec<String>,
    pub streams: StreamFlags,
    pub book_depth: usize,
    pub queue_capacity: usize,
    pub pool_capacity: usize,
}

impl SessionConfig {
    #[must_use]
    pub fn new(venue: Venue, url: impl Into<String>, codes: Vec<String>) -> Self {
        Self {
            venue,
            url: url.into(),
            codes,
            streams: StreamFlags::default(),
            book_depth: 20,
            queue_capacity: 4096,
            pool_capacity: 4096,
        }
    }

    /// Venue heartbeat cadence. `None` means the venue needs no
    /// client-initiated ping (Binance pings us instead).
    #[must_use]
    pub fn ping_interval(&self) -> Option<Duration> {
        match self.venue {
            Venue::UpbitKrw => Some(Duration::from_secs(30)),
            Venue::BithumbKrw => Some(Duration::from_secs(10)),
            Venue::BinanceUsdt => None,
            Venue::MexcUsdt => Some(Duration::from_secs(20)),
        }
    }
}

/// Session lifecycle state, for observability.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum SessionState {
    Idle = 0,
    /// Resolve + TCP + TLS (SNI from the URL host) + WebSocket upgrade.
    Connecting = 1,
    Subscribing = 2,
    Streaming = 3,
    BackoffWaiting = 4,
    Stopped = 5,
}

impl SessionState {
    fn from_u8(v: u8) -> Self {
        match v {
            1 => SessionState::Connecting,
            2 => SessionState::Subscribing,
            3 => SessionState::Streaming,
            4 => SessionState::BackoffWaiting,
            5 => SessionState::Stopped,
            _ => SessionState::Idle,
        }
    }
}

/// Monotone session counters.
#[derive(Debug, Default)]
pub struct SessionStats {
    pub messages_received: AtomicU64,
    pub bytes_received: AtomicU64,
    pub reconnects: AtomicU64,
    pub dropped_events: AtomicU64,
    pub parse_errors: AtomicU64,
}

type EventCallback = Box<dyn Fn(&SessionEvent) + Send + Sync>;

/// One venue's streaming session.
///
/// Create, optionally attach a callback, wrap in an [`Arc`], and
/// [`spawn`](Self::spawn) onto the reactor runtime. The consumer drains
/// [`events`](Self::events); if a callback is attached, events are
/// delivered synchronously on the reactor task and never enqueued.
pub struct VenueSession {
    config: SessionConfig,
    queue: SpscQueue<SessionEvent>,
    ticker_pool: ObjectPool<Ticker>,
    book_pool: ObjectPool<OrderBook>,
    callback: Option<EventCallback>,
    state: AtomicU8,
    reconnect: AtomicBool,
    shutdown: Notify,
    stats: SessionStats,
}

impl VenueSession {
    #[must_use]
    pub fn new(config: SessionConfig) -> Self {
        let queue = SpscQueue::new(config.queue_capacity);
        let ticker_pool = ObjectPool::new(config.pool_capacity);
        let book_pool = ObjectPool::new(config.pool_capacity);
        Self {
            config,
            queue,
            ticker_pool,
            book_pool,
            callback: None,
            state: AtomicU8::new(SessionState::Idle as u8),
            reconnect: AtomicBool::new(true),
            shutdown: Notify::new(),
            stats: SessionStats::default(),
        }
    }

    /// Delivers events synchronously instead of enqueuing them.
    #[must_use]
    pub fn with_callback(mut self, cb: impl Fn(&SessionEvent) + Send + Sync + 'static) -> Self {
        self.callback = Some(Box::new(cb));
        self
    }

    #[must_use]
    pub fn venue(&self) -> Venue {
        self.config.venue
    }

    /// The session's output queue.
    #[must_use]
    pub fn events(&self) -> &SpscQueue<SessionEvent> {
        &self.queue
    }

    #[must_use]
    pub fn state(&self) -> SessionState {
        SessionState::from_u8(self.state.load(Ordering::Acquire))
    }

    #[must_use]
    pub fn stats(&self) -> &SessionStats {
        &self.stats
    }

    /// Stops the session permanently: pending timers are cancelled and the
    /// reconnect loop exits.
    pub fn disconnect(&self) {
        self.reconnect.store(false, Ordering::Release);
        self.shutdown.notify_waiters();
    }

    /// Spawns the session loop onto the current runtime.
    pub fn spawn(self: &Arc<Self>) -> tokio::task::JoinHandle<()> {
        let session = Arc::clone(self);
        tokio::spawn(async move { session.run().await })
    }

    /// Connect/stream/reconnect loop; returns when disconnected or on a
    /// non-recoverable failure.
    pub async fn run(self: Arc<Self>) {
        let mut backoff = ReconnectBackoff::new();
        while self.reconnect.load(Ordering::Acquire) {
            self.set_state(SessionState::Connecting);
            match self.run_once(&mut backoff).await {
                Ok(()) => break,
                Err(err @ (Error::AuthenticationFailed(_) | Error::Config(_))) => {
                    error!(venue = %self.config.venue, %err, "session failed permanently");
                    self.emit(SessionEvent::Error(err.to_string()));
                    break;
                }
                Err(err) => {
                    self.emit(SessionEvent::Error(err.to_string()));
                    self.stats.reconnects.fetch_add(1, Ordering::Relaxed);
                    let delay = backoff.next_delay();
                    warn!(
                        venue = %self.config.venue,
                        %err,
                        failures = backoff.failures(),
                        delay_s = delay.as_secs(),
                        "session lost, backing off"
                    );
                    self.set_state(SessionState::BackoffWaiting);
                    tokio::select! {
                        () = tokio::time::sleep(delay) => {}
                        () = self.shutdown.notified() => {}
                    }
                }
            }
        }
        self.set_state(SessionState::Stopped);
        self.emit(SessionEvent::Disconnected);
    }

    async fn run_once(&self, backoff: &mut ReconnectBackoff) -> Result<()> {
        let url = self.target_url();
        let (mut ws, _response) = connect_async(&url)
            .await
            .map_err(|e| Error::network(e.to_string()))?;
        info!(venue = %self.config.venue, %url, "connected");
        self.emit(SessionEvent::Connected);
        self.set_state(SessionState::Subscribing);

        // Venue-specific subscribe. MEXC wants one envelope per stream,
        // sent sequentially as acks come back.
        let mut pending = self.subscribe(&mut ws).await?;

        let ping_period = self.config.ping_interval();
        let mut ping = tokio::time::interval_at(
            tokio::time::Instant::now() + ping_period.unwrap_or(Duration::from_secs(3600)),
            ping_period.unwrap_or(Duration::from_secs(3600)),
        );

        let mut streaming = false;
        let mut consecutive_parse_errors = 0u64;

        loop {
            tokio::select! {
                () = self.shutdown.notified() => {
                    let _ = ws.close(None).await;
                    return Ok(());
                }
                _ = ping.tick() => {
                    if ping_period.is_some() {
                        let msg = if self.config.venue == Venue::MexcUsdt {
                            Message::Text(subscribe::MEXC_PING.to_string())
                        } else {
                            Message::Ping(Vec::new())
                        };
                        ws.send(msg)
                            .await
                            .map_err(|e| Error::network(e.to_string()))?;
                    }
                }
                frame = ws.next() => {
                    let msg = match frame {
                        Some(Ok(msg)) => msg,
                        Some(Err(e)) => return Err(Error::network(e.to_string())),
                        None => return Err(Error::ConnectionClosed),
                    };
                    self.stats.messages_received.fetch_add(1, Ordering::Relaxed);
                    self.stats
                        .bytes_received
                        .fetch_add(msg.len() as u64, Ordering::Relaxed);

                    match msg {
                        Message::Ping(payload) => {
                            ws.send(Message::Pong(payload))
                                .await
                                .map_err(|e| Error::network(e.to_string()))?;
                        }
                        Message::Pong(_) => {}
                        Message::Close(_) => return Err(Error::ConnectionClosed),
                        other => match self.decode(&other) {
                            Ok(msgs) => {
                                consecutive_parse_errors = 0;
                                self.handle_messages(msgs, &mut ws, &mut pending, &mut streaming, backoff)
                                    .await?;
                            }
                            Err(err) => {
                                self.stats.parse_errors.fetch_add(1, Ordering::Relaxed);
                                consecutive_parse_errors += 1;
                                warn!(venue = %self.config.venue, %err, "dropping undecodable frame");
                                if consecutive_parse_errors >= MAX_CONSECUTIVE_PARSE_ERRORS {
                                    return Err(err);
                                }
                            }
                        },
                    }
                }
            }
        }
    }

    /// Sends the venue's subscribe payload(s); returns MEXC envelopes still
    /// waiting for their predecessor's ack.
    async fn subscribe(&self, ws: &mut WsStream) -> Result<VecDeque<String>> {
        let flags = self.config.streams;
        let codes = &self.config.codes;
        match self.config.venue {
            Venue::UpbitKrw => {
                let ticket = uuid::Uuid::new_v4().to_string();
                let ticker = if flags.ticker { codes.clone() } else { Vec::new() };
                let book = if flags.book { codes.clone() } else { Vec::new() };
                let trade = if flags.trade { codes.clone() } else { Vec::new() };
                let payload = subscribe::upbit(&ticket, &ticker, &book, &trade);
                ws.send(Message::Text(payload))
                    .await
                    .map_err(|e| Error::network(e.to_string()))?;
                Ok(VecDeque::new())
            }
            Venue::BithumbKrw => {
                // v2 takes one stream per connection; most specific wins.
                let stream = if flags.trade {
                    "trade"
                } else if flags.ticker {
                    "ticker"
                } else {
                    "orderbook"
                };
                let payload = subscribe::bithumb("kimp", stream, codes);
                ws.send(Message::Text(payload))
                    .await
                    .map_err(|e| Error::network(e.to_string()))?;
                Ok(VecDeque::new())
            }
            // Subscriptions ride in the URL target.
            Venue::BinanceUsdt => Ok(VecDeque::new()),
            Venue::MexcUsdt => {
                let mut envelopes: VecDeque<String> =
                    subscribe::mexc_envelopes(codes, self.config.book_depth).into();
                if let Some(first) = envelopes.pop_front() {
                    ws.send(Message::Text(first))
                        .await
                        .map_err(|e| Error::network(e.to_string()))?;
                }
                Ok(envelopes)
            }
        }
    }

    fn target_url(&self) -> String {
        if self.config.venue == Venue::BinanceUsdt {
            let base = self.config.url.trim_end_matches('/');
            let target = subscribe::binance_target(
                &self.config.codes,
                self.config.book_depth,
                self.config.streams.trade,
            );
            format!("{base}{target}")
        } else {
            self.config.url.clone()
        }
    }

    fn decode(&self, msg: &Message) -> Result<Vec<VenueMessage>> {
        match (self.config.venue, msg) {
            (Venue::MexcUsdt, Message::Text(text)) => mexc::decode_text(text),
            (Venue::MexcUsdt, Message::Binary(data)) => mexc::pb::decode_frame(data),
            (venue, Message::Text(text)) => Self::decode_json(venue, text),
            // Upbit delivers JSON in binary frames.
            (venue, Message::Binary(data)) => {
                let text = std::str::from_utf8(data)
                    .map_err(|_| Error::parse("non-utf8 text frame"))?;
                Self::decode_json(venue, text)
            }
            _ => Ok(vec![VenueMessage::Ignore]),
        }
    }

    fn decode_json(venue: Venue, text: &str) -> Result<Vec<VenueMessage>> {
        match venue {
            Venue::UpbitKrw => upbit::decode(text),
            Venue::BithumbKrw => bithumb::decode(text),
            Venue::BinanceUsdt => binance::decode(text),
            Venue::MexcUsdt => mexc::decode_text(text),
        }
    }

    async fn handle_messages(
        &self,
        msgs: Vec<VenueMessage>,
        ws: &mut WsStream,
        pending: &mut VecDeque<String>,
        streaming: &mut bool,
        backoff: &mut ReconnectBackoff,
    ) -> Result<()> {
        for msg in msgs {
            match msg {
                VenueMessage::Ticker(ticker) => {
                    self.mark_streaming(streaming, backoff);
                    self.emit(SessionEvent::Ticker(self.ticker_pool.create(ticker)));
                }
                VenueMessage::Book(book) => {
                    self.mark_streaming(streaming, backoff);
                    self.emit(SessionEvent::Book(self.book_pool.create(book)));
                }
                VenueMessage::Trade(trade) => {
                    self.mark_streaming(streaming, backoff);
                    self.emit(SessionEvent::Trade(trade));
                }
                VenueMessage::SubscribeAck { id } => {
                    debug!(venue = %self.config.venue, id, "subscription acknowledged");
                    self.mark_streaming(streaming, backoff);
                    if let Some(next) = pending.pop_front() {
                        ws.send(Message::Text(next))
                            .await
                            .map_err(|e| Error::network(e.to_string()))?;
                    }
                }
                VenueMessage::Pong | VenueMessage::Ignore => {}
            }
        }
        Ok(())
    }

    fn mark_streaming(&self, streaming: &mut bool, backoff: &mut ReconnectBackoff) {
        if !*streaming {
            *streaming = true;
            self.set_state(SessionState::Streaming);
            backoff.reset();
        }
    }

    fn set_state(&self, state: SessionState) {
        self.state.store(state as u8, Ordering::Release);
    }

    fn emit(&self, event: SessionEvent) {
        if let Some(cb) = &self.callback {
            cb(&event);
            return;
        }
        if self.queue.push(event).is_err() {
            // Degrade to stale data instead of blocking the reactor.
            self.stats.dropped_events.fetch_add(1, Ordering::Relaxed);
        }
    }
}
