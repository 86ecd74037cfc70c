//! Socket loop: connect, read lines into the session, write queued lines
//! with pacing, reconnect per the supervisor.

use std::{future::Future, io, time::Duration};

use {
    bytes::BytesMut,
    futures::StreamExt,
    tokio::{
        io::AsyncWriteExt,
        net::{TcpStream, tcp::OwnedWriteHalf},
        sync::{mpsc, watch},
        time,
    },
    tokio_util::{
        codec::{Decoder, FramedRead},
        sync::CancellationToken,
    },
    tracing::{debug, info, trace, warn},
    wicket_config::WicketConfig,
    wicket_plugs::{Kernel, KernelSettings, PlugCatalog},
    wicket_protocol::{Decoder as Charset, MAX_LINE_LEN},
};
#[cfg(feature = "metrics")]
use metrics::counter;

use crate::{
    error::ClientError,
    session::{Session, SessionConfig},
    supervisor::{Next, Supervisor},
};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// How long queued lines may take to flush once a connection ends.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

/// Longest inbound line accepted. Servers sometimes exceed 512 bytes, so
/// this is generous; longer lines are dropped whole.
const MAX_INBOUND_LEN: usize = 8 * MAX_LINE_LEN;

/// Reason given to the server when the process is interrupted.
const INTERRUPTED: &str = "Interrupted";

pub struct Client {
    address: String,
    send_interval: Duration,
    charset: Charset,
    session: Session,
    supervisor: Supervisor,
}

impl Client {
    pub fn new(config: &WicketConfig, catalog: PlugCatalog) -> Result<Self, ClientError> {
        let charset = Charset::for_label(&config.charset)?;
        let kernel = Kernel::new(catalog, KernelSettings {
            nickname: config.nickname.clone(),
            command_prefix: config.cmd_prefix.clone(),
            plug_settings: config.plugs.settings.clone(),
        });
        Ok(Self {
            address: config.address(),
            send_interval: config.send_interval(),
            charset,
            session: Session::new(kernel, SessionConfig::from(config)),
            supervisor: Supervisor::from_config(&config.reconnect),
        })
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    /// Connect and serve until a plug requests shutdown, `interrupt`
    /// resolves, or reconnect attempts run out.
    pub async fn run<F>(mut self, interrupt: F) -> Result<(), ClientError>
    where
        F: Future<Output = ()>,
    {
        let mut interrupt = std::pin::pin!(interrupt);
        loop {
            self.supervisor.connecting();
            info!(address = %self.address, charset = self.charset.name(), "connecting");
            #[cfg(feature = "metrics")]
            counter!("wicket_connect_attempts_total").increment(1);

            let next = match time::timeout(CONNECT_TIMEOUT, TcpStream::connect(&self.address)).await
            {
                Ok(Ok(stream)) => {
                    self.supervisor.connected();
                    match self.serve(stream, &mut interrupt).await {
                        Ok(()) => info!("connection closed"),
                        Err(e) => warn!(error = %e, "connection lost"),
                    }
                    let shutdown = self.session.shutdown_requested().is_some();
                    self.supervisor.disconnected(shutdown)
                },
                Ok(Err(e)) => {
                    warn!(address = %self.address, error = %e, "connect failed");
                    self.supervisor.connect_failed()
                },
                Err(_) => {
                    warn!(address = %self.address, "connect timed out");
                    self.supervisor.connect_failed()
                },
            };

            match next {
                Next::Exit => break,
                Next::Retry(delay) => {
                    info!(
                        delay_ms = delay.as_millis() as u64,
                        attempt = self.supervisor.retries(),
                        "reconnecting"
                    );
                    tokio::select! {
                        () = time::sleep(delay) => {},
                        () = &mut interrupt => {
                            info!("interrupted while waiting to reconnect");
                            return Ok(());
                        },
                    }
                },
            }
        }

        match self.session.shutdown_requested() {
            Some(reason) => {
                info!(reason, "shut down");
                Ok(())
            },
            None => Err(ClientError::RetriesExhausted {
                retries: self.supervisor.retries(),
            }),
        }
    }

    /// Drive one connection until it closes or a shutdown is requested.
    async fn serve<F>(&mut self, stream: TcpStream, interrupt: &mut F) -> io::Result<()>
    where
        F: Future<Output = ()> + Unpin,
    {
        let (read, write) = stream.into_split();
        let (tx, rx) = mpsc::unbounded_channel();
        let (pace_tx, pace_rx) = watch::channel(Duration::ZERO);
        let stop = CancellationToken::new();
        let mut writer = tokio::spawn(write_loop(write, rx, pace_rx, stop.clone()));

        self.session.connected(tx);
        let mut lines = FramedRead::new(read, LineCodec::new(MAX_INBOUND_LEN));
        let result = loop {
            let next = tokio::select! {
                next = lines.next() => next,
                () = &mut *interrupt => {
                    self.session.kernel_mut().request_shutdown(INTERRUPTED);
                    self.session.quit(INTERRUPTED);
                    break Ok(());
                },
            };
            match next {
                None => break Ok(()),
                Some(Ok(raw)) => {
                    let line = self.charset.decode(trim_eol(&raw));
                    #[cfg(feature = "metrics")]
                    counter!("wicket_lines_received_total").increment(1);
                    self.session.handle_line(&line);

                    if self.session.signed_on() && pace_tx.borrow().is_zero() {
                        pace_tx.send_replace(self.send_interval);
                    }
                    if let Some(reason) = self.session.shutdown_requested().map(str::to_owned) {
                        self.session.quit(&reason);
                        break Ok(());
                    }
                },
                Some(Err(e)) => break Err(e),
            }
        };

        // Flush what is queued without pacing, then close the channel. Plug
        // tasks holding an outbound clone cannot keep the writer alive.
        stop.cancel();
        self.session.disconnected();
        match time::timeout(DRAIN_TIMEOUT, &mut writer).await {
            Ok(Ok(Ok(()))) => {},
            Ok(Ok(Err(e))) => debug!(error = %e, "writer stopped"),
            Ok(Err(e)) => warn!(error = %e, "writer task failed"),
            Err(_) => {
                warn!(timeout_ms = DRAIN_TIMEOUT.as_millis() as u64, "writer did not drain, aborting");
                writer.abort();
            },
        }
        result
    }
}

/// Splits inbound bytes on `\n`, leaving charset decoding to the caller.
///
/// Lines longer than `max` are dropped whole, including the tail that
/// arrives after the buffer was discarded.
#[derive(Debug)]
struct LineCodec {
    max: usize,
    discarding: bool,
}

impl LineCodec {
    fn new(max: usize) -> Self {
        Self {
            max,
            discarding: false,
        }
    }
}

impl Decoder for LineCodec {
    type Error = io::Error;
    type Item = BytesMut;

    fn decode(&mut self, buf: &mut BytesMut) -> io::Result<Option<BytesMut>> {
        loop {
            let Some(end) = buf.iter().position(|b| *b == b'\n') else {
                if buf.len() > self.max {
                    warn!(len = buf.len(), "dropping overlong inbound line");
                    buf.clear();
                    self.discarding = true;
                }
                return Ok(None);
            };
            let mut line = buf.split_to(end + 1);
            line.truncate(end);
            if std::mem::take(&mut self.discarding) {
                continue;
            }
            if line.len() > self.max {
                warn!(len = line.len(), "dropping overlong inbound line");
                continue;
            }
            return Ok(Some(line));
        }
    }

    fn decode_eof(&mut self, buf: &mut BytesMut) -> io::Result<Option<BytesMut>> {
        if let Some(line) = self.decode(buf)? {
            return Ok(Some(line));
        }
        let rest = buf.split();
        if rest.is_empty() || std::mem::take(&mut self.discarding) {
            return Ok(None);
        }
        Ok(Some(rest))
    }
}

async fn write_loop(
    mut write: OwnedWriteHalf,
    mut rx: mpsc::UnboundedReceiver<String>,
    pace: watch::Receiver<Duration>,
    stop: CancellationToken,
) -> io::Result<()> {
    while let Some(line) = rx.recv().await {
        let line = fit_line(&line);
        trace!(line, "send");
        write.write_all(line.as_bytes()).await?;
        write.write_all(b"\r\n").await?;
        #[cfg(feature = "metrics")]
        counter!("wicket_lines_sent_total").increment(1);

        let interval = *pace.borrow();
        if !interval.is_zero() {
            tokio::select! {
                () = time::sleep(interval) => {},
                () = stop.cancelled() => {},
            }
        }
    }
    write.shutdown().await
}

fn trim_eol(buf: &[u8]) -> &[u8] {
    let buf = buf.strip_suffix(b"\n").unwrap_or(buf);
    buf.strip_suffix(b"\r").unwrap_or(buf)
}

/// Cut `line` so it fits on the wire with its CRLF, on a char boundary.
fn fit_line(line: &str) -> &str {
    let max = MAX_LINE_LEN - 2;
    if line.len() <= max {
        return line;
    }
    let mut cut = max;
    while !line.is_char_boundary(cut) {
        cut -= 1;
    }
    warn!(len = line.len(), "truncating overlong outbound line");
    &line[..cut]
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use {
        tokio::{
            io::{AsyncBufReadExt, AsyncWriteExt, BufReader},
            net::TcpListener,
        },
        wicket_config::ReconnectConfig,
        wicket_plugs::{Capabilities, Interests, Plug},
    };

    use super::*;

    /// Requests shutdown on `!quit`.
    struct Quitter;

    impl Plug for Quitter {
        fn name(&self) -> &str {
            "Quitter"
        }

        fn capabilities(&self) -> Capabilities {
            Capabilities::COMMAND
        }

        fn interests(&self) -> Interests {
            Interests::new().command("quit")
        }

        fn handle_command(
            &self,
            kernel: &mut Kernel,
            source: &str,
            _target: &str,
            _argv: &[String],
        ) -> anyhow::Result<()> {
            kernel.request_shutdown(format!("Requested by {source}"));
            Ok(())
        }
    }

    /// Spawns a task on load that keeps sending through an outbound clone
    /// until the clone goes dead.
    struct Ticker;

    impl Plug for Ticker {
        fn name(&self) -> &str {
            "Ticker"
        }

        fn capabilities(&self) -> Capabilities {
            Capabilities::ON_LOAD
        }

        fn interests(&self) -> Interests {
            Interests::new()
        }

        fn on_load(&self, kernel: &mut Kernel) -> anyhow::Result<()> {
            let out = kernel.outbound().clone();
            tokio::spawn(async move {
                while out.send("PING :tick") {
                    time::sleep(Duration::from_millis(10)).await;
                }
            });
            Ok(())
        }
    }

    fn catalog() -> PlugCatalog {
        let mut catalog = PlugCatalog::new();
        catalog.register("Quitter", |_| Ok(Arc::new(Quitter) as Arc<dyn Plug>));
        catalog.register("Ticker", |_| Ok(Arc::new(Ticker) as Arc<dyn Plug>));
        catalog
    }

    fn config(port: u16, max_retries: Option<u32>) -> WicketConfig {
        let mut config = WicketConfig {
            server: "127.0.0.1".into(),
            port,
            send_interval_ms: 0,
            channels: vec!["#room".into()],
            reconnect: ReconnectConfig {
                initial_delay_secs: 0,
                max_delay_secs: 0,
                max_retries,
            },
            ..Default::default()
        };
        config.plugs.autoload = vec!["Quitter".into()];
        config
    }

    /// Serve one client: expect registration, sign it on, ask it to quit and
    /// return every line it sent.
    async fn serve_quit(listener: &TcpListener) -> Vec<String> {
        let (stream, _) = listener.accept().await.unwrap();
        let (read, mut write) = stream.into_split();
        let mut lines = BufReader::new(read).lines();
        let mut seen = Vec::new();
        while let Some(line) = lines.next_line().await.unwrap() {
            let registered = line.starts_with("USER ");
            seen.push(line);
            if registered {
                break;
            }
        }
        write
            .write_all(b":irc.test 001 wicket :Welcome\r\n:alice!al@host PRIVMSG #room :!quit\r\n")
            .await
            .unwrap();
        while let Some(line) = lines.next_line().await.unwrap() {
            seen.push(line);
        }
        seen
    }

    #[tokio::test]
    async fn signs_on_and_quits_on_request() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let client = Client::new(&config(port, Some(0)), catalog()).unwrap();

        let (result, seen) = tokio::join!(
            client.run(std::future::pending()),
            serve_quit(&listener)
        );
        result.unwrap();
        assert_eq!(seen, vec![
            "NICK wicket",
            "USER wicket 0 * :wicket IRC bot",
            "JOIN #room",
            "QUIT :Requested by alice",
        ]);
    }

    #[tokio::test]
    async fn reconnects_after_drop() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let client = Client::new(&config(port, Some(3)), catalog()).unwrap();

        let server = async {
            let (first, _) = listener.accept().await.unwrap();
            drop(first);
            serve_quit(&listener).await
        };
        let (result, seen) = tokio::join!(client.run(std::future::pending()), server);
        result.unwrap();
        assert_eq!(seen.last().map(String::as_str), Some("QUIT :Requested by alice"));
    }

    #[tokio::test]
    async fn gives_up_when_nobody_listens() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let client = Client::new(&config(port, Some(2)), catalog()).unwrap();
        let err = client.run(std::future::pending()).await.unwrap_err();
        assert!(matches!(err, ClientError::RetriesExhausted { retries: 3 }));
    }

    #[tokio::test]
    async fn interrupt_sends_quit() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let client = Client::new(&config(port, None), catalog()).unwrap();
        let (tx, rx) = tokio::sync::oneshot::channel::<()>();

        let server = async {
            let mut tx = Some(tx);
            let (stream, _) = listener.accept().await.unwrap();
            let mut lines = BufReader::new(stream).lines();
            let mut seen = Vec::new();
            while let Some(line) = lines.next_line().await.unwrap() {
                if line.starts_with("USER ")
                    && let Some(tx) = tx.take()
                {
                    let _ = tx.send(());
                }
                seen.push(line);
            }
            seen
        };
        let interrupt = async {
            let _ = rx.await;
        };
        let (result, seen) = tokio::join!(client.run(interrupt), server);
        result.unwrap();
        assert_eq!(seen.last().map(String::as_str), Some("QUIT :Interrupted"));
    }

    #[tokio::test]
    async fn outbound_clone_in_a_task_does_not_stall_reconnect() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let mut config = config(port, Some(0));
        config.plugs.autoload = vec!["Ticker".into()];
        let client = Client::new(&config, catalog()).unwrap();

        let server = async {
            let (stream, _) = listener.accept().await.unwrap();
            let (read, mut write) = stream.into_split();
            let mut lines = BufReader::new(read).lines();
            while let Some(line) = lines.next_line().await.unwrap() {
                if line.starts_with("USER ") {
                    write.write_all(b":irc.test 001 wicket :Welcome\r\n").await.unwrap();
                }
                if line == "PING :tick" {
                    break;
                }
            }
        };
        let run = time::timeout(Duration::from_secs(5), client.run(std::future::pending()));
        let (result, ()) = tokio::join!(run, server);
        let result = result.expect("client hung after the connection dropped");
        assert!(matches!(result, Err(ClientError::RetriesExhausted { .. })));
    }

    #[tokio::test]
    async fn overlong_inbound_line_is_skipped() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let client = Client::new(&config(port, Some(0)), catalog()).unwrap();

        let server = async {
            let (stream, _) = listener.accept().await.unwrap();
            let (read, mut write) = stream.into_split();
            let mut lines = BufReader::new(read).lines();
            let mut seen = Vec::new();
            while let Some(line) = lines.next_line().await.unwrap() {
                let registered = line.starts_with("USER ");
                seen.push(line);
                if registered {
                    break;
                }
            }
            let flood = format!(":alice!al@host PRIVMSG #room :{}\r\n", "x".repeat(10_000));
            write.write_all(b":irc.test 001 wicket :Welcome\r\n").await.unwrap();
            write.write_all(flood.as_bytes()).await.unwrap();
            write
                .write_all(b":alice!al@host PRIVMSG #room :!quit\r\n")
                .await
                .unwrap();
            while let Some(line) = lines.next_line().await.unwrap() {
                seen.push(line);
            }
            seen
        };
        let (result, seen) = tokio::join!(client.run(std::future::pending()), server);
        result.unwrap();
        assert_eq!(seen.last().map(String::as_str), Some("QUIT :Requested by alice"));
    }

    fn decode_all(codec: &mut LineCodec, buf: &mut BytesMut) -> Vec<Vec<u8>> {
        let mut out = Vec::new();
        while let Some(line) = codec.decode(buf).unwrap() {
            out.push(line.to_vec());
        }
        out
    }

    #[test]
    fn codec_splits_lines() {
        let mut codec = LineCodec::new(64);
        let mut buf = BytesMut::from(&b"PING :a\r\nPING :b\nPIN"[..]);
        assert_eq!(decode_all(&mut codec, &mut buf), vec![
            b"PING :a\r".to_vec(),
            b"PING :b".to_vec(),
        ]);
        assert_eq!(&buf[..], b"PIN");
    }

    #[test]
    fn codec_drops_overlong_line_arriving_in_pieces() {
        let mut codec = LineCodec::new(16);
        let mut buf = BytesMut::from(&[b'x'; 40][..]);
        assert!(decode_all(&mut codec, &mut buf).is_empty());
        assert!(buf.is_empty());

        buf.extend_from_slice(b"tail of the flood\nPING :ok\n");
        assert_eq!(decode_all(&mut codec, &mut buf), vec![b"PING :ok".to_vec()]);
    }

    #[test]
    fn codec_drops_overlong_line_in_one_chunk() {
        let mut codec = LineCodec::new(16);
        let mut buf = BytesMut::new();
        buf.extend_from_slice(&[b'x'; 12]);
        buf.extend_from_slice(b"yyyyyyyyyy\nPING :ok\n");
        assert_eq!(decode_all(&mut codec, &mut buf), vec![b"PING :ok".to_vec()]);
    }

    #[test]
    fn codec_returns_unterminated_tail_at_eof() {
        let mut codec = LineCodec::new(64);
        let mut buf = BytesMut::from(&b"ERROR :bye"[..]);
        assert_eq!(codec.decode(&mut buf).unwrap(), None);
        let tail = codec.decode_eof(&mut buf).unwrap().unwrap();
        assert_eq!(&tail[..], b"ERROR :bye");
        assert_eq!(codec.decode_eof(&mut buf).unwrap(), None);
    }

    #[test]
    fn rejects_unknown_charset() {
        let config = WicketConfig {
            charset: "klingon-8".into(),
            ..Default::default()
        };
        assert!(matches!(
            Client::new(&config, PlugCatalog::new()),
            Err(ClientError::Charset(_))
        ));
    }

    #[test]
    fn trims_line_endings() {
        assert_eq!(trim_eol(b"PING :x\r\n"), b"PING :x");
        assert_eq!(trim_eol(b"PING :x\n"), b"PING :x");
        assert_eq!(trim_eol(b"PING :x"), b"PING :x");
    }

    #[test]
    fn overlong_lines_are_cut_on_char_boundary() {
        let line = format!("PRIVMSG #room :{}", "é".repeat(400));
        let fitted = fit_line(&line);
        assert!(fitted.len() <= MAX_LINE_LEN - 2);
        assert!(line.starts_with(fitted));
    }
}
