use std::path::PathBuf;
use std::sync::mpsc::{self, Sender};
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use color_eyre::eyre::eyre;
use color_eyre::Result;
use console_core::{
    decode_frame, encode_frame, frame_len, load_console_config, load_console_config_from_env,
    open_preferences, BridgeFrame, BridgeLink, ChannelBroker, Clock, Console, ConsoleConfig,
    HeadlessSurface, ManualClock, SystemClock,
};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver};
use tokio::sync::watch;
use tracing::{debug, info, trace, warn};

mod app;
mod replay;
mod ui;

use app::{InspectorApp, LinkEvent, LiveFeed};
use replay::ReplayFeed;

#[derive(Clone)]
struct ChannelWriter {
    sender: Sender<String>,
}

impl std::io::Write for ChannelWriter {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        if let Ok(text) = String::from_utf8(buf.to_vec()) {
            let _ = self.sender.send(text);
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

#[derive(Parser, Debug)]
#[command(author, version, about = "Sensor console inspector", long_about = None)]
struct Cli {
    /// Address of the broker bridge relaying retained topics.
    #[arg(long, default_value = "127.0.0.1:41883")]
    endpoint: String,
    /// Replay a JSON-lines capture instead of connecting.
    #[arg(long)]
    replay: Option<PathBuf>,
    /// Playback rate for `--replay`.
    #[arg(long, default_value_t = 1.0)]
    speed: f64,
    /// Console configuration file; `CONSOLE_CONFIG_PATH` is used when absent.
    #[arg(long)]
    config: Option<PathBuf>,
}

const RECONNECT_DELAY: Duration = Duration::from_secs(2);

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;

    let (log_tx, log_rx) = mpsc::channel::<String>();
    let log_writer_tx = log_tx.clone();
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .compact()
        .with_writer(move || ChannelWriter {
            sender: log_writer_tx.clone(),
        })
        .init();

    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => load_console_config(Some(path.as_path())),
        None => load_console_config_from_env(),
    };

    if let Some(path) = &cli.replay {
        let entries = replay::load_capture(path)?;
        info!(
            target: "sensor_console::inspector",
            path = %path.display(),
            messages = entries.len(),
            "replay.loaded"
        );
        let speed = cli.speed;
        let ui_handle = std::thread::spawn(move || -> Result<()> {
            let clock = Arc::new(ManualClock::new(0));
            let mut console = Console::new(
                config.clone(),
                console_core::LoopbackBroker::new(),
                HeadlessSurface::new(),
                open_preferences(&config),
                clock.clone() as Arc<dyn Clock>,
            );
            console.start();
            let feed = ReplayFeed::new(entries, clock, speed);
            InspectorApp::new(console, feed, log_rx)?.run()
        });
        return join_ui(ui_handle);
    }

    info!(
        target: "sensor_console::inspector",
        endpoint = %cli.endpoint,
        "bridge.connecting"
    );

    let (broker, link) = ChannelBroker::pair();
    let (event_tx, event_rx) = mpsc::channel::<LinkEvent>();
    let (shutdown_tx, mut shutdown_rx) = watch::channel(false);

    let ui_handle = std::thread::spawn(move || -> Result<()> {
        let result = run_live_ui(config, broker, event_rx, log_rx);
        let _ = shutdown_tx.send(true);
        result
    });

    let mut outbox = Outbox::new(forward_outbound(&link));

    loop {
        // a dropped sender means the UI thread is gone
        if *shutdown_rx.borrow() || shutdown_rx.has_changed().is_err() {
            info!(target: "sensor_console::inspector", "inspector.shutdown");
            break;
        }
        match TcpStream::connect(&cli.endpoint).await {
            Ok(stream) => {
                info!(
                    target: "sensor_console::inspector",
                    endpoint = %cli.endpoint,
                    "bridge.connected"
                );
                let _ = event_tx.send(LinkEvent::Connected);
                let result = pump_bridge(stream, &link, &mut outbox, &mut shutdown_rx).await;
                let _ = event_tx.send(LinkEvent::Disconnected);
                match result {
                    Ok(()) => break,
                    Err(err) => {
                        warn!(
                            target: "sensor_console::inspector",
                            error = %err,
                            "bridge.connection_lost"
                        );
                        wait_before_reconnect(&mut shutdown_rx).await;
                    }
                }
            }
            Err(err) => {
                warn!(
                    target: "sensor_console::inspector",
                    endpoint = %cli.endpoint,
                    error = %err,
                    "bridge.connect_failed"
                );
                wait_before_reconnect(&mut shutdown_rx).await;
            }
        }
    }

    join_ui(ui_handle)
}

fn run_live_ui(
    config: Arc<ConsoleConfig>,
    broker: ChannelBroker,
    events: mpsc::Receiver<LinkEvent>,
    log_rx: mpsc::Receiver<String>,
) -> Result<()> {
    let mut console = Console::new(
        config.clone(),
        broker,
        HeadlessSurface::new(),
        open_preferences(&config),
        Arc::new(SystemClock),
    );
    console.start();
    InspectorApp::new(console, LiveFeed::new(events), log_rx)?.run()
}

fn join_ui(handle: std::thread::JoinHandle<Result<()>>) -> Result<()> {
    match handle.join() {
        Ok(result) => result,
        Err(_) => Err(eyre!("inspector UI thread panicked")),
    }
}

async fn wait_before_reconnect(shutdown: &mut watch::Receiver<bool>) {
    info!(target: "sensor_console::inspector", "bridge.reconnect_in=2s");
    tokio::select! {
        _ = tokio::time::sleep(RECONNECT_DELAY) => {}
        _ = shutdown.changed() => {}
    }
}

/// Move frames the console queues onto a tokio channel the bridge can await.
fn forward_outbound(link: &BridgeLink) -> UnboundedReceiver<BridgeFrame> {
    let (sender, receiver) = unbounded_channel();
    let frames = link.outbound.clone();
    std::thread::spawn(move || {
        for frame in frames.iter() {
            if sender.send(frame).is_err() {
                break;
            }
        }
    });
    receiver
}

/// Frames queued for the bridge. A frame whose write failed goes out first
/// on the next connection.
struct Outbox {
    unsent: Option<BridgeFrame>,
    frames: UnboundedReceiver<BridgeFrame>,
}

impl Outbox {
    fn new(frames: UnboundedReceiver<BridgeFrame>) -> Self {
        Self {
            unsent: None,
            frames,
        }
    }

    async fn next(&mut self) -> Option<BridgeFrame> {
        match self.unsent.take() {
            Some(frame) => Some(frame),
            None => self.frames.recv().await,
        }
    }

    fn requeue(&mut self, frame: BridgeFrame) {
        self.unsent = Some(frame);
    }
}

/// Relay frames both ways until the connection drops or the UI exits.
/// `Ok` means the session ended; `Err` means the link should be retried.
async fn pump_bridge(
    stream: TcpStream,
    link: &BridgeLink,
    outbox: &mut Outbox,
    shutdown: &mut watch::Receiver<bool>,
) -> Result<()> {
    let (reader, mut writer) = stream.into_split();
    let mut reader_task = tokio::spawn(read_frames(reader, link.clone()));

    let result = loop {
        tokio::select! {
            joined = &mut reader_task => {
                break match joined {
                    Ok(result) => result,
                    Err(err) => Err(err.into()),
                };
            }
            frame = outbox.next() => {
                let Some(frame) = frame else {
                    break Ok(());
                };
                if let Err(err) = write_frame(&mut writer, &frame).await {
                    outbox.requeue(frame);
                    break Err(err);
                }
            }
            _ = shutdown.changed() => break Ok(()),
        }
    };

    reader_task.abort();
    result
}

async fn write_frame(writer: &mut OwnedWriteHalf, frame: &BridgeFrame) -> Result<()> {
    let bytes = encode_frame(frame)?;
    writer.write_all(&bytes).await?;
    trace!(
        target: "sensor_console::inspector",
        bytes = bytes.len(),
        "bridge.sent"
    );
    Ok(())
}

async fn read_frames(mut reader: OwnedReadHalf, link: BridgeLink) -> Result<()> {
    let mut len_buf = [0u8; 4];
    loop {
        reader.read_exact(&mut len_buf).await?;
        let len = frame_len(len_buf)?;
        let mut body = vec![0u8; len];
        reader.read_exact(&mut body).await?;
        match decode_frame(&body)? {
            frame @ BridgeFrame::Message { .. } => {
                if !link.deliver(frame) {
                    return Ok(());
                }
            }
            other => debug!(
                target: "sensor_console::inspector",
                frame = ?other,
                "bridge.ignored"
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn requeued_frame_is_sent_before_newer_ones() {
        let (sender, receiver) = unbounded_channel();
        let mut outbox = Outbox::new(receiver);
        sender
            .send(BridgeFrame::Subscribe {
                filter: "SelectedChain".into(),
            })
            .unwrap();
        let failed = BridgeFrame::Subscribe {
            filter: "AvailableChains".into(),
        };
        outbox.requeue(failed.clone());

        assert_eq!(outbox.next().await, Some(failed));
        assert_eq!(
            outbox.next().await,
            Some(BridgeFrame::Subscribe {
                filter: "SelectedChain".into(),
            })
        );
        drop(sender);
        assert_eq!(outbox.next().await, None);
    }
}
