//! Entry point for `rdt-over-udp`.
//!
//! Moves one file between two hosts.  The receiver binds, listens and
//! accepts; the sender connects and transmits an 8-byte big-endian length
//! followed by the file contents.  `main.rs` owns only process setup
//! (logging, signal handling, argument parsing) and file I/O.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use clap::{Args, Parser, Subcommand};

use rdt_over_udp::{FaultConfig, Handle, Protocol, RdtConfig, RdtTable, PAYLOAD_LEN};

/// Reliable file transfer over UDP.
#[derive(Parser)]
#[command(author, version, about)]
struct Cli {
    #[command(flatten)]
    transport: TransportArgs,

    #[command(subcommand)]
    mode: Mode,
}

#[derive(Args)]
struct TransportArgs {
    /// Reliability protocol: stop-and-wait, selective-repeat or go-back-n.
    #[arg(long, global = true, default_value = "stop-and-wait")]
    protocol: Protocol,

    /// Retransmission timeout in milliseconds.
    #[arg(long, global = true, default_value_t = 1000)]
    timeout_ms: u64,

    /// Consecutive retransmissions allowed without progress.
    #[arg(long, global = true, default_value_t = 10)]
    max_retries: u32,

    /// Selective-repeat window, in frames (1-127).
    #[arg(long, global = true, default_value_t = 8)]
    window: u8,

    /// Probability of corrupting an outgoing selective-repeat frame.
    #[arg(long, global = true, default_value_t = 0.0)]
    corrupt_rate: f64,

    /// Probability of dropping an outgoing selective-repeat frame.
    #[arg(long, global = true, default_value_t = 0.0)]
    drop_rate: f64,

    /// Seed for the fault injector.
    #[arg(long, global = true)]
    seed: Option<u64>,
}

impl TransportArgs {
    fn config(&self) -> RdtConfig {
        RdtConfig::default()
            .with_timeout(Duration::from_millis(self.timeout_ms))
            .with_max_retries(self.max_retries)
            .with_window(self.window)
            .with_faults(FaultConfig {
                corrupt_rate: self.corrupt_rate,
                drop_rate: self.drop_rate,
                seed: self.seed,
            })
    }
}

#[derive(Subcommand)]
enum Mode {
    /// Wait for one sender and write what it transmits to a file.
    Receive {
        /// Local address to bind (e.g. 0.0.0.0:18752).
        #[arg(short, long)]
        bind: SocketAddr,
        /// Destination file.
        #[arg(short, long)]
        output: PathBuf,
    },
    /// Connect to a receiver and transmit a file.
    Send {
        /// Local address to bind (e.g. 0.0.0.0:5791).
        #[arg(short, long, default_value = "0.0.0.0:0")]
        bind: SocketAddr,
        /// Receiver address (e.g. 127.0.0.1:18752).
        #[arg(short, long)]
        peer: SocketAddr,
        /// File to transmit.
        #[arg(short, long)]
        input: PathBuf,
    },
}

/// Length prefix carried in the first unit of a transfer.
const LENGTH_PREFIX: usize = 8;

/// Largest file a receiver will accept (1 GiB).
const MAX_FILE_LEN: u64 = 1 << 30;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialise env_logger; set RUST_LOG to control verbosity.
    env_logger::init();

    let cli = Cli::parse();
    let mut table = RdtTable::new(cli.transport.config());
    let handle = table.create(cli.transport.protocol)?;

    let outcome = tokio::select! {
        result = run(&mut table, handle, &cli.mode) => result,
        _ = tokio::signal::ctrl_c() => Err(anyhow!("interrupted")),
    };

    if let Err(e) = table.close(handle).await {
        log::warn!("close failed: {e}");
    }
    outcome
}

async fn run(table: &mut RdtTable, handle: Handle, mode: &Mode) -> Result<()> {
    match mode {
        Mode::Receive { bind, output } => receive_file(table, handle, *bind, output).await,
        Mode::Send { bind, peer, input } => send_file(table, handle, *bind, *peer, input).await,
    }
}

async fn receive_file(
    table: &mut RdtTable,
    handle: Handle,
    bind: SocketAddr,
    output: &Path,
) -> Result<()> {
    let local = table.bind_addr(handle, bind)?;
    table.listen(handle, 1)?;
    log::info!("Listening on {local}");
    table.accept(handle).await?;
    if let Some(peer) = table.remote_addr(handle)? {
        log::info!("Accepted {peer}");
    }

    let header = table.receive(handle, PAYLOAD_LEN).await?;
    if header.len() < LENGTH_PREFIX {
        bail!("peer closed before announcing a length");
    }
    let mut prefix = [0u8; LENGTH_PREFIX];
    prefix.copy_from_slice(&header[..LENGTH_PREFIX]);
    let (len, padded) = receive_lengths(u64::from_be_bytes(prefix))?;
    let mut data = table.receive(handle, padded).await?;
    if data.len() < len {
        bail!("peer closed after {} of {len} bytes", data.len());
    }
    data.truncate(len);

    std::fs::write(output, &data)
        .with_context(|| format!("writing {}", output.display()))?;
    log::info!("Received {len} bytes into {}", output.display());
    Ok(())
}

/// Validate an announced file length and round it up to whole frames.
///
/// Frames are fixed-size, so the receiver reads `padded` bytes and then
/// drops the padding.
fn receive_lengths(announced: u64) -> Result<(usize, usize)> {
    if announced > MAX_FILE_LEN {
        bail!("announced length {announced} exceeds the {MAX_FILE_LEN}-byte limit");
    }
    let len = usize::try_from(announced).context("announced length too large")?;
    let padded = len
        .div_ceil(PAYLOAD_LEN)
        .checked_mul(PAYLOAD_LEN)
        .context("announced length too large")?;
    Ok((len, padded))
}

async fn send_file(
    table: &mut RdtTable,
    handle: Handle,
    bind: SocketAddr,
    peer: SocketAddr,
    input: &Path,
) -> Result<()> {
    let data = std::fs::read(input).with_context(|| format!("reading {}", input.display()))?;

    table.bind_addr(handle, bind)?;
    table.connect_addr(handle, peer).await?;
    log::info!("Connected to {peer}");

    table.send(handle, &(data.len() as u64).to_be_bytes()).await?;
    table.send(handle, &data).await?;
    log::info!("Sent {} bytes from {}", data.len(), input.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lengths_round_up_to_whole_frames() {
        assert_eq!(receive_lengths(0).unwrap(), (0, 0));
        assert_eq!(receive_lengths(1).unwrap(), (1, PAYLOAD_LEN));
        assert_eq!(receive_lengths(250).unwrap(), (250, 300));
        assert_eq!(
            receive_lengths(MAX_FILE_LEN).unwrap().1 % PAYLOAD_LEN,
            0
        );
    }

    #[test]
    fn hostile_lengths_are_rejected_before_allocating() {
        assert!(receive_lengths(MAX_FILE_LEN + 1).is_err());
        assert!(receive_lengths(u64::MAX).is_err());
    }

    #[test]
    fn transport_flags_map_onto_config() {
        let cli = Cli::parse_from([
            "rdt-over-udp",
            "--protocol",
            "sr",
            "--window",
            "200",
            "--seed",
            "3",
            "send",
            "--peer",
            "127.0.0.1:18752",
            "--input",
            "f",
        ]);
        let config = cli.transport.config();
        assert_eq!(cli.transport.protocol, Protocol::SelectiveRepeat);
        assert_eq!(config.window, rdt_over_udp::config::MAX_WINDOW);
        assert_eq!(config.faults.seed, Some(3));
    }
}
