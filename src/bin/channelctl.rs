//! Demonstration binary: reads a multiplex off a UDP socket, extracts one
//! program with [`mpegts_channel::Channel`], and writes the resulting
//! single-program stream to another UDP socket — optionally routing it
//! through a child process first via the pipe stage.

use std::collections::HashSet;
use std::net::UdpSocket as StdUdpSocket;
use std::sync::Arc;

use clap::Parser;
use tokio::net::UdpSocket;
use tokio::sync::mpsc;

use mpegts_channel::constants::TS_PACKET_SIZE;
use mpegts_channel::network::create_udp_socket;
use mpegts_channel::{Channel, ChannelConfig, DemuxHost, PipeConfig, PipeHandle, TsPacket};

#[derive(Parser)]
struct Opt {
    /// UDP multicast/unicast address to read the input multiplex from.
    #[clap(long, default_value = "239.1.1.2:1234")]
    input: String,

    /// UDP address to send the extracted single-program stream to.
    #[clap(long, default_value = "239.1.1.3:1234")]
    output: String,

    /// Channel name, used only in log output.
    #[clap(long, default_value = "channel")]
    name: String,

    /// Program number to extract. Unset means latch onto the first
    /// program seen in the PAT.
    #[clap(long)]
    pnr: Option<u16>,

    /// Program number to present downstream as, if different from `pnr`.
    #[clap(long)]
    set_pnr: Option<u16>,

    /// PID remap rule, e.g. `video=501`, `eng=502`, `pmt=500`. Repeatable.
    #[clap(long = "map")]
    map: Vec<String>,

    /// Elementary PID to drop from the output. Repeatable.
    #[clap(long = "filter")]
    filter: Vec<u16>,

    #[clap(long)]
    no_sdt: bool,

    #[clap(long)]
    no_eit: bool,

    /// Command line of a child process to route the output stream through
    /// before it reaches the output UDP socket.
    #[clap(long)]
    pipe: Option<String>,

    /// Seconds before restarting the piped child after it exits.
    #[clap(long, default_value_t = 5)]
    pipe_restart: u32,

    /// Load the channel configuration from a JSON file instead of the
    /// flags above (`--pnr`, `--set-pnr`, `--map`, `--filter`, `--no-sdt`,
    /// `--no-eit`).
    #[clap(long)]
    config: Option<std::path::PathBuf>,
}

/// Binds a UDP socket for sending to `addr`, joining the destination as
/// the connected peer so plain `send` can be used.
fn connect_udp_output(addr: &str) -> anyhow::Result<StdUdpSocket> {
    let socket = StdUdpSocket::bind("0.0.0.0:0")?;
    socket.connect(addr)?;
    Ok(socket)
}

/// [`DemuxHost`] for this binary: PID joins are tracked only for
/// `check_pid` bookkeeping (the UDP input already carries every PID), and
/// outgoing packets go either to the piped child's stdin or straight to
/// the output socket.
struct UdpHost {
    out_socket: Arc<StdUdpSocket>,
    pipe: Option<PipeHandle>,
    joined: HashSet<u16>,
}

impl DemuxHost for UdpHost {
    fn join_pid(&mut self, pid: u16) {
        self.joined.insert(pid);
    }

    fn leave_pid(&mut self, pid: u16) {
        self.joined.remove(&pid);
    }

    fn check_pid(&self, pid: u16) -> bool {
        self.joined.contains(&pid)
    }

    fn send(&mut self, packet: &TsPacket) {
        match &self.pipe {
            Some(pipe) => pipe.send_ts(*packet),
            None => {
                if let Err(err) = self.out_socket.send(packet) {
                    tracing::warn!(error = %err, "failed to send output packet");
                }
            }
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();
    let opt = Opt::parse();

    let config = if let Some(path) = &opt.config {
        let raw = std::fs::read_to_string(path)?;
        serde_json::from_str::<ChannelConfig>(&raw)?
    } else {
        let mut config = ChannelConfig::new(opt.name)?;
        config.pnr = opt.pnr;
        config.set_pnr = opt.set_pnr;
        config.map = opt.map;
        config.filter = opt.filter;
        config.sdt = !opt.no_sdt;
        config.eit = !opt.no_eit;
        config
    };

    let out_socket = Arc::new(connect_udp_output(&opt.output)?);

    let pipe_handle = if let Some(command) = opt.pipe {
        let mut pipe_config = PipeConfig::new(format!("{}-pipe", config.name), command)?;
        pipe_config.restart = opt.pipe_restart;
        pipe_config.stream = true;
        pipe_config.ts_input = true;

        let (downstream_tx, mut downstream_rx) = mpsc::channel::<TsPacket>(4096);
        let handle = mpegts_channel::pipe::spawn(pipe_config, downstream_tx)?;

        let forward_socket = out_socket.clone();
        tokio::spawn(async move {
            while let Some(pkt) = downstream_rx.recv().await {
                if let Err(err) = forward_socket.send(&pkt) {
                    tracing::warn!(error = %err, "failed to send piped output packet");
                }
            }
        });

        Some(handle)
    } else {
        None
    };

    let host = UdpHost {
        out_socket,
        pipe: pipe_handle,
        joined: HashSet::new(),
    };
    let mut channel = Channel::new(config, host)?;

    let in_socket = UdpSocket::from_std(create_udp_socket(&opt.input)?.into())?;
    tracing::info!(input = %opt.input, output = %opt.output, "channel listening");

    let mut buf = [0u8; 7 * TS_PACKET_SIZE];
    loop {
        let (len, _src) = in_socket.recv_from(&mut buf).await?;
        let mut offset = 0;
        while offset + TS_PACKET_SIZE <= len {
            let pkt: TsPacket = buf[offset..offset + TS_PACKET_SIZE]
                .try_into()
                .expect("slice length matches TS_PACKET_SIZE");
            channel.on_ts(&pkt);
            offset += TS_PACKET_SIZE;
        }
    }
}
