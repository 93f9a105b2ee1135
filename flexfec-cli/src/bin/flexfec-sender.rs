//! FlexFEC Sender - RTP stream sender with forward error correction
//!
//! Reads from stdin or a file, packetizes the input into RTP and sends it
//! over UDP with FlexFEC repair packets interleaved.

use clap::Parser;
use flexfec::interceptor::Attributes;
use flexfec::io::{Pacer, RtpClock, RtpSocket, Timer, UdpRtpWriter};
use flexfec::{FecStageFactory, RtpHeader, RtpWriter, SeqNumber};
use flexfec_cli::{display_compact_stats, display_fec_stats, SenderConfig};
use std::fs::File;
use std::io::{self, BufReader, Read};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Instant;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "flexfec-sender")]
#[command(about = "RTP sender with FlexFEC protection", long_about = None)]
struct Args {
    /// TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Write an example configuration to this path and exit
    #[arg(long)]
    write_config: Option<PathBuf>,

    /// Input source: file path or '-' for stdin
    #[arg(short, long)]
    input: Option<String>,

    /// RTP destination (format: host:port)
    #[arg(short, long)]
    destination: Option<SocketAddr>,

    /// Local bind address
    #[arg(short, long)]
    bind: Option<SocketAddr>,

    /// Media SSRC
    #[arg(long)]
    ssrc: Option<u32>,

    /// FEC SSRC
    #[arg(long)]
    fec_ssrc: Option<u32>,

    /// FEC scheme (flexfec-03, flexfec-20)
    #[arg(long)]
    scheme: Option<String>,

    /// Media packets per encode round
    #[arg(long)]
    media_packets: Option<usize>,

    /// Repair packets per encode round
    #[arg(long)]
    repair_packets: Option<usize>,

    /// RTP payload bytes per packet
    #[arg(long)]
    payload_size: Option<usize>,

    /// Media send rate in bits per second
    #[arg(long)]
    bitrate: Option<u64>,

    /// Statistics interval in seconds
    #[arg(long)]
    stats: Option<u64>,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,
}

fn load_config(args: &Args) -> anyhow::Result<SenderConfig> {
    let mut config = match &args.config {
        Some(path) => {
            tracing::info!("Loading configuration from {}", path.display());
            SenderConfig::from_file(path)?
        }
        None => {
            let Some(destination) = args.destination else {
                anyhow::bail!("Either --config or --destination is required");
            };
            SenderConfig {
                destination,
                ..SenderConfig::example()
            }
        }
    };

    if let Some(input) = &args.input {
        config.input = input.clone();
    }
    if let Some(destination) = args.destination {
        config.destination = destination;
    }
    if let Some(bind) = args.bind {
        config.bind = Some(bind);
    }
    if let Some(ssrc) = args.ssrc {
        config.stream.ssrc = ssrc;
    }
    if let Some(fec_ssrc) = args.fec_ssrc {
        config.stream.fec_ssrc = fec_ssrc;
    }
    if let Some(scheme) = &args.scheme {
        config.fec.scheme = scheme.clone();
    }
    if let Some(media) = args.media_packets {
        config.fec.media_packets_per_round = media;
    }
    if let Some(repair) = args.repair_packets {
        config.fec.repair_packets_per_round = repair;
    }
    if let Some(size) = args.payload_size {
        config.payload_size = size;
    }
    if let Some(bitrate) = args.bitrate {
        config.bitrate_bps = bitrate;
    }
    if let Some(stats) = args.stats {
        config.stats_interval_secs = stats;
    }

    if config.payload_size == 0 {
        anyhow::bail!("Payload size must be positive");
    }
    Ok(config)
}

fn create_input_reader(input: &str) -> anyhow::Result<Box<dyn Read>> {
    if input == "-" {
        tracing::info!("Reading from stdin");
        Ok(Box::new(io::stdin()))
    } else {
        tracing::info!("Reading from {}", input);
        Ok(Box::new(BufReader::new(File::open(input)?)))
    }
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(if args.verbose { "debug" } else { "info" })
    });
    tracing_subscriber::fmt().with_env_filter(filter).init();

    if let Some(path) = &args.write_config {
        SenderConfig::example().to_file(path)?;
        println!("Wrote example configuration to {}", path.display());
        return Ok(());
    }

    let config = load_config(&args)?;
    let factory = FecStageFactory::new(config.to_fec_config()?)?;
    let stream = config.to_stream_info();

    let local_addr = match config.bind {
        Some(addr) => addr,
        None if config.destination.ip().is_loopback() => "127.0.0.1:0".parse()?,
        None => "0.0.0.0:0".parse()?,
    };
    let socket = RtpSocket::bind(local_addr)?;
    tracing::info!(
        "Sender bound to {}, sending to {}",
        socket.local_addr()?,
        config.destination
    );

    let writer = factory
        .new_stage()
        .bind(&stream, UdpRtpWriter::new(socket, config.destination))?;

    let mut reader = create_input_reader(&config.input)?;
    let mut buffer = vec![0u8; config.payload_size];
    let mut pacer = (config.bitrate_bps > 0)
        .then(|| Pacer::new(config.bitrate_bps, (config.payload_size as u64 + 12) * 10));
    let mut stats_timer = Timer::new(config.stats_interval());
    let clock = RtpClock::new(stream.clock_rate, 0);
    let attributes = Attributes::new();

    let mut seq = SeqNumber::new(0);
    let mut bytes_sent = 0u64;
    let start_time = Instant::now();

    tracing::info!("Entering main send loop...");
    loop {
        let n = match reader.read(&mut buffer) {
            Ok(0) => {
                tracing::info!("End of input reached");
                break;
            }
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e.into()),
        };

        if let Some(pacer) = pacer.as_mut() {
            pacer.wait_for(n + 12);
        }

        let header = RtpHeader::new(stream.payload_type, seq, clock.now(), stream.ssrc);
        match writer.write(&header, &buffer[..n], &attributes) {
            Ok(_) => bytes_sent += n as u64,
            Err(e) => tracing::warn!("Failed to send packet {}: {}", seq, e),
        }
        seq = seq.next();

        if stats_timer.try_fire() {
            display_compact_stats(&writer.stats(), bytes_sent, start_time.elapsed());
        }
    }

    display_fec_stats(&writer.stats(), bytes_sent, start_time.elapsed());
    Ok(())
}
