#[cfg(target_os = "linux")]
mod client {
    use std::path::PathBuf;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;
    use std::thread;

    use clap::Parser;
    use tokio::signal::unix::{signal, SignalKind};
    use tracing::{error, info};
    use xskio::xdp::XdpProgram;
    use xskio_core::sys::utils::raise_memlock_limit;
    use xskio::{OutboundQueue, PacketRef, Poller, XskBuilder, XskError};

    /// Attaches the redirect program to one NIC queue and runs a packet
    /// engine on it until interrupted.
    #[derive(Parser, Debug)]
    #[command(name = "xskio-client", version)]
    struct Args {
        /// Interface to bind.
        interface: String,

        /// Hardware queue to bind.
        #[arg(short, long, default_value_t = 0)]
        queue: u32,

        /// Frames in the UMEM.
        #[arg(long, default_value_t = 4096)]
        frames: u32,

        /// Idle strategy: busy, wait or adaptive.
        #[arg(long, default_value = "adaptive")]
        poller: Poller,

        /// Attach in generic SKB mode without trying driver mode first.
        #[arg(long)]
        skb: bool,

        /// BPF object to load. Searched for under ./target when omitted.
        #[arg(long)]
        program: Option<PathBuf>,
    }

    /// Sets `stop` on SIGINT, SIGTERM or SIGHUP.
    fn watch_signals(stop: Arc<AtomicBool>) -> std::io::Result<()> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()?;

        thread::Builder::new()
            .name("signals".into())
            .spawn(move || {
                runtime.block_on(async {
                    let (Ok(mut term), Ok(mut hup)) = (
                        signal(SignalKind::terminate()),
                        signal(SignalKind::hangup()),
                    ) else {
                        error!("could not install signal handlers");
                        return;
                    };
                    tokio::select! {
                        _ = tokio::signal::ctrl_c() => info!("interrupted"),
                        _ = term.recv() => info!("terminated"),
                        _ = hup.recv() => info!("hangup"),
                    }
                    stop.store(true, Ordering::Relaxed);
                });
            })?;
        Ok(())
    }

    pub fn run() -> Result<(), XskError> {
        let args = Args::parse();

        if unsafe { libc::geteuid() } != 0 {
            return Err(XskError::PermissionDenied);
        }
        raise_memlock_limit()?;

        let path = match args.program {
            Some(path) => path,
            None => XdpProgram::find_object(std::path::Path::new("target")).ok_or_else(|| {
                XskError::XdpProgram("could not find the xskio BPF object under ./target".into())
            })?,
        };
        let mut program = XdpProgram::load_and_attach(&path, &args.interface, args.skb)?;

        let mut engine = XskBuilder::new(&args.interface)
            .queue_id(args.queue)
            .frame_count(args.frames)
            .poller(args.poller)
            .build_xsk_engine()?;
        program.register_socket(args.queue, engine.binding().backend().fd())?;
        info!("bound {} queue {}", args.interface, args.queue);

        let stop = Arc::new(AtomicBool::new(false));
        watch_signals(Arc::clone(&stop))?;

        let outbound = OutboundQueue::new(1024);
        let mut source = &outbound;
        let mut sink = |packet: PacketRef<'_>| {
            tracing::trace!("received {} bytes in frame {:#x}", packet.len(), packet.frame());
        };

        let result = engine.run(&stop, &mut sink, &mut source);

        let stats = engine.stats().clone();
        let report = engine.shutdown();
        drop(program);

        info!(
            "rx {} packets / {} bytes, tx {} packets / {} bytes, {} completions",
            stats.rx_packets, stats.rx_bytes, stats.tx_packets, stats.tx_bytes, stats.completions
        );
        if report.leaked > 0 {
            info!("{} frames were still held by the kernel", report.leaked);
        }

        result
    }
}

#[cfg(target_os = "linux")]
fn main() -> std::process::ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    match client::run() {
        Ok(()) => std::process::ExitCode::SUCCESS,
        Err(err) => {
            let mut message = format!("error: {err}");
            let mut source = std::error::Error::source(&err);
            while let Some(cause) = source {
                message.push_str(&format!("\n  caused by: {cause}"));
                source = cause.source();
            }
            eprintln!("{message}");
            std::process::ExitCode::FAILURE
        }
    }
}

#[cfg(not(target_os = "linux"))]
fn main() -> std::process::ExitCode {
    eprintln!("xskio-client needs Linux AF_XDP sockets");
    std::process::ExitCode::FAILURE
}
