//! `rvncproxy`: a standalone recording proxy (§4.5), run independently of
//! `VncClient` for manual testing of the relay itself.
//!
//! Grounded on the teacher's `src/bin/rvncproxy.rs` accept-loop shape
//! (`TcpListener`, `info!`/`error!` logging around each connection),
//! generalized from a bare TCP-to-TCP relay into the WebSocket-accepting,
//! byte-teeing `RecordingProxy` built in `recording::proxy`. Upgraded
//! from clap 2.33's `App`/`Arg` builder to clap 4's derive API per
//! `trdthg-rust-vnc`'s `Cargo.toml`.

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use log::{error, info};

use pf_vnc::recording::{RecordingProxy, RecordingWriter};

#[derive(Parser)]
#[command(name = "rvncproxy", about = "standalone RFB/VNC recording proxy")]
struct Cli {
    /// Real VNC server hostname or IP to relay to.
    connect_host: String,

    /// Real VNC server port.
    #[arg(default_value_t = 5900)]
    connect_port: u16,

    /// Directory the recorded `*.rfb.bin`/`*.time.bin` files are written to.
    dir: PathBuf,
}

fn main() {
    env_logger::init();
    let cli = Cli::parse();

    let writer = match RecordingWriter::create(&cli.dir) {
        Ok(writer) => Arc::new(writer),
        Err(error) => {
            error!("cannot create recording directory {}: {}", cli.dir.display(), error);
            std::process::exit(1);
        }
    };

    let proxy = match RecordingProxy::spawn(cli.connect_host.clone(), cli.connect_port, writer) {
        Ok(proxy) => proxy,
        Err(error) => {
            error!("cannot start recording proxy: {}", error);
            std::process::exit(1);
        }
    };

    info!(
        "recording proxy listening on 127.0.0.1:{}, relaying to {}:{}, writing to {}",
        proxy.port(),
        cli.connect_host,
        cli.connect_port,
        cli.dir.display()
    );

    if let Err(error) = proxy.wait() {
        error!("recording proxy session failed: {}", error);
        std::process::exit(1);
    }
    info!("recording proxy session complete");
}
