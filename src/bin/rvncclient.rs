//! `rvncclient`: a thin CLI wrapper over `pf_vnc::VncClient`, driving one
//! semantic action against a live RFB server per invocation.
//!
//! Grounded on the teacher's `src/bin/rvncclient.rs` (`env_logger::init()`
//! plus a one-shot `connect()` call), upgraded from clap 2.33's
//! `App`/`Arg` builder to clap 4's derive API per `trdthg-rust-vnc`'s
//! `Cargo.toml`. The teacher's binary drove an SDL2 window; this one
//! drives the scripted operations §4.4 exposes instead, since no window
//! system is in scope here.

use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, Subcommand, ValueEnum};
use log::{error, info};

use pf_vnc::client::{
    ScrollDirection as ClientScrollDirection, BUTTON_LEFT, BUTTON_MIDDLE, BUTTON_RIGHT,
};
use pf_vnc::VncClient;

#[derive(Parser)]
#[command(name = "rvncclient", about = "RFB/VNC client driver")]
struct Cli {
    /// VNC server hostname or IP.
    host: String,

    /// VNC server port.
    #[arg(default_value_t = 5900)]
    port: u16,

    #[command(subcommand)]
    command: Command,
}

#[derive(Clone, Copy, ValueEnum)]
enum ButtonArg {
    Left,
    Middle,
    Right,
}

impl ButtonArg {
    fn mask(self) -> u8 {
        match self {
            ButtonArg::Left => BUTTON_LEFT,
            ButtonArg::Middle => BUTTON_MIDDLE,
            ButtonArg::Right => BUTTON_RIGHT,
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum ScrollArg {
    Up,
    Down,
    Left,
    Right,
}

impl ScrollArg {
    fn direction(self) -> ClientScrollDirection {
        match self {
            ScrollArg::Up => ClientScrollDirection::Up,
            ScrollArg::Down => ClientScrollDirection::Down,
            ScrollArg::Left => ClientScrollDirection::Left,
            ScrollArg::Right => ClientScrollDirection::Right,
        }
    }
}

#[derive(Subcommand)]
enum Command {
    /// Move the pointer to (x, y).
    Move { x: u16, y: u16 },
    /// Click a mouse button at the current pointer position.
    Click {
        #[arg(value_enum, default_value_t = ButtonArg::Left)]
        button: ButtonArg,
    },
    /// Double-click a mouse button at the current pointer position.
    DoubleClick {
        #[arg(value_enum, default_value_t = ButtonArg::Left)]
        button: ButtonArg,
    },
    /// Scroll in one direction a number of times.
    Scroll {
        #[arg(value_enum)]
        direction: ScrollArg,
        #[arg(default_value_t = 1)]
        repeat: u32,
    },
    /// Type literal text.
    Type { text: String },
    /// Press and release a raw X11 keysym (decimal or 0x-prefixed hex).
    Key { keysym: String },
    /// Take a screenshot and save it as a PNG file.
    Screenshot {
        #[arg(short, long, default_value = "screenshot.png")]
        out: PathBuf,
        #[arg(long)]
        no_cursor: bool,
    },
    /// Start recording the session to `dir`, idle for `seconds`, then
    /// stop recording and reconnect to the real server.
    Record {
        dir: PathBuf,
        #[arg(default_value_t = 10)]
        seconds: u64,
    },
}

fn parse_keysym(s: &str) -> Result<u32, std::num::ParseIntError> {
    if let Some(hex) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        u32::from_str_radix(hex, 16)
    } else {
        s.parse()
    }
}

fn save_screenshot(image: &pf_vnc::Image, out: &PathBuf) -> pf_vnc::Result<()> {
    let buffer = image::RgbImage::from_raw(image.width as u32, image.height as u32, image.rgb.clone())
        .ok_or_else(|| pf_vnc::RfbError::codec("framebuffer size does not match its pixel buffer"))?;
    image::DynamicImage::ImageRgb8(buffer)
        .save(out)
        .map_err(|e| pf_vnc::RfbError::codec(format!("failed to save screenshot: {}", e)))
}

fn run(cli: &Cli, client: &VncClient) -> pf_vnc::Result<()> {
    match &cli.command {
        Command::Move { x, y } => client.move_to(*x, *y),
        Command::Click { button } => client.click(button.mask()),
        Command::DoubleClick { button } => client.double_click(button.mask()),
        Command::Scroll { direction, repeat } => client.scroll(direction.direction(), *repeat),
        Command::Type { text } => client.type_text(text),
        Command::Key { keysym } => {
            let ks = parse_keysym(keysym).map_err(|e| {
                pf_vnc::RfbError::codec(format!("invalid keysym {:?}: {}", keysym, e))
            })?;
            client.press_key(ks)
        }
        Command::Screenshot { out, no_cursor } => {
            let image = client.screenshot(false, !no_cursor)?;
            save_screenshot(&image, out)?;
            info!("wrote screenshot to {}", out.display());
            Ok(())
        }
        Command::Record { dir, seconds } => {
            client.start_recording(dir)?;
            info!("recording to {} for {}s", dir.display(), seconds);
            std::thread::sleep(Duration::from_secs(*seconds));
            client.stop_recording()
        }
    }
}

fn main() {
    env_logger::init();
    let cli = Cli::parse();

    info!("connecting to {}:{}", cli.host, cli.port);
    let client = match VncClient::connect(&cli.host, cli.port) {
        Ok(client) => client,
        Err(error) => {
            error!("connection failed: {}", error);
            std::process::exit(1);
        }
    };

    if let Err(error) = run(&cli, &client) {
        error!("operation failed: {}", error);
        std::process::exit(1);
    }
}
