//! `VncClient` (§4.4): the semantic input API a caller actually drives —
//! pointer/keyboard operations, screenshots, and recording lifecycle.
//!
//! Two independent locks guard I/O: `request_lock` serializes everything
//! that writes a client-originated message (so two operations on
//! different threads can't interleave their bytes), and `recv_lock`
//! serializes the foreground's own read-until-FramebufferUpdate loop.
//! Once a background updater thread is running (recording mode), it
//! becomes the transport's sole reader; callers instead wait on a frame
//! counter the updater bumps and signals through a condition variable.

use std::sync::{Arc, Condvar, Mutex};
use std::time::{Duration, Instant};

use crate::error::{RfbError, Result};
use crate::handshake;
use crate::keysym;
use crate::protocol::{C2S, Message};
use crate::recording::{RecordingProxy, RecordingWriter};
use crate::session::{Image, RfbSession, ServerOutcome};
use crate::transport::{DuplexTransport, TcpTransport, Transport, WebSocketTransport};

const UPDATER_REQUEST_INTERVAL: Duration = Duration::from_millis(200);
const UPDATER_POLL_CHUNK: Duration = Duration::from_millis(50);
const STOP_RECORDING_JOIN_TIMEOUT: Duration = Duration::from_secs(5);

/// Where the client's transport currently connects to, remembered so
/// `stop_recording` can reconnect to the real endpoint.
#[derive(Debug, Clone)]
struct Endpoint {
    host: String,
    port: u16,
}

/// The four mouse buttons §4.7's button mask vocabulary recognizes as
/// inputs to `button_down`/`up`/`click`.
pub use crate::actions::types::{
    BUTTON_LEFT, BUTTON_MIDDLE, BUTTON_RIGHT, BUTTON_SCROLL_DOWN, BUTTON_SCROLL_LEFT,
    BUTTON_SCROLL_RIGHT, BUTTON_SCROLL_UP,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScrollDirection {
    Up,
    Down,
    Left,
    Right,
}

impl ScrollDirection {
    fn button(self) -> u8 {
        match self {
            ScrollDirection::Up => BUTTON_SCROLL_UP,
            ScrollDirection::Down => BUTTON_SCROLL_DOWN,
            ScrollDirection::Left => BUTTON_SCROLL_LEFT,
            ScrollDirection::Right => BUTTON_SCROLL_RIGHT,
        }
    }
}

struct UpdaterHandle {
    stop: Arc<std::sync::atomic::AtomicBool>,
    join: std::thread::JoinHandle<()>,
}

struct RecordingState {
    proxy: RecordingProxy,
    writer: Arc<RecordingWriter>,
    updater: UpdaterHandle,
}

/// Shared client state. `VncClient` is a thin `Arc<Inner>` handle so the
/// background updater thread can hold its own reference alongside the
/// caller's.
struct Inner {
    transport: Mutex<Box<dyn DuplexTransport + Send>>,
    session: Mutex<RfbSession>,
    request_lock: Mutex<()>,
    recv_lock: Mutex<()>,
    frame_counter: Mutex<u64>,
    frame_cv: Condvar,
    endpoint: Mutex<Endpoint>,
    original_endpoint: Mutex<Option<Endpoint>>,
    recording: Mutex<Option<RecordingState>>,
}

/// A connected RFB session plus the full operation surface §4.4 exposes.
pub struct VncClient {
    inner: Arc<Inner>,
}

impl VncClient {
    /// Connects over plain TCP and performs the handshake.
    pub fn connect(host: &str, port: u16) -> Result<VncClient> {
        let mut stream = TcpTransport::connect(host, port)?;
        let session = handshake::perform(&mut stream)?;
        Ok(VncClient {
            inner: Arc::new(Inner {
                transport: Mutex::new(Box::new(stream)),
                session: Mutex::new(session),
                request_lock: Mutex::new(()),
                recv_lock: Mutex::new(()),
                frame_counter: Mutex::new(0),
                frame_cv: Condvar::new(),
                endpoint: Mutex::new(Endpoint {
                    host: host.to_string(),
                    port,
                }),
                original_endpoint: Mutex::new(None),
                recording: Mutex::new(None),
            }),
        })
    }

    fn send(&self, msg: C2S) -> Result<()> {
        let _guard = self.inner.request_lock.lock().unwrap();
        {
            let mut transport = self.inner.transport.lock().unwrap();
            msg.write_to(&mut *transport)?;
        }
        self.inner.session.lock().unwrap().handle_client_message(&msg);
        Ok(())
    }

    fn current_pointer(&self) -> (u8, u16, u16) {
        let session = self.inner.session.lock().unwrap();
        (session.pointer.buttons, session.pointer.x, session.pointer.y)
    }

    pub fn move_to(&self, x: u16, y: u16) -> Result<()> {
        let (buttons, _, _) = self.current_pointer();
        self.send(C2S::PointerEvent {
            button_mask: buttons,
            x_position: x,
            y_position: y,
        })
    }

    pub fn button_down(&self, button: u8) -> Result<()> {
        let (buttons, x, y) = self.current_pointer();
        self.send(C2S::PointerEvent {
            button_mask: buttons | button,
            x_position: x,
            y_position: y,
        })
    }

    pub fn button_up(&self, button: u8) -> Result<()> {
        let (buttons, x, y) = self.current_pointer();
        self.send(C2S::PointerEvent {
            button_mask: buttons & !button,
            x_position: x,
            y_position: y,
        })
    }

    pub fn click(&self, button: u8) -> Result<()> {
        self.button_down(button)?;
        self.button_up(button)
    }

    pub fn double_click(&self, button: u8) -> Result<()> {
        self.click(button)?;
        self.click(button)
    }

    pub fn triple_click(&self, button: u8) -> Result<()> {
        self.click(button)?;
        self.click(button)?;
        self.click(button)
    }

    /// For each of `repeat` ticks: mask-OR press then mask-clear release
    /// at the current position, per §4.4's scroll rule.
    pub fn scroll(&self, direction: ScrollDirection, repeat: u32) -> Result<()> {
        let button = direction.button();
        for _ in 0..repeat {
            self.button_down(button)?;
            self.button_up(button)?;
        }
        Ok(())
    }

    fn send_key(&self, down: bool, keysym: u32) -> Result<()> {
        self.send(C2S::KeyEvent { down, key: keysym })
    }

    pub fn press_key(&self, keysym: u32) -> Result<()> {
        self.send_key(true, keysym)?;
        self.send_key(false, keysym)
    }

    /// Maps each character to its X11 keysym, wrapping the characters in
    /// `keysym::SHIFT_AUGMENTED_CHARS` with an explicit `Shift_L`
    /// press/release around the key.
    pub fn type_text(&self, text: &str) -> Result<()> {
        for c in text.chars() {
            let key = keysym::from_char(c);
            if keysym::needs_shift(c) {
                self.send_key(true, keysym::SHIFT_L)?;
                self.press_key(key)?;
                self.send_key(false, keysym::SHIFT_L)?;
            } else {
                self.press_key(key)?;
            }
        }
        Ok(())
    }

    /// Presses `keysyms` in order; releases them in reverse order when
    /// the returned guard drops, even if the caller's scope unwinds via
    /// an early `?` return. If a press partway through the sequence
    /// fails, whatever was already pressed is released before returning
    /// the error, so a failed `hold_keys` never leaves a key stuck down.
    pub fn hold_keys(&self, keysyms: &[u32]) -> Result<HeldKeys<'_>> {
        let mut pressed = Vec::with_capacity(keysyms.len());
        for &k in keysyms {
            if let Err(error) = self.send_key(true, k) {
                for &done in pressed.iter().rev() {
                    let _ = self.send_key(false, done);
                }
                return Err(error);
            }
            pressed.push(k);
        }
        Ok(HeldKeys {
            client: self,
            keysyms: pressed,
        })
    }

    fn read_one_server_message(&self) -> Result<ServerOutcome> {
        let mut transport = self.inner.transport.lock().unwrap();
        let mut session = self.inner.session.lock().unwrap();
        session.handle_server_message(&mut *transport)
    }

    fn updater_running(&self) -> bool {
        self.inner.recording.lock().unwrap().is_some()
    }

    /// §4.4's screenshot protocol: request a full-screen update, then
    /// either read until it's consumed (no background updater) or wait
    /// for the updater to advance the frame counter (recording mode).
    pub fn screenshot(&self, incremental: bool, cursor: bool) -> Result<Image> {
        let (width, height) = {
            let session = self.inner.session.lock().unwrap();
            (session.framebuffer.width(), session.framebuffer.height())
        };
        let request = C2S::FramebufferUpdateRequest {
            incremental,
            x_position: 0,
            y_position: 0,
            width,
            height,
        };

        if self.updater_running() {
            let baseline = *self.inner.frame_counter.lock().unwrap();
            self.send(request)?;
            let guard = self.inner.frame_counter.lock().unwrap();
            let _guard = self
                .inner
                .frame_cv
                .wait_while(guard, |counter| *counter <= baseline)
                .unwrap();
        } else {
            let _recv_guard = self.inner.recv_lock.lock().unwrap();
            self.send(request)?;
            loop {
                if self.read_one_server_message()? == ServerOutcome::FramebufferUpdated {
                    break;
                }
            }
        }

        Ok(self.inner.session.lock().unwrap().screenshot(cursor))
    }

    /// §4.5 `start_recording`: records the original endpoint, spawns the
    /// WebSocket-tee proxy, reconnects through it (redoing the handshake,
    /// which therefore records it for free), and launches the updater.
    pub fn start_recording(&self, dir: &std::path::Path) -> Result<()> {
        if self.updater_running() {
            return Err(RfbError::InvalidOperation(
                "recording is already active".to_string(),
            ));
        }

        let original = self.inner.endpoint.lock().unwrap().clone();
        *self.inner.original_endpoint.lock().unwrap() = Some(original.clone());

        let writer = Arc::new(RecordingWriter::create(dir)?);
        let proxy = RecordingProxy::spawn(original.host.clone(), original.port, writer.clone())?;
        let port = proxy.port();
        info!("recording proxy listening on 127.0.0.1:{}", port);

        // `RecordingProxy::spawn` binds its listener synchronously before
        // returning, so the port is already accepting connections by the
        // time we get here (the accept thread just hasn't called
        // `accept()` yet — the kernel queues the connection regardless).
        // A throwaway probe connection would consume the proxy's single
        // accept-once slot, so none is needed or wanted here.
        let mut ws = WebSocketTransport::connect("127.0.0.1", port, "/")?;
        let mut session = handshake::perform(&mut ws)?;
        handshake::send_preferred_setup(&mut ws, &mut session)?;

        *self.inner.transport.lock().unwrap() = Box::new(ws);
        *self.inner.session.lock().unwrap() = session;
        *self.inner.endpoint.lock().unwrap() = Endpoint {
            host: "127.0.0.1".to_string(),
            port,
        };

        let stop = Arc::new(std::sync::atomic::AtomicBool::new(false));
        let updater_inner = self.inner.clone();
        let updater_stop = stop.clone();
        let join = std::thread::spawn(move || run_updater(updater_inner, updater_stop));

        *self.inner.recording.lock().unwrap() = Some(RecordingState {
            proxy,
            writer,
            updater: UpdaterHandle { stop, join },
        });
        Ok(())
    }

    /// §4.5 `stop_recording`: final screenshot, stop and join the
    /// updater, tear down the proxy, and reconnect to the original
    /// endpoint.
    pub fn stop_recording(&self) -> Result<()> {
        let original = self
            .inner
            .original_endpoint
            .lock()
            .unwrap()
            .clone()
            .ok_or_else(|| {
                RfbError::InvalidOperation("no recording is active".to_string())
            })?;

        let _ = self.screenshot(false, true)?;

        let state = self
            .inner
            .recording
            .lock()
            .unwrap()
            .take()
            .ok_or_else(|| RfbError::InvalidOperation("no recording is active".to_string()))?;

        state.updater.stop.store(true, std::sync::atomic::Ordering::SeqCst);
        let join_started = Instant::now();
        while !state.updater.join.is_finished() && join_started.elapsed() < STOP_RECORDING_JOIN_TIMEOUT {
            std::thread::sleep(Duration::from_millis(10));
        }
        if !state.updater.join.is_finished() {
            warn!("background updater did not stop within the join timeout");
        }
        let _ = state.updater.join.join();
        state.writer.close()?;
        state.proxy.shutdown();

        let mut stream = TcpTransport::connect(&original.host, original.port)?;
        let session = handshake::perform(&mut stream)?;
        *self.inner.transport.lock().unwrap() = Box::new(stream);
        *self.inner.session.lock().unwrap() = session;
        *self.inner.endpoint.lock().unwrap() = original;
        *self.inner.original_endpoint.lock().unwrap() = None;
        Ok(())
    }
}

/// RAII guard returned by `hold_keys`: releases its keysyms in reverse
/// order on drop, swallowing (but logging) any release failure so a
/// single bad key can't stop the rest from being released.
pub struct HeldKeys<'a> {
    client: &'a VncClient,
    keysyms: Vec<u32>,
}

impl<'a> Drop for HeldKeys<'a> {
    fn drop(&mut self) {
        for &k in self.keysyms.iter().rev() {
            if let Err(error) = self.client.send_key(false, k) {
                warn!("failed to release held key 0x{:08x}: {}", k, error);
            }
        }
    }
}

fn run_updater(inner: Arc<Inner>, stop: Arc<std::sync::atomic::AtomicBool>) {
    let full_request = C2S::FramebufferUpdateRequest {
        incremental: false,
        x_position: 0,
        y_position: 0,
        width: inner.session.lock().unwrap().framebuffer.width(),
        height: inner.session.lock().unwrap().framebuffer.height(),
    };
    if let Err(error) = send_updater_request(&inner, full_request) {
        error!("background updater failed to send initial request: {}", error);
        return;
    }

    let mut last_request_at = Instant::now();
    while !stop.load(std::sync::atomic::Ordering::SeqCst) {
        let ready = {
            let mut transport = inner.transport.lock().unwrap();
            match transport.read_ready(UPDATER_POLL_CHUNK) {
                Ok(ready) => ready,
                Err(error) => {
                    error!("background updater readiness probe failed: {}", error);
                    return;
                }
            }
        };

        if ready {
            let outcome = {
                let mut transport = inner.transport.lock().unwrap();
                let mut session = inner.session.lock().unwrap();
                session.handle_server_message(&mut *transport)
            };
            match outcome {
                Ok(ServerOutcome::FramebufferUpdated) => {
                    *inner.frame_counter.lock().unwrap() += 1;
                    inner.frame_cv.notify_all();
                }
                Ok(ServerOutcome::Other) => {}
                Err(error) => {
                    error!("background updater read failed: {}", error);
                    return;
                }
            }
        }

        if last_request_at.elapsed() >= UPDATER_REQUEST_INTERVAL {
            let (width, height) = {
                let session = inner.session.lock().unwrap();
                (session.framebuffer.width(), session.framebuffer.height())
            };
            let request = C2S::FramebufferUpdateRequest {
                incremental: true,
                x_position: 0,
                y_position: 0,
                width,
                height,
            };
            if let Err(error) = send_updater_request(&inner, request) {
                error!("background updater failed to send incremental request: {}", error);
                return;
            }
            last_request_at = Instant::now();
        }
    }
}

fn send_updater_request(inner: &Arc<Inner>, request: C2S) -> Result<()> {
    let _guard = inner.request_lock.lock().unwrap();
    let mut transport = inner.transport.lock().unwrap();
    request.write_to(&mut *transport)?;
    drop(transport);
    inner.session.lock().unwrap().handle_client_message(&request);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scroll_direction_maps_to_its_button_bit() {
        assert_eq!(ScrollDirection::Up.button(), BUTTON_SCROLL_UP);
        assert_eq!(ScrollDirection::Down.button(), BUTTON_SCROLL_DOWN);
        assert_eq!(ScrollDirection::Left.button(), BUTTON_SCROLL_LEFT);
        assert_eq!(ScrollDirection::Right.button(), BUTTON_SCROLL_RIGHT);
    }
}
