use std::fs::{self, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::process::{Command, ExitStatus, Stdio};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use crossbeam_channel::{bounded, Receiver, Sender, TryRecvError};
use once_cell::sync::OnceCell;
use serde_json::json;

use rand::{distributions::Alphanumeric, Rng};
#[cfg(unix)]
use std::os::unix::net::UnixStream;

use crate::engine::MediaFactory;
use crate::feed::{Slot, SlotKey};
use crate::playback::{MediaElement, MediaEvent, PlayRejected};

fn player_debug_enabled() -> bool {
    static FLAG: OnceCell<bool> = OnceCell::new();
    *FLAG.get_or_init(|| {
        std::env::var("REELTUI_DEBUG_PLAYER")
            .map(|val| {
                let trimmed = val.trim();
                !(trimmed.is_empty()
                    || trimmed.eq_ignore_ascii_case("0")
                    || trimmed.eq_ignore_ascii_case("false")
                    || trimmed.eq_ignore_ascii_case("no")
                    || trimmed.eq_ignore_ascii_case("off"))
            })
            .unwrap_or(false)
    })
}

fn player_debug_writer() -> Option<&'static Mutex<std::fs::File>> {
    static WRITER: OnceCell<Option<Mutex<std::fs::File>>> = OnceCell::new();
    WRITER
        .get_or_init(|| {
            std::env::var("REELTUI_DEBUG_PLAYER_LOG")
                .ok()
                .and_then(|path| {
                    OpenOptions::new()
                        .create(true)
                        .append(true)
                        .open(path)
                        .map(Mutex::new)
                        .ok()
                })
        })
        .as_ref()
}

pub fn debug_log(message: impl AsRef<str>) {
    if !player_debug_enabled() {
        return;
    }
    if let Some(writer) = player_debug_writer() {
        if let Ok(mut file) = writer.lock() {
            let _ = writeln!(file, "{}", message.as_ref());
            return;
        }
    }
    eprintln!("{}", message.as_ref());
}

/// Where the inline video lands on screen, in cells and pixels. The render
/// layer keeps this current; spawns read whatever is current.
#[derive(Debug, Clone, Copy, Default)]
pub struct Placement {
    pub col: u16,
    pub row: u16,
    pub term_cols: i32,
    pub term_rows: i32,
    pub pixel_width: i32,
    pub pixel_height: i32,
}

#[derive(Debug, Clone)]
pub struct PlayerSettings {
    pub mpv_path: String,
    pub extra_args: Vec<String>,
}

#[derive(Clone, Copy)]
pub enum PlayerCommand {
    SetPause(bool),
    SetMute(bool),
}

pub struct InlineSession {
    kill_tx: Sender<()>,
    status_rx: Receiver<Result<ExitStatus>>,
    handle: Option<thread::JoinHandle<()>>,
    ipc_path: Option<Arc<String>>,
}

impl InlineSession {
    fn finalize(&mut self) {
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }

    pub fn try_status(&mut self) -> Option<Result<ExitStatus>> {
        match self.status_rx.try_recv() {
            Ok(res) => {
                self.finalize();
                Some(res)
            }
            Err(TryRecvError::Empty) => None,
            Err(TryRecvError::Disconnected) => {
                self.finalize();
                Some(Err(anyhow!("player session closed unexpectedly")))
            }
        }
    }

    pub fn stop_blocking(mut self) -> Option<Result<ExitStatus>> {
        let _ = self.kill_tx.send(());
        let res = self.status_rx.recv().ok();
        self.finalize();
        res
    }

    pub fn controls_supported(&self) -> bool {
        self.ipc_path.is_some()
    }

    pub fn send_command(&self, command: PlayerCommand) -> Result<()> {
        let Some(path) = &self.ipc_path else {
            return Err(anyhow!(
                "Inline player controls are not supported on this platform."
            ));
        };
        send_ipc_command(path, command)
    }
}

impl Drop for InlineSession {
    fn drop(&mut self) {
        if self.handle.is_some() {
            let _ = self.kill_tx.send(());
            let _ = self.status_rx.recv().ok();
            self.finalize();
        }
    }
}

pub struct LaunchOptions<'a> {
    pub settings: &'a PlayerSettings,
    pub url: &'a str,
    pub title: &'a str,
    pub muted: bool,
    pub placement: Placement,
}

pub fn spawn_player(opts: LaunchOptions<'_>) -> Result<InlineSession> {
    if opts.url.trim().is_empty() {
        return Err(anyhow!("video URL missing"));
    }

    let (kill_tx, kill_rx) = bounded::<()>(1);
    let (status_tx, status_rx) = bounded::<Result<ExitStatus>>(1);

    let mpv_path = opts.settings.mpv_path.clone();
    let extra_args = opts.settings.extra_args.clone();
    let url = opts.url.to_string();
    let title = opts.title.to_string();
    let muted = opts.muted;
    let placement = opts.placement;
    let debug_enabled = player_debug_enabled();
    let ipc_path = unique_ipc_path();
    let ipc_path_for_session = ipc_path.clone();
    debug_log(format!(
        "spawning inline mpv term={}x{} at {},{} pixels={}x{} url={} ipc={}",
        placement.term_cols,
        placement.term_rows,
        placement.col,
        placement.row,
        placement.pixel_width,
        placement.pixel_height,
        url,
        ipc_path.as_deref().unwrap_or("n/a")
    ));
    #[cfg(unix)]
    if let Some(path) = &ipc_path {
        if let Err(err) = fs::remove_file(path) {
            if err.kind() != std::io::ErrorKind::NotFound && player_debug_enabled() {
                debug_log(format!("failed to remove stale mpv ipc path {path}: {err}"));
            }
        }
    }
    let ipc_arg = ipc_path
        .as_ref()
        .map(|path| format!("--input-ipc-server={path}"));
    let handle = thread::spawn(move || {
        let ipc_cleanup = ipc_path.clone();
        let result = (|| -> Result<ExitStatus> {
            let mut args = build_player_args(&url, &title, muted, placement, &extra_args);
            if let Some(arg) = &ipc_arg {
                args.push(arg.clone());
            }

            if debug_enabled {
                debug_log(format!("mpv args: {:?}", args));
            }

            let mut command = Command::new(&mpv_path);
            for arg in &args {
                command.arg(arg);
            }

            command.stdin(Stdio::null());
            #[cfg(unix)]
            {
                use std::os::unix::io::{AsRawFd, FromRawFd};

                let stdout = std::io::stdout();
                let fd = stdout.as_raw_fd();
                let dup_fd = unsafe { libc::dup(fd) };
                if dup_fd >= 0 {
                    let stdio = unsafe { Stdio::from_raw_fd(dup_fd) };
                    command.stdout(stdio);
                } else {
                    command.stdout(Stdio::inherit());
                }
            }
            #[cfg(not(unix))]
            {
                command.stdout(Stdio::inherit());
            }
            if debug_enabled {
                command.stderr(Stdio::piped());
            } else {
                command.stderr(Stdio::null());
            }

            let mut child = command
                .spawn()
                .with_context(|| format!("launch mpv to play {}", url))?;
            let mut stderr_handle = None;
            if debug_enabled {
                if let Some(stderr) = child.stderr.take() {
                    stderr_handle = Some(thread::spawn(move || {
                        let reader = BufReader::new(stderr);
                        for line in reader.lines().map_while(Result::ok) {
                            debug_log(format!("mpv stderr: {}", line));
                        }
                    }));
                }
            }

            loop {
                if kill_rx.try_recv().is_ok() {
                    let _ = child.kill();
                    let status = child.wait().context("wait for mpv after stop request")?;
                    if debug_enabled {
                        debug_log(format!("mpv stopped with status {:?}", status.code()));
                    }
                    if let Some(handle) = stderr_handle.take() {
                        let _ = handle.join();
                    }
                    return Ok(status);
                }

                match child.try_wait() {
                    Ok(Some(status)) => {
                        if debug_enabled {
                            debug_log(format!("mpv exited with status {:?}", status.code()));
                        }
                        if let Some(handle) = stderr_handle.take() {
                            let _ = handle.join();
                        }
                        return Ok(status);
                    }
                    Ok(None) => thread::sleep(Duration::from_millis(30)),
                    Err(err) => {
                        if debug_enabled {
                            debug_log(format!("mpv poll error: {}", err));
                        }
                        if let Some(handle) = stderr_handle.take() {
                            let _ = handle.join();
                        }
                        return Err(anyhow!(err)).context("poll mpv status");
                    }
                }
            }
        })();
        #[cfg(unix)]
        if let Some(path) = ipc_cleanup {
            cleanup_ipc_path(&path);
        }
        #[cfg(not(unix))]
        let _ = ipc_cleanup;

        let _ = status_tx.send(result);
    });

    Ok(InlineSession {
        kill_tx,
        status_rx,
        handle: Some(handle),
        ipc_path: ipc_path_for_session.map(Arc::new),
    })
}

fn build_player_args(
    url: &str,
    title: &str,
    muted: bool,
    placement: Placement,
    extra_args: &[String],
) -> Vec<String> {
    let mut args = Vec::new();
    args.push(url.to_string());
    args.push("--vo=kitty".to_string());
    args.push(format!("--vo-kitty-cols={}", placement.term_cols.max(1)));
    args.push(format!("--vo-kitty-rows={}", placement.term_rows.max(1)));
    let left = u32::from(placement.col).saturating_add(1);
    let top = u32::from(placement.row).saturating_add(1);
    args.push(format!("--vo-kitty-left={}", left));
    args.push(format!("--vo-kitty-top={}", top));
    args.push(format!("--vo-kitty-width={}", placement.pixel_width.max(1)));
    args.push(format!("--vo-kitty-height={}", placement.pixel_height.max(1)));
    args.push("--vo-kitty-config-clear=no".to_string());
    args.push("--force-window=no".to_string());
    args.push("--keep-open=no".to_string());
    args.push("--loop-file=inf".to_string());
    args.push("--really-quiet".to_string());
    args.push("--idle=no".to_string());
    args.push("--terminal=no".to_string());
    args.push("--input-terminal=no".to_string());
    args.push("--no-config".to_string());
    args.push("--ytdl=no".to_string());
    args.push("--osc=no".to_string());
    args.push("--osd-level=0".to_string());
    args.push("--osd-duration=0".to_string());
    args.push(format!("--mute={}", if muted { "yes" } else { "no" }));

    if !title.is_empty() {
        args.push(format!("--force-media-title={}", title));
    }

    args.extend(extra_args.iter().cloned());
    args
}

/// Maps mpv IPC event names onto the media lifecycle the playback machine
/// understands.
pub fn lifecycle_event(name: &str) -> Option<MediaEvent> {
    match name {
        "start-file" | "seek" => Some(MediaEvent::Waiting),
        "file-loaded" => Some(MediaEvent::CanPlay),
        "playback-restart" => Some(MediaEvent::Playing),
        _ => None,
    }
}

/// Tails the mpv IPC socket and forwards lifecycle events tagged with the
/// owning slot key. The thread ends when the socket closes with the
/// session.
#[cfg(unix)]
fn spawn_event_reader(path: Arc<String>, key: SlotKey, events: Sender<(SlotKey, MediaEvent)>) {
    thread::spawn(move || {
        // The socket appears shortly after mpv starts.
        let mut stream = None;
        for _ in 0..50 {
            match UnixStream::connect(path.as_str()) {
                Ok(connected) => {
                    stream = Some(connected);
                    break;
                }
                Err(_) => thread::sleep(Duration::from_millis(50)),
            }
        }
        let Some(stream) = stream else {
            debug_log(format!("mpv ipc socket never appeared at {path}"));
            return;
        };
        let reader = BufReader::new(stream);
        for line in reader.lines().map_while(Result::ok) {
            let Ok(value) = serde_json::from_str::<serde_json::Value>(&line) else {
                continue;
            };
            let Some(name) = value.get("event").and_then(|event| event.as_str()) else {
                continue;
            };
            if let Some(event) = lifecycle_event(name) {
                if events.send((key, event)).is_err() {
                    return;
                }
            }
        }
    });
}

#[cfg(not(unix))]
fn spawn_event_reader(_path: Arc<String>, _key: SlotKey, _events: Sender<(SlotKey, MediaEvent)>) {}

fn send_ipc_command(path: &str, command: PlayerCommand) -> Result<()> {
    let payload = json!({
        "command": command_payload(command),
    });
    let serialized = serde_json::to_string(&payload).context("serialize mpv command")?;
    send_ipc_command_inner(path, &serialized)
}

#[cfg(unix)]
fn send_ipc_command_inner(path: &str, serialized: &str) -> Result<()> {
    let mut stream =
        UnixStream::connect(path).with_context(|| format!("connect to mpv IPC socket {path}"))?;
    stream
        .write_all(serialized.as_bytes())
        .context("write mpv IPC command")?;
    stream
        .write_all(b"\n")
        .context("write mpv IPC command terminator")?;
    Ok(())
}

#[cfg(target_os = "windows")]
fn send_ipc_command_inner(path: &str, serialized: &str) -> Result<()> {
    use std::io::ErrorKind;

    const PIPE_RETRIES: usize = 5;
    const PIPE_RETRY_DELAY: Duration = Duration::from_millis(100);

    for attempt in 0..PIPE_RETRIES {
        match OpenOptions::new().read(true).write(true).open(path) {
            Ok(mut pipe) => {
                pipe.write_all(serialized.as_bytes())
                    .with_context(|| format!("write mpv IPC command to {path}"))?;
                pipe.write_all(b"\n")
                    .with_context(|| format!("write mpv IPC command terminator to {path}"))?;
                pipe.flush().ok();
                return Ok(());
            }
            Err(err) if err.kind() == ErrorKind::NotFound && attempt + 1 < PIPE_RETRIES => {
                thread::sleep(PIPE_RETRY_DELAY);
            }
            Err(err) => {
                return Err(anyhow!(err)).context(format!("connect to mpv IPC named pipe {path}"));
            }
        }
    }

    Err(anyhow!("connect to mpv IPC named pipe {}", path))
}

#[cfg(all(not(unix), not(target_os = "windows")))]
fn send_ipc_command_inner(_path: &str, _serialized: &str) -> Result<()> {
    Err(anyhow!(
        "Inline player controls are not supported on this platform."
    ))
}

#[cfg(unix)]
fn unique_ipc_path() -> Option<String> {
    let suffix: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(10)
        .map(char::from)
        .collect();
    let mut path = std::env::temp_dir();
    path.push(format!("reeltui-mpv-{}-{suffix}.sock", std::process::id()));
    Some(path.to_string_lossy().to_string())
}

#[cfg(target_os = "windows")]
fn unique_ipc_path() -> Option<String> {
    let suffix: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(10)
        .map(char::from)
        .collect();
    Some(format!(
        r"\\.\pipe\reeltui-mpv-{}-{suffix}",
        std::process::id()
    ))
}

#[cfg(all(not(unix), not(target_os = "windows")))]
fn unique_ipc_path() -> Option<String> {
    None
}

#[cfg(unix)]
fn cleanup_ipc_path(path: &str) {
    if let Err(err) = fs::remove_file(path) {
        if err.kind() != std::io::ErrorKind::NotFound && player_debug_enabled() {
            debug_log(format!("failed to remove mpv ipc path {path}: {err}"));
        }
    }
}

fn command_payload(command: PlayerCommand) -> serde_json::Value {
    match command {
        PlayerCommand::SetPause(paused) => json!(["set_property", "pause", paused]),
        PlayerCommand::SetMute(muted) => json!(["set_property", "mute", muted]),
    }
}

/// One slot's media surface: an mpv session spawned on first play, killed
/// on rewind so re-activation buffers fresh. A spawn or control failure is
/// the terminal's autoplay denial and surfaces as `PlayRejected`.
pub struct InlinePlayer {
    key: SlotKey,
    url: String,
    title: String,
    muted: bool,
    settings: Arc<PlayerSettings>,
    placement: Arc<parking_lot::Mutex<Placement>>,
    events: Sender<(SlotKey, MediaEvent)>,
    session: Option<InlineSession>,
}

impl InlinePlayer {
    fn emit(&self, event: MediaEvent) {
        let _ = self.events.send((self.key, event));
    }

    fn spawn(&mut self) -> Result<()> {
        let placement = *self.placement.lock();
        let session = spawn_player(LaunchOptions {
            settings: &self.settings,
            url: &self.url,
            title: &self.title,
            muted: self.muted,
            placement,
        })?;
        if let Some(path) = session.ipc_path.clone() {
            spawn_event_reader(path, self.key, self.events.clone());
        } else {
            // No IPC on this platform: no lifecycle signals will arrive, so
            // report readiness up front rather than buffering forever.
            self.emit(MediaEvent::CanPlay);
            self.emit(MediaEvent::Playing);
        }
        self.session = Some(session);
        Ok(())
    }

    /// A session whose process already exited is gone; drop it so play
    /// respawns.
    fn live_session(&mut self) -> Option<&InlineSession> {
        if let Some(session) = self.session.as_mut() {
            if session.try_status().is_some() {
                self.session = None;
            }
        }
        self.session.as_ref()
    }
}

impl MediaElement for InlinePlayer {
    fn play(&mut self) -> Result<(), PlayRejected> {
        if let Some(session) = self.live_session() {
            return session
                .send_command(PlayerCommand::SetPause(false))
                .map_err(|err| {
                    debug_log(format!("player resume rejected: {err:#}"));
                    PlayRejected
                });
        }
        self.emit(MediaEvent::Waiting);
        self.spawn().map_err(|err| {
            debug_log(format!("player spawn rejected: {err:#}"));
            PlayRejected
        })
    }

    fn pause(&mut self) {
        if let Some(session) = self.live_session() {
            if let Err(err) = session.send_command(PlayerCommand::SetPause(true)) {
                debug_log(format!("player pause failed: {err:#}"));
            }
        }
    }

    fn rewind(&mut self) {
        if let Some(session) = self.session.take() {
            let _ = session.stop_blocking();
        }
    }

    fn set_muted(&mut self, muted: bool) {
        self.muted = muted;
        if let Some(session) = self.live_session() {
            if let Err(err) = session.send_command(PlayerCommand::SetMute(muted)) {
                debug_log(format!("player mute failed: {err:#}"));
            }
        }
    }
}

impl Drop for InlinePlayer {
    fn drop(&mut self) {
        if let Some(session) = self.session.take() {
            let _ = session.stop_blocking();
        }
    }
}

/// Builds `InlinePlayer`s sharing one settings block, one placement cell
/// and one lifecycle-event channel.
pub struct PlayerFactory {
    settings: Arc<PlayerSettings>,
    placement: Arc<parking_lot::Mutex<Placement>>,
    events: Sender<(SlotKey, MediaEvent)>,
}

impl PlayerFactory {
    pub fn new(settings: PlayerSettings) -> (Self, Receiver<(SlotKey, MediaEvent)>) {
        let (events, event_rx) = crossbeam_channel::unbounded();
        (
            Self {
                settings: Arc::new(settings),
                placement: Arc::new(parking_lot::Mutex::new(Placement::default())),
                events,
            },
            event_rx,
        )
    }

    pub fn placement_cell(&self) -> Arc<parking_lot::Mutex<Placement>> {
        self.placement.clone()
    }
}

impl MediaFactory for PlayerFactory {
    fn create(&self, slot: &Slot) -> Box<dyn MediaElement> {
        Box::new(InlinePlayer {
            key: slot.key,
            url: slot.item.src.clone(),
            title: slot.item.author.clone(),
            muted: true,
            settings: self.settings.clone(),
            placement: self.placement.clone(),
            events: self.events.clone(),
            session: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn player_args_place_the_video() {
        let placement = Placement {
            col: 4,
            row: 2,
            term_cols: 80,
            term_rows: 24,
            pixel_width: 640,
            pixel_height: 360,
        };
        let args = build_player_args(
            "https://stream.test/clip.mp4",
            "@someone",
            true,
            placement,
            &[],
        );
        assert_eq!(args[0], "https://stream.test/clip.mp4");
        assert!(args.contains(&"--vo=kitty".to_string()));
        assert!(args.contains(&"--vo-kitty-left=5".to_string()));
        assert!(args.contains(&"--vo-kitty-top=3".to_string()));
        assert!(args.contains(&"--loop-file=inf".to_string()));
        assert!(args.contains(&"--mute=yes".to_string()));
        assert!(args.contains(&"--force-media-title=@someone".to_string()));
    }

    #[test]
    fn extra_args_are_appended() {
        let args = build_player_args(
            "https://stream.test/clip.mp4",
            "",
            false,
            Placement::default(),
            &["--hwdec=auto".to_string()],
        );
        assert!(args.contains(&"--mute=no".to_string()));
        assert_eq!(args.last(), Some(&"--hwdec=auto".to_string()));
        assert!(!args.iter().any(|arg| arg.starts_with("--force-media-title")));
    }

    #[test]
    fn command_payloads_match_mpv_protocol() {
        assert_eq!(
            command_payload(PlayerCommand::SetPause(true)),
            json!(["set_property", "pause", true])
        );
        assert_eq!(
            command_payload(PlayerCommand::SetMute(false)),
            json!(["set_property", "mute", false])
        );
    }

    #[test]
    fn lifecycle_events_map_to_the_machine() {
        assert_eq!(lifecycle_event("start-file"), Some(MediaEvent::Waiting));
        assert_eq!(lifecycle_event("seek"), Some(MediaEvent::Waiting));
        assert_eq!(lifecycle_event("file-loaded"), Some(MediaEvent::CanPlay));
        assert_eq!(
            lifecycle_event("playback-restart"),
            Some(MediaEvent::Playing)
        );
        assert_eq!(lifecycle_event("idle"), None);
    }

    #[test]
    fn missing_url_fails_spawn() {
        let settings = PlayerSettings {
            mpv_path: "mpv".into(),
            extra_args: Vec::new(),
        };
        let result = spawn_player(LaunchOptions {
            settings: &settings,
            url: "  ",
            title: "",
            muted: true,
            placement: Placement::default(),
        });
        assert!(result.is_err());
    }
}
