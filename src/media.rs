use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, SystemTime};

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Utc};
use crossbeam_channel::{unbounded, Receiver, Sender};
use image::ImageFormat;
use parking_lot::Mutex;
use reqwest::blocking::Client;
use sha1::{Digest, Sha1};

use crate::preload::PreloadHint;
use crate::storage::{self, MediaEntry};

#[derive(Debug, Clone)]
pub struct Config {
    pub cache_dir: Option<PathBuf>,
    pub max_size_bytes: i64,
    pub default_ttl: Duration,
    pub workers: usize,
    pub http_client: Option<Client>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            cache_dir: None,
            max_size_bytes: 500 * 1024 * 1024,
            default_ttl: Duration::from_secs(6 * 60 * 60),
            workers: 2,
            http_client: None,
        }
    }
}

/// One preload request. `hint` decides whether the body is fetched into the
/// cache or only the headers are probed.
#[derive(Debug, Clone)]
pub struct Request {
    pub url: String,
    pub hint: PreloadHint,
    pub ttl: Option<Duration>,
    pub force: bool,
}

impl Request {
    pub fn new(url: impl Into<String>, hint: PreloadHint) -> Self {
        Self {
            url: url.into(),
            hint,
            ttl: None,
            force: false,
        }
    }
}

#[derive(Debug)]
pub struct ResultEntry {
    pub entry: Option<MediaEntry>,
    pub error: Option<anyhow::Error>,
}

struct Job {
    request: Request,
    tx: Sender<ResultEntry>,
}

/// Cloneable submission side of the preload pool; the render layer holds
/// one and schedules work as the preload window moves.
#[derive(Clone)]
pub struct Handle {
    jobs: Sender<Job>,
}

impl Handle {
    pub fn enqueue(&self, request: Request) -> Receiver<ResultEntry> {
        let (tx, rx) = unbounded();
        let job = Job { request, tx };
        let _ = self.jobs.send(job);
        rx
    }
}

struct Inner {
    store: Arc<storage::Store>,
    cfg: Config,
    client: Client,
    stop: Sender<()>,
    pruning: Mutex<()>,
}

pub struct Manager {
    inner: Arc<Inner>,
    jobs: Sender<Job>,
    handles: Vec<thread::JoinHandle<()>>,
}

impl Manager {
    pub fn new(store: Arc<storage::Store>, cfg: Config) -> Result<Self> {
        let mut cfg = cfg;
        if cfg.workers == 0 {
            cfg.workers = 2;
        }
        let cache_dir = cfg
            .cache_dir
            .clone()
            .or_else(default_cache_dir)
            .context("media: cache dir not configured")?;
        fs::create_dir_all(&cache_dir)?;
        cfg.cache_dir = Some(cache_dir);

        let client = if let Some(client) = cfg.http_client.clone() {
            client
        } else {
            Client::builder()
                .timeout(Duration::from_secs(30))
                .build()
                .context("media: build http client")?
        };

        let (job_tx, job_rx) = unbounded();
        let (stop_tx, stop_rx) = unbounded();

        let inner = Arc::new(Inner {
            store,
            cfg,
            client,
            stop: stop_tx,
            pruning: Mutex::new(()),
        });

        inner.sweep_expired();

        let mut handles = Vec::new();
        for _ in 0..inner.cfg.workers {
            let rx_jobs: Receiver<Job> = job_rx.clone();
            let rx_stop = stop_rx.clone();
            let worker_inner = inner.clone();
            handles.push(thread::spawn(move || worker_inner.worker(rx_jobs, rx_stop)));
        }

        Ok(Self {
            inner,
            jobs: job_tx,
            handles,
        })
    }

    pub fn handle(&self) -> Handle {
        Handle {
            jobs: self.jobs.clone(),
        }
    }

    fn shutdown(&mut self) {
        for _ in &self.handles {
            let _ = self.inner.stop.send(());
        }
        while let Some(handle) = self.handles.pop() {
            let _ = handle.join();
        }
    }
}

impl Drop for Manager {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl Inner {
    fn worker(&self, jobs: Receiver<Job>, stop: Receiver<()>) {
        loop {
            crossbeam_channel::select! {
                recv(stop) -> _ => break,
                recv(jobs) -> msg => {
                    match msg {
                        Ok(job) => self.process(job),
                        Err(_) => break,
                    }
                }
            }
        }
    }

    fn process(&self, job: Job) {
        let result = match self.fetch(job.request) {
            Ok(entry) => ResultEntry {
                entry: Some(entry),
                error: None,
            },
            Err(err) => ResultEntry {
                entry: None,
                error: Some(err),
            },
        };
        let _ = job.tx.send(result);
    }

    fn fetch(&self, request: Request) -> Result<MediaEntry> {
        if request.url.is_empty() {
            return Err(anyhow!("media: url required"));
        }

        if let Some(entry) = self.store.get_media_entry_by_url(&request.url)? {
            if !request.force && self.is_fresh(&entry, request.ttl) && self.satisfies(&entry, request.hint) {
                return Ok(entry);
            }
        }

        match request.hint {
            PreloadHint::Full => self.download(&request),
            PreloadHint::MetadataOnly => self.probe(&request),
        }
    }

    /// A cached entry satisfies a metadata probe either way; a full preload
    /// needs the body on disk.
    fn satisfies(&self, entry: &MediaEntry, hint: PreloadHint) -> bool {
        match hint {
            PreloadHint::MetadataOnly => true,
            PreloadHint::Full => {
                !entry.file_path.is_empty() && Path::new(&entry.file_path).exists()
            }
        }
    }

    fn download(&self, request: &Request) -> Result<MediaEntry> {
        let response = self
            .client
            .get(&request.url)
            .send()
            .context("media: download")?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().unwrap_or_default();
            return Err(anyhow!("media: request failed: {} - {}", status, body));
        }

        let headers = response.headers().clone();
        let bytes = response.bytes().context("media: body")?.to_vec();
        let content_type = headers
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|val| val.to_str().ok())
            .map(|s| s.to_string())
            .unwrap_or_else(|| detect_mime(&bytes));

        let file_path = self.write_file(&bytes)?;
        let checksum = sha1_hex(&bytes);
        let size_bytes = bytes.len() as i64;
        let entry = self.build_entry(request, content_type, file_path, size_bytes, checksum);

        self.prune_if_needed(entry.size_bytes)?;
        let id = self.store.upsert_media_entry(entry.clone())?;
        Ok(MediaEntry { id, ..entry })
    }

    /// Metadata-only preload: record the content type and size without
    /// pulling the body.
    fn probe(&self, request: &Request) -> Result<MediaEntry> {
        let response = self
            .client
            .head(&request.url)
            .send()
            .context("media: probe")?;

        if !response.status().is_success() {
            return Err(anyhow!("media: probe failed: {}", response.status()));
        }

        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|val| val.to_str().ok())
            .unwrap_or("application/octet-stream")
            .to_string();

        // Probes store no body: size stays zero so the cache cap only
        // accounts for files actually on disk.
        let entry = self.build_entry(request, content_type, String::new(), 0, String::new());
        let id = self.store.upsert_media_entry(entry.clone())?;
        Ok(MediaEntry { id, ..entry })
    }

    fn build_entry(
        &self,
        request: &Request,
        media_type: String,
        file_path: String,
        size_bytes: i64,
        checksum: String,
    ) -> MediaEntry {
        let ttl = request.ttl.unwrap_or(self.cfg.default_ttl);
        let expires_at = SystemTime::now().checked_add(ttl);
        MediaEntry {
            id: 0,
            url: request.url.clone(),
            media_type,
            file_path,
            width: 0,
            height: 0,
            size_bytes,
            fetched_at: Utc::now(),
            expires_at: expires_at.map(DateTime::<Utc>::from),
            checksum,
        }
    }

    fn is_fresh(&self, entry: &MediaEntry, ttl: Option<Duration>) -> bool {
        let ttl = ttl.unwrap_or(self.cfg.default_ttl);
        if ttl.is_zero() {
            return false;
        }
        let expiry = entry.fetched_at.checked_add_signed(
            chrono::Duration::from_std(ttl).unwrap_or_else(|_| chrono::Duration::seconds(0)),
        );
        match expiry {
            Some(expiry) => Utc::now() < expiry,
            None => false,
        }
    }

    fn write_file(&self, data: &[u8]) -> Result<String> {
        let cache_dir = self
            .cfg
            .cache_dir
            .as_ref()
            .context("media: cache dir missing")?;
        let filename = format!("{}.bin", sha1_hex(data));
        let path = cache_dir.join(filename);
        fs::write(&path, data).context("media: write")?;
        Ok(path.to_string_lossy().to_string())
    }

    fn prune_if_needed(&self, new_bytes: i64) -> Result<()> {
        let _guard = self.pruning.lock();
        let mut total = self.store.total_media_size()? + new_bytes;
        if total <= self.cfg.max_size_bytes {
            return Ok(());
        }

        let mut ids = Vec::new();
        let mut paths = Vec::new();

        for entry in self.store.list_oldest_media(100)? {
            total -= entry.size_bytes;
            ids.push(entry.id);
            paths.push(entry.file_path);
            if total <= self.cfg.max_size_bytes {
                break;
            }
        }

        self.store.delete_media_entries(&ids)?;
        for path in paths {
            if !path.is_empty() {
                let _ = fs::remove_file(path);
            }
        }
        Ok(())
    }

    /// Startup sweep: expired entries and their files go before any new
    /// preload lands.
    fn sweep_expired(&self) {
        let Ok(expired) = self.store.list_expired_media(Utc::now(), 100) else {
            return;
        };
        let ids: Vec<i64> = expired.iter().map(|entry| entry.id).collect();
        if self.store.delete_media_entries(&ids).is_ok() {
            for entry in expired {
                if !entry.file_path.is_empty() {
                    let _ = fs::remove_file(entry.file_path);
                }
            }
        }
    }
}

fn default_cache_dir() -> Option<PathBuf> {
    dirs::cache_dir().map(|dir| dir.join("reel-tui"))
}

fn sha1_hex(data: &[u8]) -> String {
    let mut hasher = Sha1::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

fn detect_mime(bytes: &[u8]) -> String {
    match image::guess_format(bytes) {
        Ok(ImageFormat::Jpeg) => "image/jpeg".into(),
        Ok(ImageFormat::Png) => "image/png".into(),
        Ok(ImageFormat::Gif) => "image/gif".into(),
        Ok(ImageFormat::WebP) => "image/webp".into(),
        _ => {
            let mut buffer = [0u8; 512];
            let mut cursor = std::io::Cursor::new(bytes);
            let read = cursor.read(&mut buffer).unwrap_or(0);
            tree_magic_mini::from_u8(&buffer[..read]).to_string()
        }
    }
}
