use image::RgbaImage;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::error::{VisError, VisResult};

/// Resolves an album art URI to decoded pixels. Runs on the loader thread.
pub type Fetcher = Arc<dyn Fn(&str) -> VisResult<RgbaImage> + Send + Sync>;

#[derive(Debug)]
pub enum ArtEvent {
    Loaded { uri: String, image: RgbaImage },
    Failed { uri: String, error: VisError },
}

struct Completion {
    generation: u64,
    uri: String,
    result: VisResult<RgbaImage>,
}

/// Loads album art off the main timeline.
///
/// Each request supersedes the previous one; completions are delivered
/// through [`AlbumArtLoader::poll`] and anything but the latest request is
/// dropped.
pub struct AlbumArtLoader {
    fetcher: Fetcher,
    generation: u64,
    pending: Option<u64>,
    sender: Sender<Completion>,
    receiver: Receiver<Completion>,
}

impl Default for AlbumArtLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl AlbumArtLoader {
    pub fn new() -> Self {
        Self::with_fetcher(Arc::new(fetch_art))
    }

    pub fn with_fetcher(fetcher: Fetcher) -> Self {
        let (sender, receiver) = mpsc::channel();
        Self {
            fetcher,
            generation: 0,
            pending: None,
            sender,
            receiver,
        }
    }

    /// Start loading `uri`, superseding any load in flight.
    pub fn request(&mut self, uri: &str) -> u64 {
        self.generation += 1;
        let generation = self.generation;
        self.pending = Some(generation);
        log::debug!("Requesting album art #{}: {}", generation, uri);

        let fetcher = Arc::clone(&self.fetcher);
        let sender = self.sender.clone();
        let owned_uri = uri.to_string();
        let spawned = std::thread::Builder::new()
            .name("album-art".into())
            .spawn(move || {
                let result = fetcher(&owned_uri);
                // Receiver gone means the visualizer was dropped.
                let _ = sender.send(Completion {
                    generation,
                    uri: owned_uri,
                    result,
                });
            });
        if let Err(e) = spawned {
            let _ = self.sender.send(Completion {
                generation,
                uri: uri.to_string(),
                result: Err(VisError::ArtLoad {
                    uri: uri.to_string(),
                    message: format!("failed to spawn loader thread: {}", e),
                }),
            });
        }
        generation
    }

    /// Forget the load in flight; its completion will be discarded.
    pub fn cancel(&mut self) {
        if self.pending.take().is_some() {
            log::debug!("Cancelled album art #{}", self.generation);
        }
        self.generation += 1;
    }

    pub fn is_pending(&self) -> bool {
        self.pending.is_some()
    }

    /// Drain finished loads without blocking.
    pub fn poll(&mut self) -> Option<ArtEvent> {
        let mut latest = None;
        while let Ok(completion) = self.receiver.try_recv() {
            if let Some(event) = self.accept(completion) {
                latest = Some(event);
            }
        }
        latest
    }

    /// Block up to `timeout` for the pending load.
    pub fn wait(&mut self, timeout: Duration) -> Option<ArtEvent> {
        let deadline = Instant::now() + timeout;
        while self.pending.is_some() {
            let remaining = deadline.saturating_duration_since(Instant::now());
            match self.receiver.recv_timeout(remaining) {
                Ok(completion) => {
                    if let Some(event) = self.accept(completion) {
                        return Some(event);
                    }
                }
                Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => break,
            }
        }
        None
    }

    fn accept(&mut self, completion: Completion) -> Option<ArtEvent> {
        if self.pending != Some(completion.generation) {
            log::debug!(
                "Discarding stale album art #{} ({})",
                completion.generation,
                completion.uri
            );
            return None;
        }
        self.pending = None;
        Some(match completion.result {
            Ok(image) => ArtEvent::Loaded {
                uri: completion.uri,
                image,
            },
            Err(error) => ArtEvent::Failed {
                uri: completion.uri,
                error,
            },
        })
    }
}

/// Default fetcher: `http(s)://` over the network, `file://` and plain paths
/// from disk.
pub fn fetch_art(uri: &str) -> VisResult<RgbaImage> {
    let load_error = |message: String| VisError::ArtLoad {
        uri: uri.to_string(),
        message,
    };

    let bytes = if uri.starts_with("http://") || uri.starts_with("https://") {
        let response = reqwest::blocking::get(uri)
            .and_then(|r| r.error_for_status())
            .map_err(|e| load_error(e.to_string()))?;
        response.bytes().map_err(|e| load_error(e.to_string()))?.to_vec()
    } else {
        let path = uri.strip_prefix("file://").unwrap_or(uri);
        std::fs::read(path).map_err(|e| load_error(e.to_string()))?
    };

    Ok(image::load_from_memory(&bytes)?.to_rgba8())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    const WAIT: Duration = Duration::from_secs(5);

    /// Fetcher returning an image whose width is the URI's length, so tests
    /// can tell completions apart.
    fn sized_fetcher() -> Fetcher {
        Arc::new(|uri: &str| {
            if uri.starts_with("slow") {
                std::thread::sleep(Duration::from_millis(50));
            }
            if uri == "broken" {
                return Err(VisError::ArtLoad {
                    uri: uri.to_string(),
                    message: "404".into(),
                });
            }
            Ok(RgbaImage::new(uri.len() as u32, 1))
        })
    }

    #[test]
    fn delivers_loaded_image() {
        let mut loader = AlbumArtLoader::with_fetcher(sized_fetcher());
        loader.request("cover");
        assert!(loader.is_pending());
        match loader.wait(WAIT) {
            Some(ArtEvent::Loaded { uri, image }) => {
                assert_eq!(uri, "cover");
                assert_eq!(image.width(), 5);
            }
            other => panic!("unexpected {:?}", other),
        }
        assert!(!loader.is_pending());
    }

    #[test]
    fn superseded_request_is_discarded() {
        let mut loader = AlbumArtLoader::with_fetcher(sized_fetcher());
        loader.request("slow-first");
        loader.request("second");
        match loader.wait(WAIT) {
            Some(ArtEvent::Loaded { uri, .. }) => assert_eq!(uri, "second"),
            other => panic!("unexpected {:?}", other),
        }
        std::thread::sleep(Duration::from_millis(150));
        assert!(loader.poll().is_none());
    }

    #[test]
    fn cancelled_request_never_arrives() {
        let mut loader = AlbumArtLoader::with_fetcher(sized_fetcher());
        loader.request("slow");
        loader.cancel();
        assert!(!loader.is_pending());
        std::thread::sleep(Duration::from_millis(150));
        assert!(loader.poll().is_none());
    }

    #[test]
    fn failures_are_reported() {
        let mut loader = AlbumArtLoader::with_fetcher(sized_fetcher());
        loader.request("broken");
        assert!(matches!(
            loader.wait(WAIT),
            Some(ArtEvent::Failed {
                error: VisError::ArtLoad { .. },
                ..
            })
        ));
    }

    #[test]
    fn fetcher_runs_off_thread() {
        let seen = Arc::new(Mutex::new(None));
        let seen_in_fetcher = Arc::clone(&seen);
        let mut loader = AlbumArtLoader::with_fetcher(Arc::new(move |_: &str| {
            *seen_in_fetcher.lock().unwrap() = std::thread::current().name().map(str::to_string);
            Ok(RgbaImage::new(1, 1))
        }));
        loader.request("x");
        loader.wait(WAIT).unwrap();
        assert_eq!(seen.lock().unwrap().as_deref(), Some("album-art"));
    }

    #[test]
    fn reads_files_and_file_uris() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cover.png");
        RgbaImage::from_pixel(4, 2, image::Rgba([10, 20, 30, 255]))
            .save(&path)
            .unwrap();

        let image = fetch_art(path.to_str().unwrap()).unwrap();
        assert_eq!(image.dimensions(), (4, 2));
        let uri = format!("file://{}", path.display());
        assert_eq!(fetch_art(&uri).unwrap().get_pixel(0, 0).0, [10, 20, 30, 255]);
    }

    #[test]
    fn missing_and_corrupt_files_fail() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("missing.png");
        assert!(matches!(
            fetch_art(missing.to_str().unwrap()),
            Err(VisError::ArtLoad { .. })
        ));

        let corrupt = dir.path().join("corrupt.png");
        std::fs::write(&corrupt, b"definitely not a png").unwrap();
        assert!(matches!(
            fetch_art(corrupt.to_str().unwrap()),
            Err(VisError::ArtDecode(_))
        ));
    }
}
