// texture.rs — background texture decoding with an explicit failure channel

use crate::config::AssetBase;
use crate::dispose::Disposable;
use crate::error::TextureError;

use image::io::Reader as ImageReader;
use image::RgbaImage;
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{channel, Receiver, RecvTimeoutError, Sender};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread;
use std::time::Duration;

static NEXT_TEXTURE_ID: AtomicU64 = AtomicU64::new(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TextureId(u64);

impl TextureId {
    fn next() -> Self {
        Self(NEXT_TEXTURE_ID.fetch_add(1, Ordering::Relaxed))
    }
}

#[derive(Debug, Clone)]
pub enum TextureState {
    Pending,
    Ready(Arc<RgbaImage>),
    Failed,
    Disposed,
}

/// Shared handle to a texture. Clones refer to the same pixels and state.
#[derive(Debug, Clone)]
pub struct Texture {
    id: TextureId,
    path: PathBuf,
    state: Arc<Mutex<TextureState>>,
}

impl Texture {
    fn pending(path: PathBuf) -> Self {
        Self {
            id: TextureId::next(),
            path,
            state: Arc::new(Mutex::new(TextureState::Pending)),
        }
    }

    /// Wraps already decoded pixels.
    pub fn from_image(path: impl Into<PathBuf>, image: RgbaImage) -> Self {
        let texture = Self::pending(path.into());
        *texture.lock() = TextureState::Ready(Arc::new(image));
        texture
    }

    pub fn id(&self) -> TextureId {
        self.id
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn state(&self) -> TextureState {
        self.lock().clone()
    }

    pub fn image(&self) -> Option<Arc<RgbaImage>> {
        match &*self.lock() {
            TextureState::Ready(img) => Some(img.clone()),
            _ => None,
        }
    }

    pub fn is_ready(&self) -> bool {
        matches!(*self.lock(), TextureState::Ready(_))
    }

    fn lock(&self) -> MutexGuard<'_, TextureState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Stores the decode result unless the texture was released meanwhile.
    fn resolve(&self, result: Option<RgbaImage>) {
        let mut state = self.lock();
        if matches!(*state, TextureState::Disposed) {
            return;
        }
        *state = match result {
            Some(img) => TextureState::Ready(Arc::new(img)),
            None => TextureState::Failed,
        };
    }
}

impl Disposable for Texture {
    fn dispose(&mut self) {
        *self.lock() = TextureState::Disposed;
    }

    fn is_disposed(&self) -> bool {
        matches!(*self.lock(), TextureState::Disposed)
    }
}

#[derive(Debug)]
pub enum TextureEvent {
    Loaded { id: TextureId, width: u32, height: u32 },
    Failed { id: TextureId, error: TextureError },
}

/// Spawns decode jobs. Cheap to clone; every clone reports to the same
/// [`TextureEvents`] receiver.
#[derive(Debug, Clone)]
pub struct TextureLoader {
    base: AssetBase,
    tx: Sender<TextureEvent>,
}

#[derive(Debug)]
pub struct TextureEvents {
    rx: Receiver<TextureEvent>,
}

pub fn texture_channel(base: AssetBase) -> (TextureLoader, TextureEvents) {
    let (tx, rx) = channel();
    (TextureLoader { base, tx }, TextureEvents { rx })
}

impl TextureLoader {
    pub fn base(&self) -> &AssetBase {
        &self.base
    }

    /// Returns immediately with a pending texture; pixels arrive later.
    pub fn load(&self, path: impl AsRef<Path>) -> Texture {
        let resolved = self.base.resolve(path);
        let texture = Texture::pending(resolved.clone());
        let handle = texture.clone();
        let tx = self.tx.clone();

        thread::spawn(move || {
            log::debug!("decoding texture {:?} in background", resolved);
            let event = match decode(&resolved) {
                Ok(img) => {
                    let (width, height) = img.dimensions();
                    handle.resolve(Some(img));
                    TextureEvent::Loaded { id: handle.id(), width, height }
                }
                Err(error) => {
                    handle.resolve(None);
                    TextureEvent::Failed { id: handle.id(), error }
                }
            };
            // The receiver is gone once the composer is dropped; nothing left to notify.
            let _ = tx.send(event);
        });

        texture
    }
}

impl TextureEvents {
    /// Drains every event that has arrived so far without blocking.
    pub fn poll(&self) -> Vec<TextureEvent> {
        self.rx.try_iter().collect()
    }

    pub fn wait(&self, timeout: Duration) -> Option<TextureEvent> {
        match self.rx.recv_timeout(timeout) {
            Ok(event) => Some(event),
            Err(RecvTimeoutError::Timeout | RecvTimeoutError::Disconnected) => None,
        }
    }
}

fn decode(path: &Path) -> Result<RgbaImage, TextureError> {
    let file = File::open(path).map_err(|source| TextureError::Open {
        path: path.to_path_buf(),
        source,
    })?;

    let img = ImageReader::new(BufReader::new(file))
        .with_guessed_format()
        .map_err(image::ImageError::IoError)
        .and_then(|mut r| {
            r.no_limits();
            r.decode()
        })
        .map_err(|source| TextureError::Decode {
            path: path.to_path_buf(),
            source,
        })?;

    Ok(img.to_rgba8())
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;

    fn temp_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("vr_tags_{}_{}", name, std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn missing_file_reports_failure() {
        let (loader, events) = texture_channel(AssetBase::new("/definitely/not/here"));
        let texture = loader.load("pano.jpg");
        assert!(matches!(texture.state(), TextureState::Pending | TextureState::Failed));

        match events.wait(Duration::from_secs(5)) {
            Some(TextureEvent::Failed { id, error }) => {
                assert_eq!(id, texture.id());
                assert!(matches!(error, TextureError::Open { .. }));
                assert_eq!(error.path(), &PathBuf::from("/definitely/not/here/pano.jpg"));
            }
            other => panic!("unexpected event {:?}", other),
        }
        assert!(matches!(texture.state(), TextureState::Failed));
    }

    #[test]
    fn garbage_bytes_fail_to_decode() {
        let dir = temp_dir("garbage");
        std::fs::write(dir.join("broken.png"), b"not an image").unwrap();
        let (loader, events) = texture_channel(AssetBase::new(&dir));
        loader.load("broken.png");

        match events.wait(Duration::from_secs(5)) {
            Some(TextureEvent::Failed { error, .. }) => {
                assert!(matches!(error, TextureError::Decode { .. }))
            }
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[test]
    fn png_on_disk_becomes_ready() {
        let dir = temp_dir("ready");
        let img = RgbaImage::from_pixel(4, 2, Rgba([10, 20, 30, 255]));
        img.save(dir.join("tag.png")).unwrap();

        let (loader, events) = texture_channel(AssetBase::new(&dir));
        let texture = loader.load("tag.png");

        match events.wait(Duration::from_secs(5)) {
            Some(TextureEvent::Loaded { width, height, .. }) => assert_eq!((width, height), (4, 2)),
            other => panic!("unexpected event {:?}", other),
        }
        let pixels = texture.image().unwrap();
        assert_eq!(pixels.get_pixel(3, 1), &Rgba([10, 20, 30, 255]));
        assert!(events.poll().is_empty());
    }

    #[test]
    fn dispose_is_shared_and_idempotent() {
        let mut texture = Texture::from_image("a.png", RgbaImage::new(1, 1));
        let other = texture.clone();
        texture.dispose();
        texture.dispose();
        assert!(other.is_disposed());
        assert!(other.image().is_none());

        // a late decode result must not resurrect a released texture
        other.resolve(Some(RgbaImage::new(1, 1)));
        assert!(texture.is_disposed());
    }
}
