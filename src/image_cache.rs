use std::collections::HashMap;
use std::fmt;
use std::io::Cursor;
use std::sync::{Arc, Weak};

use image::io::Reader as ImageReader;
use image::ImageFormat;
use parking_lot::Mutex;
use url::Url;
use uuid::Uuid;

use crate::api::CatalogApi;
use crate::model::ProductId;
use crate::Result;

/// A fetched product image, validated as a known image format.
pub struct ImageBlob {
    bytes: Vec<u8>,
    format: ImageFormat,
    width: u32,
    height: u32,
}

impl ImageBlob {
    /// Recognize the format and read the dimensions of `bytes`. Payloads
    /// that are not an image, or whose header is broken, are rejected.
    pub fn decode(bytes: Vec<u8>) -> Result<Self> {
        let format = image::guess_format(&bytes)?;
        let (width, height) =
            ImageReader::with_format(Cursor::new(bytes.as_slice()), format)
                .into_dimensions()?;
        Ok(Self {
            bytes,
            format,
            width,
            height,
        })
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn format(&self) -> ImageFormat {
        self.format
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }
}

impl fmt::Debug for ImageBlob {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ImageBlob")
            .field("format", &self.format)
            .field("width", &self.width)
            .field("height", &self.height)
            .field("len", &self.bytes.len())
            .finish()
    }
}

/// Non-owning view of a fetched image. Reads fail once the owning handle
/// has been released, and keeping a `BlobRef` does not keep the payload
/// alive.
#[derive(Debug, Clone)]
pub struct BlobRef(Weak<ImageBlob>);

impl BlobRef {
    /// Run `f` on the image, or return `None` if it was released.
    pub fn read<R>(&self, f: impl FnOnce(&ImageBlob) -> R) -> Option<R> {
        self.0.upgrade().map(|blob| f(&blob))
    }

    pub fn is_live(&self) -> bool {
        self.0.strong_count() > 0
    }
}

/// What a view draws for a product.
#[derive(Debug, Clone)]
pub enum ImageSource {
    Blob(BlobRef),
    Placeholder(Url),
}

type Payload = Arc<Mutex<Option<Arc<ImageBlob>>>>;

/// Outstanding blob handles by id.
#[derive(Default)]
struct Ledger {
    live: Mutex<HashMap<Uuid, Payload>>,
}

impl Ledger {
    fn forget(&self, id: &Uuid) {
        self.live.lock().remove(id);
    }
}

enum HandleKind {
    Blob(Payload),
    Placeholder(Url),
}

/// Exclusive reference to a fetched image.
///
/// A blob handle is live until it is released, either through
/// [`ImageCache::release`], [`ImageCache::release_all`] or its `Drop`. After
/// that [`ImageHandle::source`] returns `None`. Placeholder handles own
/// nothing and stay readable.
pub struct ImageHandle {
    id: Uuid,
    product_id: ProductId,
    kind: HandleKind,
    ledger: Weak<Ledger>,
}

impl ImageHandle {
    fn placeholder(product_id: ProductId, url: Url) -> Self {
        Self {
            id: Uuid::new_v4(),
            product_id,
            kind: HandleKind::Placeholder(url),
            ledger: Weak::new(),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn product_id(&self) -> ProductId {
        self.product_id
    }

    pub fn is_placeholder(&self) -> bool {
        matches!(self.kind, HandleKind::Placeholder(_))
    }

    pub fn is_live(&self) -> bool {
        match &self.kind {
            HandleKind::Blob(payload) => payload.lock().is_some(),
            HandleKind::Placeholder(_) => false,
        }
    }

    pub fn source(&self) -> Option<ImageSource> {
        match &self.kind {
            HandleKind::Blob(payload) => payload
                .lock()
                .as_ref()
                .map(|blob| ImageSource::Blob(BlobRef(Arc::downgrade(blob)))),
            HandleKind::Placeholder(url) => {
                Some(ImageSource::Placeholder(url.clone()))
            }
        }
    }

    /// Run `f` on the image while the handle is live.
    pub fn with_blob<R>(&self, f: impl FnOnce(&ImageBlob) -> R) -> Option<R> {
        self.blob().map(|blob| f(&blob))
    }

    fn blob(&self) -> Option<Arc<ImageBlob>> {
        match &self.kind {
            HandleKind::Blob(payload) => payload.lock().clone(),
            HandleKind::Placeholder(_) => None,
        }
    }

    /// Returns `true` only for the call that actually freed the blob.
    fn release_payload(&self) -> bool {
        match &self.kind {
            HandleKind::Blob(payload) => {
                if let Some(ledger) = self.ledger.upgrade() {
                    ledger.forget(&self.id);
                }
                payload.lock().take().is_some()
            }
            HandleKind::Placeholder(_) => false,
        }
    }
}

impl fmt::Debug for ImageHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ImageHandle")
            .field("id", &self.id)
            .field("product_id", &self.product_id)
            .field("placeholder", &self.is_placeholder())
            .field("live", &self.is_live())
            .finish()
    }
}

impl Drop for ImageHandle {
    fn drop(&mut self) {
        if self.release_payload() {
            log::warn!(
                "images: handle {} for product {} dropped without release",
                self.id,
                self.product_id
            );
        }
    }
}

/// Fetches product images and accounts for every handle it hands out.
pub struct ImageCache {
    api: Arc<dyn CatalogApi>,
    placeholder: Url,
    ledger: Arc<Ledger>,
}

impl ImageCache {
    pub fn new(api: Arc<dyn CatalogApi>, placeholder: Url) -> Self {
        Self {
            api,
            placeholder,
            ledger: Arc::new(Ledger::default()),
        }
    }

    /// Fetch the image of `product_id`. Any failure resolves to the default
    /// placeholder.
    pub async fn acquire(&self, product_id: ProductId) -> ImageHandle {
        self.acquire_or(product_id, &self.placeholder).await
    }

    /// Like [`ImageCache::acquire`] with a caller-chosen placeholder.
    pub async fn acquire_or(
        &self,
        product_id: ProductId,
        placeholder: &Url,
    ) -> ImageHandle {
        match self.fetch(product_id).await {
            Ok(blob) => self.register(product_id, blob),
            Err(err) => {
                log::warn!(
                    "images: no image for product {}, using placeholder: {}",
                    product_id,
                    err
                );
                ImageHandle::placeholder(product_id, placeholder.clone())
            }
        }
    }

    /// Placeholder handle without any fetch.
    pub fn placeholder(&self, product_id: ProductId) -> ImageHandle {
        ImageHandle::placeholder(product_id, self.placeholder.clone())
    }

    /// Release `handle`. Repeated calls and placeholders are no-ops; the
    /// return value tells whether this call freed anything.
    pub fn release(&self, handle: &ImageHandle) -> bool {
        let released = handle.release_payload();
        if released {
            log::debug!(
                "images: released handle {} for product {}",
                handle.id,
                handle.product_id
            );
        }
        released
    }

    /// Number of blob handles acquired and not yet released.
    pub fn live_handles(&self) -> usize {
        self.ledger.live.lock().len()
    }

    /// Release every outstanding handle. Owners keep their handles, which
    /// read as released from now on.
    pub fn release_all(&self) -> usize {
        let drained: Vec<Payload> = self
            .ledger
            .live
            .lock()
            .drain()
            .map(|(_, payload)| payload)
            .collect();
        let released = drained
            .iter()
            .filter(|payload| payload.lock().take().is_some())
            .count();
        if released > 0 {
            log::info!("images: released {} outstanding handles", released);
        }
        released
    }

    async fn fetch(&self, product_id: ProductId) -> Result<ImageBlob> {
        let bytes = self.api.product_image(product_id).await?;
        ImageBlob::decode(bytes)
    }

    fn register(&self, product_id: ProductId, blob: ImageBlob) -> ImageHandle {
        let id = Uuid::new_v4();
        log::debug!(
            "images: handle {} for product {} ({:?} {}x{})",
            id,
            product_id,
            blob.format,
            blob.width,
            blob.height
        );
        let payload: Payload = Arc::new(Mutex::new(Some(Arc::new(blob))));
        self.ledger.live.lock().insert(id, payload.clone());
        ImageHandle {
            id,
            product_id,
            kind: HandleKind::Blob(payload),
            ledger: Arc::downgrade(&self.ledger),
        }
    }
}

struct SlotState {
    generation: u64,
    current: Option<ImageHandle>,
    closed: bool,
}

/// The single image shown by one view instance.
///
/// Loading releases the previous handle before the next fetch starts, and a
/// fetch that completes after the slot moved on (a newer load, or the view
/// went away) is released on arrival. Dropping the slot releases its image.
pub struct ImageSlot {
    cache: Arc<ImageCache>,
    placeholder: Url,
    state: Mutex<SlotState>,
}

impl ImageSlot {
    pub fn new(cache: Arc<ImageCache>, placeholder: Url) -> Self {
        Self {
            cache,
            placeholder,
            state: Mutex::new(SlotState {
                generation: 0,
                current: None,
                closed: false,
            }),
        }
    }

    /// Fetch and show the image of `product_id`. Returns `false` when the
    /// result was discarded because the slot moved on meanwhile.
    pub async fn load(&self, product_id: ProductId) -> bool {
        let Some(ticket) = self.begin() else {
            return false;
        };
        let handle = self
            .cache
            .acquire_or(product_id, &self.placeholder)
            .await;
        self.install(ticket, handle)
    }

    /// Show the placeholder for a product that has no image upstream.
    pub fn show_placeholder(&self, product_id: ProductId) -> bool {
        let Some(ticket) = self.begin() else {
            return false;
        };
        let handle = ImageHandle::placeholder(product_id, self.placeholder.clone());
        self.install(ticket, handle)
    }

    /// Release the current image and invalidate fetches in flight.
    pub fn reset(&self) {
        let mut state = self.state.lock();
        state.generation += 1;
        if let Some(previous) = state.current.take() {
            self.cache.release(&previous);
        }
    }

    /// Release the image for good; later loads are ignored.
    pub fn clear(&self) {
        let mut state = self.state.lock();
        state.closed = true;
        state.generation += 1;
        if let Some(previous) = state.current.take() {
            self.cache.release(&previous);
        }
    }

    pub fn source(&self) -> Option<ImageSource> {
        self.state
            .lock()
            .current
            .as_ref()
            .and_then(ImageHandle::source)
    }

    /// Run `f` on the current image, if one is loaded and live.
    pub fn with_blob<R>(&self, f: impl FnOnce(&ImageBlob) -> R) -> Option<R> {
        let blob = self.state.lock().current.as_ref().and_then(ImageHandle::blob);
        blob.map(|blob| f(&blob))
    }

    pub fn product_id(&self) -> Option<ProductId> {
        self.state
            .lock()
            .current
            .as_ref()
            .map(ImageHandle::product_id)
    }

    pub fn is_placeholder(&self) -> bool {
        self.state
            .lock()
            .current
            .as_ref()
            .map(ImageHandle::is_placeholder)
            .unwrap_or(false)
    }

    fn begin(&self) -> Option<u64> {
        let mut state = self.state.lock();
        if state.closed {
            return None;
        }
        state.generation += 1;
        if let Some(previous) = state.current.take() {
            self.cache.release(&previous);
        }
        Some(state.generation)
    }

    fn install(&self, ticket: u64, handle: ImageHandle) -> bool {
        let mut state = self.state.lock();
        if state.closed || state.generation != ticket {
            drop(state);
            log::debug!(
                "images: discarding late image for product {}",
                handle.product_id
            );
            self.cache.release(&handle);
            return false;
        }
        state.current = Some(handle);
        true
    }
}

impl Drop for ImageSlot {
    fn drop(&mut self) {
        self.clear();
    }
}
