//! In-crate fakes shared by the unit tests.

use std::collections::{HashMap, VecDeque};
use std::io::Cursor;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use anyhow::anyhow;
use async_trait::async_trait;
use chrono::NaiveDate;
use image::{DynamicImage, ImageOutputFormat, Rgb, RgbImage};
use parking_lot::Mutex;
use tokio::sync::oneshot;

use crate::api::CatalogApi;
use crate::model::{ImageUpload, Product, ProductDraft, ProductId};
use crate::storage::KeyValueStore;
use crate::{Result, StoreError};

/// Product priced at 10.0 with 5 units in stock and no image.
pub(crate) fn product(id: u64, name: &str) -> Product {
    Product {
        id: ProductId(id),
        name: name.to_owned(),
        brand: "Acme".to_owned(),
        category: "Misc".to_owned(),
        description: format!("{} description", name),
        price: 10.0,
        quantity: 5,
        available: true,
        release_date: NaiveDate::from_ymd_opt(2024, 1, 15),
        image_name: None,
    }
}

/// A 2x2 PNG.
pub(crate) fn png_bytes() -> Vec<u8> {
    let img = RgbImage::from_pixel(2, 2, Rgb([200, 40, 40]));
    let mut out = Cursor::new(Vec::new());
    DynamicImage::ImageRgb8(img)
        .write_to(&mut out, ImageOutputFormat::Png)
        .unwrap();
    out.into_inner()
}

/// Storage that refuses every operation, like disabled local storage.
pub(crate) struct Unavailable;

impl KeyValueStore for Unavailable {
    fn get(&self, _key: &str) -> Result<Option<String>> {
        Err(StoreError::Storage("test".into(), "disabled".into()))
    }

    fn set(&self, _key: &str, _value: &str) -> Result<()> {
        Err(StoreError::Storage("test".into(), "quota exceeded".into()))
    }

    fn remove(&self, _key: &str) -> Result<()> {
        Err(StoreError::Storage("test".into(), "disabled".into()))
    }
}

type ListReply = Result<Vec<Product>>;

/// Recorded create or update call.
#[derive(Debug, Clone)]
pub(crate) struct SavedDraft {
    pub id: Option<ProductId>,
    pub draft: ProductDraft,
    pub image: Option<String>,
}

/// Catalog held in memory. Listing and image replies can be held back with
/// gates to control the order responses arrive in.
#[derive(Default)]
pub(crate) struct FakeCatalog {
    products: Mutex<Vec<Product>>,
    images: Mutex<HashMap<ProductId, Vec<u8>>>,
    list_gates: Mutex<VecDeque<oneshot::Receiver<ListReply>>>,
    image_gate: Mutex<Option<oneshot::Receiver<()>>>,
    fail_list: AtomicBool,
    list_calls: AtomicUsize,
    product_calls: AtomicUsize,
    image_calls: AtomicUsize,
    deleted: Mutex<Vec<ProductId>>,
    saved: Mutex<Vec<SavedDraft>>,
}

impl FakeCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_products(self, products: Vec<Product>) -> Self {
        self.set_products(products);
        self
    }

    pub fn with_image(self, id: u64, bytes: Vec<u8>) -> Self {
        self.images.lock().insert(ProductId(id), bytes);
        self
    }

    pub fn set_products(&self, products: Vec<Product>) {
        *self.products.lock() = products;
    }

    pub fn fail_listing(&self, fail: bool) {
        self.fail_list.store(fail, Ordering::SeqCst);
    }

    /// The next ungated listing call waits for the returned sender and
    /// answers with whatever is sent.
    pub fn gate_list(&self) -> oneshot::Sender<ListReply> {
        let (tx, rx) = oneshot::channel();
        self.list_gates.lock().push_back(rx);
        tx
    }

    /// The next image call waits until the returned sender fires.
    pub fn gate_image(&self) -> oneshot::Sender<()> {
        let (tx, rx) = oneshot::channel();
        *self.image_gate.lock() = Some(rx);
        tx
    }

    pub fn list_calls(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }

    pub fn product_calls(&self) -> usize {
        self.product_calls.load(Ordering::SeqCst)
    }

    pub fn image_calls(&self) -> usize {
        self.image_calls.load(Ordering::SeqCst)
    }

    pub fn deleted(&self) -> Vec<ProductId> {
        self.deleted.lock().clone()
    }

    pub fn saved(&self) -> Vec<SavedDraft> {
        self.saved.lock().clone()
    }
}

fn apply_draft(product: &mut Product, draft: &ProductDraft) {
    product.name = draft.name.clone();
    product.brand = draft.brand.clone();
    product.category = draft.category.clone();
    product.description = draft.description.clone();
    product.price = draft.price;
    product.quantity = draft.quantity;
    product.available = draft.available;
    product.release_date = draft.release_date;
}

#[async_trait]
impl CatalogApi for FakeCatalog {
    async fn list_products(&self) -> Result<Vec<Product>> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        let gate = self.list_gates.lock().pop_front();
        if let Some(gate) = gate {
            return gate
                .await
                .map_err(|_| StoreError::Other(anyhow!("list gate dropped")))?;
        }
        if self.fail_list.load(Ordering::SeqCst) {
            return Err(StoreError::Status {
                status: 503,
                url: "http://fake/products".to_owned(),
            });
        }
        Ok(self.products.lock().clone())
    }

    async fn product(&self, id: ProductId) -> Result<Product> {
        self.product_calls.fetch_add(1, Ordering::SeqCst);
        self.products
            .lock()
            .iter()
            .find(|p| p.id == id)
            .cloned()
            .ok_or(StoreError::NotFound(id))
    }

    async fn product_image(&self, id: ProductId) -> Result<Vec<u8>> {
        self.image_calls.fetch_add(1, Ordering::SeqCst);
        let gate = self.image_gate.lock().take();
        if let Some(gate) = gate {
            let _ = gate.await;
        }
        self.images
            .lock()
            .get(&id)
            .cloned()
            .ok_or(StoreError::NotFound(id))
    }

    async fn delete_product(&self, id: ProductId) -> Result<()> {
        let mut products = self.products.lock();
        let before = products.len();
        products.retain(|p| p.id != id);
        if products.len() == before {
            return Err(StoreError::NotFound(id));
        }
        self.images.lock().remove(&id);
        self.deleted.lock().push(id);
        Ok(())
    }

    async fn create_product(
        &self,
        draft: &ProductDraft,
        image: Option<ImageUpload>,
    ) -> Result<()> {
        let mut products = self.products.lock();
        let id = products.iter().map(|p| p.id.0).max().unwrap_or(0) + 1;
        let mut created = product(id, &draft.name);
        apply_draft(&mut created, draft);
        if let Some(upload) = &image {
            created.image_name = Some(upload.file_name.clone());
            self.images.lock().insert(ProductId(id), upload.bytes.clone());
        }
        products.push(created);
        self.saved.lock().push(SavedDraft {
            id: None,
            draft: draft.clone(),
            image: image.map(|upload| upload.file_name),
        });
        Ok(())
    }

    async fn update_product(
        &self,
        id: ProductId,
        draft: &ProductDraft,
        image: Option<ImageUpload>,
    ) -> Result<()> {
        let mut products = self.products.lock();
        let existing = products
            .iter_mut()
            .find(|p| p.id == id)
            .ok_or(StoreError::NotFound(id))?;
        apply_draft(existing, draft);
        if let Some(upload) = &image {
            existing.image_name = Some(upload.file_name.clone());
            self.images.lock().insert(id, upload.bytes.clone());
        }
        self.saved.lock().push(SavedDraft {
            id: Some(id),
            draft: draft.clone(),
            image: image.map(|upload| upload.file_name),
        });
        Ok(())
    }
}
