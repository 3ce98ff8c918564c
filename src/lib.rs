pub mod api;
pub mod cart;
pub mod catalog;
pub mod config;
pub mod detail;
mod errors;
pub mod gallery;
pub mod image_cache;
pub mod model;
pub mod session;
pub mod storage;

#[cfg(test)]
pub(crate) mod testing;

pub use api::{CatalogApi, HttpCatalog};
pub use cart::CartStore;
pub use catalog::{CatalogStatus, CatalogStore, ProductFilter, RefreshOutcome};
pub use config::Config;
pub use detail::{DetailState, ProductDetailLoader};
pub use errors::{ErrorKind, Result, StoreError};
pub use gallery::Gallery;
pub use image_cache::{
    BlobRef, ImageBlob, ImageCache, ImageHandle, ImageSlot, ImageSource,
};
pub use model::{CartLine, ImageUpload, Product, ProductDraft, ProductId};
pub use session::Session;
pub use storage::{FileStore, KeyValueStore, MemoryStore, PersistentStore};

pub const STOREFRONT_FOLDER: &str = ".storefront";
pub const CART_STORAGE_KEY: &str = "cart";
