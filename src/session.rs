use std::sync::Arc;

use crate::api::{CatalogApi, HttpCatalog};
use crate::cart::CartStore;
use crate::catalog::{CatalogStore, RefreshOutcome};
use crate::config::Config;
use crate::detail::ProductDetailLoader;
use crate::gallery::Gallery;
use crate::image_cache::{ImageCache, ImageSlot};
use crate::model::{CartLine, ImageUpload, Product, ProductDraft, ProductId};
use crate::storage::{FileStore, KeyValueStore, PersistentStore};
use crate::Result;

/// Everything one running storefront shares: the catalog, the cart and the
/// image cache. Build it once and pass it by reference to the views.
pub struct Session {
    config: Config,
    api: Arc<dyn CatalogApi>,
    catalog: CatalogStore,
    cart: CartStore,
    images: Arc<ImageCache>,
}

impl Session {
    /// Must be called from within a Tokio runtime; the cart starts its
    /// persistence task here.
    pub fn new(
        config: Config,
        api: Arc<dyn CatalogApi>,
        storage: Arc<dyn KeyValueStore>,
    ) -> Self {
        let store = PersistentStore::new(config.cart_key.clone(), storage);
        let cart = CartStore::new(store, config.cart_key.clone());
        let catalog = CatalogStore::new(api.clone());
        let images = Arc::new(ImageCache::new(
            api.clone(),
            config.detail_placeholder.clone(),
        ));
        log::info!("session: opened against {}", config.api_root());
        Self {
            config,
            api,
            catalog,
            cart,
            images,
        }
    }

    /// Session over HTTP with the cart kept in `config.storage_dir`.
    pub fn open(config: Config) -> Result<Self> {
        let api = Arc::new(HttpCatalog::new(&config)?);
        let storage = Arc::new(FileStore::new(
            "session".to_owned(),
            &config.storage_dir,
        ));
        Ok(Self::new(config, api, storage))
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn catalog(&self) -> &CatalogStore {
        &self.catalog
    }

    pub fn cart(&self) -> &CartStore {
        &self.cart
    }

    pub fn images(&self) -> &Arc<ImageCache> {
        &self.images
    }

    pub fn products(&self) -> Vec<Product> {
        self.catalog.products()
    }

    pub fn last_error(&self) -> Option<String> {
        self.catalog.last_error()
    }

    pub fn cart_lines(&self) -> Vec<CartLine> {
        self.cart.lines()
    }

    pub fn add_to_cart(&self, product: &Product) -> u32 {
        self.cart.add_to_cart(product)
    }

    pub fn remove_from_cart(&self, id: ProductId) -> bool {
        self.cart.remove_from_cart(id)
    }

    pub fn clear_cart(&self) {
        self.cart.clear_cart()
    }

    pub async fn refresh(&self) -> RefreshOutcome {
        self.catalog.refresh().await
    }

    pub fn update_stock(&self, id: ProductId, quantity: u32) -> bool {
        self.catalog.update_stock(id, quantity)
    }

    /// Loader for a detail view, with its own image slot.
    pub fn detail_loader(&self) -> ProductDetailLoader {
        let slot = ImageSlot::new(
            self.images.clone(),
            self.config.detail_placeholder.clone(),
        );
        ProductDetailLoader::new(self.api.clone(), slot)
    }

    /// Thumbnail driver for a listing view.
    pub fn gallery(&self) -> Gallery {
        Gallery::new(
            self.images.clone(),
            self.config.thumbnail_placeholder.clone(),
        )
    }

    /// Delete upstream, then drop the cart line and reload the catalog.
    /// Nothing local changes when the remote call fails.
    pub async fn delete_product(&self, id: ProductId) -> Result<()> {
        self.api.delete_product(id).await?;
        log::info!("session: product {} deleted", id);
        self.cart.remove_from_cart(id);
        self.catalog.refresh().await;
        Ok(())
    }

    pub async fn create_product(
        &self,
        draft: &ProductDraft,
        image: Option<ImageUpload>,
    ) -> Result<()> {
        self.api.create_product(draft, image).await?;
        log::info!("session: product {:?} created", draft.name);
        self.catalog.refresh().await;
        Ok(())
    }

    pub async fn update_product(
        &self,
        id: ProductId,
        draft: &ProductDraft,
        image: Option<ImageUpload>,
    ) -> Result<()> {
        self.api.update_product(id, draft, image).await?;
        log::info!("session: product {} updated", id);
        self.catalog.refresh().await;
        Ok(())
    }

    /// Wait for the cart to reach storage and release every image handle
    /// still outstanding.
    pub async fn shutdown(self) {
        self.cart.flush().await;
        let released = self.images.release_all();
        log::info!(
            "session: closed, {} cart lines kept, {} images released",
            self.cart.len(),
            released
        );
    }
}
