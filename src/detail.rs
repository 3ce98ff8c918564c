use std::sync::Arc;

use parking_lot::Mutex;

use crate::api::CatalogApi;
use crate::image_cache::{ImageSlot, ImageSource};
use crate::model::{Product, ProductId};

#[derive(Debug, Clone, PartialEq)]
pub enum DetailState {
    Loading,
    Loaded(Product),
    /// The product could not be fetched; the caller navigates away.
    NotFound,
}

impl DetailState {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, DetailState::Loading)
    }
}

struct DetailView {
    generation: u64,
    id: Option<ProductId>,
    state: DetailState,
}

/// Backs a product detail view: one product record and its image.
pub struct ProductDetailLoader {
    api: Arc<dyn CatalogApi>,
    slot: ImageSlot,
    view: Mutex<DetailView>,
}

impl ProductDetailLoader {
    pub fn new(api: Arc<dyn CatalogApi>, slot: ImageSlot) -> Self {
        Self {
            api,
            slot,
            view: Mutex::new(DetailView {
                generation: 0,
                id: None,
                state: DetailState::Loading,
            }),
        }
    }

    /// Show product `id` and return the state it settled in.
    ///
    /// Reopening the id already shown returns its settled state without
    /// fetching again. Another id starts over: the previous image is
    /// released and a response for the old id, if still in flight, is
    /// dropped when it arrives.
    pub async fn open(&self, id: ProductId) -> DetailState {
        let ticket = {
            let mut view = self.view.lock();
            if view.id == Some(id) && view.state.is_terminal() {
                return view.state.clone();
            }
            view.generation += 1;
            view.id = Some(id);
            view.state = DetailState::Loading;
            view.generation
        };
        self.slot.reset();

        let fetched = self.api.product(id).await;

        let product = {
            let mut view = self.view.lock();
            if view.generation != ticket {
                log::debug!("detail: dropping stale response for product {}", id);
                return view.state.clone();
            }
            match fetched {
                Ok(product) => {
                    view.state = DetailState::Loaded(product.clone());
                    product
                }
                Err(err) => {
                    log::warn!("detail: product {} unavailable: {}", id, err);
                    view.state = DetailState::NotFound;
                    return DetailState::NotFound;
                }
            }
        };

        if product.has_image() {
            self.slot.load(id).await;
        } else {
            self.slot.show_placeholder(id);
        }
        DetailState::Loaded(product)
    }

    pub fn state(&self) -> DetailState {
        self.view.lock().state.clone()
    }

    pub fn product(&self) -> Option<Product> {
        match &self.view.lock().state {
            DetailState::Loaded(product) => Some(product.clone()),
            _ => None,
        }
    }

    pub fn image(&self) -> Option<ImageSource> {
        self.slot.source()
    }

    /// Release the image; the view is going away.
    pub fn close(&self) {
        let mut view = self.view.lock();
        view.generation += 1;
        view.id = None;
        view.state = DetailState::Loading;
        drop(view);
        self.slot.reset();
    }
}
