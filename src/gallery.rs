use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use futures::future::join_all;
use parking_lot::Mutex;
use url::Url;

use crate::image_cache::{ImageCache, ImageSlot, ImageSource};
use crate::model::{Product, ProductId};

struct Tile {
    image_name: Option<String>,
    slot: Arc<ImageSlot>,
}

/// Thumbnails for the product listing, one slot per listed product.
pub struct Gallery {
    cache: Arc<ImageCache>,
    placeholder: Url,
    tiles: Mutex<HashMap<ProductId, Tile>>,
}

impl Gallery {
    pub fn new(cache: Arc<ImageCache>, placeholder: Url) -> Self {
        Self {
            cache,
            placeholder,
            tiles: Mutex::new(HashMap::new()),
        }
    }

    /// Match the tiles to `products`: drop tiles of products no longer
    /// listed, then load thumbnails for new products and for products whose
    /// image reference changed. Loads run concurrently.
    pub async fn sync(&self, products: &[Product]) {
        let mut pending = Vec::new();
        {
            let mut tiles = self.tiles.lock();
            let listed: HashSet<ProductId> =
                products.iter().map(|p| p.id).collect();
            tiles.retain(|id, tile| {
                let keep = listed.contains(id);
                if !keep {
                    tile.slot.clear();
                }
                keep
            });

            for product in products {
                let unchanged = tiles
                    .get(&product.id)
                    .map(|tile| tile.image_name == product.image_name)
                    .unwrap_or(false);
                if unchanged {
                    continue;
                }

                let slot = match tiles.get(&product.id) {
                    Some(tile) => tile.slot.clone(),
                    None => Arc::new(ImageSlot::new(
                        self.cache.clone(),
                        self.placeholder.clone(),
                    )),
                };
                tiles.insert(
                    product.id,
                    Tile {
                        image_name: product.image_name.clone(),
                        slot: slot.clone(),
                    },
                );

                if product.has_image() {
                    pending.push((product.id, slot));
                } else {
                    slot.show_placeholder(product.id);
                }
            }
        }

        log::debug!("gallery: loading {} thumbnails", pending.len());
        join_all(pending.iter().map(|(id, slot)| slot.load(*id))).await;
    }

    pub fn source(&self, id: ProductId) -> Option<ImageSource> {
        let slot = self.tiles.lock().get(&id).map(|tile| tile.slot.clone())?;
        slot.source()
    }

    pub fn len(&self) -> usize {
        self.tiles.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Release every thumbnail, as when the listing goes away.
    pub fn clear(&self) {
        let tiles: Vec<Tile> =
            self.tiles.lock().drain().map(|(_, tile)| tile).collect();
        for tile in tiles {
            tile.slot.clear();
        }
    }
}

impl Drop for Gallery {
    fn drop(&mut self) {
        self.clear();
    }
}
