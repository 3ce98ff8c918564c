use std::collections::BTreeSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::api::CatalogApi;
use crate::model::{Product, ProductId};
use crate::StoreError;

const FETCH_ERROR_FALLBACK: &str = "Error fetching products.";

/// What became of one [`CatalogStore::refresh`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshOutcome {
    /// The response replaced the product list.
    Applied,
    /// The request failed; the error state was set and the list kept.
    Failed,
    /// A newer refresh was issued before this one answered.
    Discarded,
}

/// Either a usable product list or an error description, never both.
#[derive(Debug, Clone, PartialEq)]
pub enum CatalogStatus {
    Ready(Vec<Product>),
    Failed(String),
}

/// Listing filter: category match and the "only available" toggle.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProductFilter {
    pub category: Option<String>,
    pub available_only: bool,
}

impl ProductFilter {
    pub fn matches(&self, product: &Product) -> bool {
        let category = self
            .category
            .as_deref()
            .filter(|c| !c.is_empty())
            .map(|c| product.category == c)
            .unwrap_or(true);
        category && (!self.available_only || product.available)
    }
}

#[derive(Default)]
struct CatalogState {
    products: Vec<Product>,
    last_error: Option<String>,
}

/// Session-wide copy of the remote catalog.
pub struct CatalogStore {
    api: Arc<dyn CatalogApi>,
    state: Mutex<CatalogState>,
    issued: AtomicU64,
}

impl CatalogStore {
    pub fn new(api: Arc<dyn CatalogApi>) -> Self {
        Self {
            api,
            state: Mutex::new(CatalogState::default()),
            issued: AtomicU64::new(0),
        }
    }

    /// Fetch the full product list.
    ///
    /// Each call takes a new token; only the response carrying the latest
    /// token is applied, whatever order responses arrive in. A failure keeps
    /// the previous list and records the error message.
    pub async fn refresh(&self) -> RefreshOutcome {
        let token = self.issued.fetch_add(1, Ordering::SeqCst) + 1;
        log::debug!("catalog: refresh #{} issued", token);

        let response = self.api.list_products().await;

        let mut state = self.state.lock();
        if token != self.issued.load(Ordering::SeqCst) {
            log::debug!("catalog: discarding stale response #{}", token);
            return RefreshOutcome::Discarded;
        }
        match response {
            Ok(products) => {
                log::info!(
                    "catalog: refresh #{} loaded {} products",
                    token,
                    products.len()
                );
                state.products = products;
                state.last_error = None;
                RefreshOutcome::Applied
            }
            Err(err) => {
                log::error!("catalog: refresh #{} failed: {}", token, err);
                state.last_error = Some(error_message(&err));
                RefreshOutcome::Failed
            }
        }
    }

    /// Local-only stock change; the next refresh brings the real value.
    pub fn update_stock(&self, id: ProductId, quantity: u32) -> bool {
        let mut state = self.state.lock();
        match state.products.iter_mut().find(|p| p.id == id) {
            Some(product) => {
                product.quantity = quantity;
                true
            }
            None => {
                log::debug!("catalog: stock update for unknown product {}", id);
                false
            }
        }
    }

    /// Last successfully loaded list, kept through later failures.
    pub fn products(&self) -> Vec<Product> {
        self.state.lock().products.clone()
    }

    pub fn product(&self, id: ProductId) -> Option<Product> {
        self.state
            .lock()
            .products
            .iter()
            .find(|p| p.id == id)
            .cloned()
    }

    pub fn last_error(&self) -> Option<String> {
        self.state.lock().last_error.clone()
    }

    pub fn status(&self) -> CatalogStatus {
        let state = self.state.lock();
        match &state.last_error {
            Some(message) => CatalogStatus::Failed(message.clone()),
            None => CatalogStatus::Ready(state.products.clone()),
        }
    }

    pub fn filtered(&self, filter: &ProductFilter) -> Vec<Product> {
        self.state
            .lock()
            .products
            .iter()
            .filter(|p| filter.matches(p))
            .cloned()
            .collect()
    }

    /// Distinct non-empty categories, sorted.
    pub fn categories(&self) -> Vec<String> {
        self.state
            .lock()
            .products
            .iter()
            .filter(|p| !p.category.is_empty())
            .map(|p| p.category.clone())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }
}

fn error_message(err: &StoreError) -> String {
    let message = err.to_string();
    if message.trim().is_empty() {
        FETCH_ERROR_FALLBACK.to_owned()
    } else {
        message
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{product, FakeCatalog};
    use crate::Result;
    use rstest::rstest;
    use tokio::sync::oneshot;

    fn catalog_with(fake: FakeCatalog) -> (Arc<FakeCatalog>, Arc<CatalogStore>) {
        let fake = Arc::new(fake);
        let catalog = Arc::new(CatalogStore::new(fake.clone()));
        (fake, catalog)
    }

    #[test_log::test(tokio::test)]
    async fn successful_refresh_replaces_list() {
        let (fake, catalog) =
            catalog_with(FakeCatalog::new().with_products(vec![product(1, "A")]));

        assert_eq!(catalog.refresh().await, RefreshOutcome::Applied);
        assert_eq!(catalog.products().len(), 1);

        fake.set_products(vec![product(2, "B"), product(3, "C")]);
        assert_eq!(catalog.refresh().await, RefreshOutcome::Applied);
        let ids: Vec<_> = catalog.products().iter().map(|p| p.id).collect();
        assert_eq!(ids, vec![ProductId(2), ProductId(3)]);
        assert!(catalog.last_error().is_none());
    }

    #[test_log::test(tokio::test)]
    async fn first_load_failure_keeps_empty_list() {
        let (fake, catalog) = catalog_with(FakeCatalog::new());
        fake.fail_listing(true);

        assert_eq!(catalog.refresh().await, RefreshOutcome::Failed);
        assert!(catalog.products().is_empty());
        assert!(catalog.last_error().is_some());
        assert!(matches!(catalog.status(), CatalogStatus::Failed(_)));
    }

    #[test_log::test(tokio::test)]
    async fn failure_keeps_previous_list_until_recovery() {
        let (fake, catalog) =
            catalog_with(FakeCatalog::new().with_products(vec![product(1, "A")]));
        catalog.refresh().await;

        fake.fail_listing(true);
        assert_eq!(catalog.refresh().await, RefreshOutcome::Failed);
        assert_eq!(catalog.products().len(), 1);
        assert!(catalog.last_error().is_some());

        fake.fail_listing(false);
        assert_eq!(catalog.refresh().await, RefreshOutcome::Applied);
        assert!(catalog.last_error().is_none());
        assert_eq!(
            catalog.status(),
            CatalogStatus::Ready(vec![product(1, "A")])
        );
    }

    #[test_log::test(tokio::test)]
    async fn stale_response_is_discarded() {
        let fake = FakeCatalog::new();
        let first: oneshot::Sender<Result<Vec<Product>>> = fake.gate_list();
        let second = fake.gate_list();
        let (_, catalog) = catalog_with(fake);

        let older = tokio::spawn({
            let catalog = catalog.clone();
            async move { catalog.refresh().await }
        });
        tokio::task::yield_now().await;
        let newer = tokio::spawn({
            let catalog = catalog.clone();
            async move { catalog.refresh().await }
        });
        tokio::task::yield_now().await;

        second.send(Ok(vec![product(2, "Newer")])).unwrap();
        assert_eq!(newer.await.unwrap(), RefreshOutcome::Applied);

        first.send(Ok(vec![product(1, "Older")])).unwrap();
        assert_eq!(older.await.unwrap(), RefreshOutcome::Discarded);

        assert_eq!(catalog.products(), vec![product(2, "Newer")]);
    }

    #[test_log::test(tokio::test)]
    async fn stale_failure_does_not_set_error() {
        let fake = FakeCatalog::new();
        let first = fake.gate_list();
        let second = fake.gate_list();
        let (_, catalog) = catalog_with(fake);

        let older = tokio::spawn({
            let catalog = catalog.clone();
            async move { catalog.refresh().await }
        });
        tokio::task::yield_now().await;
        let newer = tokio::spawn({
            let catalog = catalog.clone();
            async move { catalog.refresh().await }
        });
        tokio::task::yield_now().await;

        second.send(Ok(vec![product(2, "Newer")])).unwrap();
        newer.await.unwrap();
        first
            .send(Err(StoreError::Status {
                status: 502,
                url: "http://fake/products".into(),
            }))
            .unwrap();
        assert_eq!(older.await.unwrap(), RefreshOutcome::Discarded);
        assert!(catalog.last_error().is_none());
    }

    #[test_log::test(tokio::test)]
    async fn update_stock_is_local() {
        let (fake, catalog) =
            catalog_with(FakeCatalog::new().with_products(vec![product(1, "A")]));
        catalog.refresh().await;
        let listed = fake.list_calls();

        assert!(catalog.update_stock(ProductId(1), 42));
        assert!(!catalog.update_stock(ProductId(9), 1));
        assert_eq!(catalog.product(ProductId(1)).unwrap().quantity, 42);
        assert_eq!(fake.list_calls(), listed);
    }

    #[rstest]
    #[case(None, false, 3)]
    #[case(Some("Laptop"), false, 2)]
    #[case(None, true, 2)]
    #[case(Some("Laptop"), true, 1)]
    #[case(Some(""), false, 3)]
    #[case(Some("Headphone"), false, 0)]
    fn filter_listing(
        #[case] category: Option<&str>,
        #[case] available_only: bool,
        #[case] expected: usize,
    ) {
        let mut a = product(1, "A");
        a.category = "Laptop".into();
        let mut b = product(2, "B");
        b.category = "Laptop".into();
        b.available = false;
        let mut c = product(3, "C");
        c.category = "Mobile".into();

        let filter = ProductFilter {
            category: category.map(str::to_owned),
            available_only,
        };
        let matched = [a, b, c].iter().filter(|p| filter.matches(p)).count();
        assert_eq!(matched, expected);
    }

    #[test_log::test(tokio::test)]
    async fn categories_are_distinct() {
        let mut a = product(1, "A");
        a.category = "Mobile".into();
        let mut b = product(2, "B");
        b.category = "Laptop".into();
        let mut c = product(3, "C");
        c.category = "Mobile".into();
        let (_, catalog) = catalog_with(FakeCatalog::new().with_products(vec![a, b, c]));
        catalog.refresh().await;

        assert_eq!(catalog.categories(), vec!["Laptop", "Mobile"]);
        assert_eq!(
            catalog
                .filtered(&ProductFilter {
                    category: Some("Mobile".into()),
                    available_only: false
                })
                .len(),
            2
        );
    }
}
