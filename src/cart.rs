use parking_lot::Mutex;
use tokio::sync::{mpsc, oneshot};

use crate::model::{CartLine, Product, ProductId};
use crate::storage::PersistentStore;

enum PersistCommand {
    Snapshot(Vec<CartLine>),
    Flush(oneshot::Sender<()>),
}

/// The shopping cart of the running session.
///
/// Memory is authoritative. Every mutation queues a full snapshot for a
/// background task that writes it through the [`PersistentStore`]; callers
/// never wait for it.
pub struct CartStore {
    lines: Mutex<Vec<CartLine>>,
    persist: mpsc::UnboundedSender<PersistCommand>,
}

impl CartStore {
    /// Hydrate from `store` and start the persistence task.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn new(store: PersistentStore, key: String) -> Self {
        let stored: Vec<CartLine> = store.load(&key);
        let lines = reconcile(stored);
        log::info!("cart: hydrated {} lines from key {}", lines.len(), key);

        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(persist_loop(store, key, rx));

        Self {
            lines: Mutex::new(lines),
            persist: tx,
        }
    }

    /// Add one unit of `product`. The first add snapshots the product; later
    /// adds only bump the quantity. Returns the new line quantity.
    pub fn add_to_cart(&self, product: &Product) -> u32 {
        let mut lines = self.lines.lock();
        let quantity = match lines.iter_mut().find(|line| line.id() == product.id)
        {
            Some(line) => {
                line.quantity = line.quantity.saturating_add(1);
                line.quantity
            }
            None => {
                lines.push(CartLine {
                    product: product.clone(),
                    quantity: 1,
                });
                1
            }
        };
        log::debug!("cart: product {} quantity {}", product.id, quantity);
        self.persist(&lines);
        quantity
    }

    /// Returns whether a line was removed.
    pub fn remove_from_cart(&self, id: ProductId) -> bool {
        let mut lines = self.lines.lock();
        let before = lines.len();
        lines.retain(|line| line.id() != id);
        if lines.len() == before {
            return false;
        }
        log::debug!("cart: product {} removed", id);
        self.persist(&lines);
        true
    }

    pub fn clear_cart(&self) {
        let mut lines = self.lines.lock();
        lines.clear();
        log::debug!("cart: cleared");
        self.persist(&lines);
    }

    pub fn lines(&self) -> Vec<CartLine> {
        self.lines.lock().clone()
    }

    pub fn line(&self, id: ProductId) -> Option<CartLine> {
        self.lines
            .lock()
            .iter()
            .find(|line| line.id() == id)
            .cloned()
    }

    pub fn len(&self) -> usize {
        self.lines.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.lock().is_empty()
    }

    /// Units across all lines.
    pub fn item_count(&self) -> u32 {
        self.lines
            .lock()
            .iter()
            .map(|line| line.quantity)
            .sum()
    }

    pub fn total_price(&self) -> f64 {
        self.lines.lock().iter().map(CartLine::subtotal).sum()
    }

    /// Wait until every change made so far has been handed to storage.
    pub async fn flush(&self) {
        let (done, wait) = oneshot::channel();
        if self.persist.send(PersistCommand::Flush(done)).is_ok() {
            let _ = wait.await;
        }
    }

    // called with the lines lock held, so snapshots queue in mutation order
    fn persist(&self, lines: &[CartLine]) {
        if self
            .persist
            .send(PersistCommand::Snapshot(lines.to_vec()))
            .is_err()
        {
            log::warn!("cart: persistence task stopped, change kept in memory");
        }
    }
}

/// Merge duplicate ids and drop empty lines from stored data.
fn reconcile(stored: Vec<CartLine>) -> Vec<CartLine> {
    let mut lines: Vec<CartLine> = Vec::with_capacity(stored.len());
    for line in stored.into_iter().filter(|line| line.quantity > 0) {
        match lines.iter_mut().find(|l| l.id() == line.id()) {
            Some(existing) => {
                existing.quantity = existing.quantity.saturating_add(line.quantity)
            }
            None => lines.push(line),
        }
    }
    lines
}

async fn persist_loop(
    store: PersistentStore,
    key: String,
    mut rx: mpsc::UnboundedReceiver<PersistCommand>,
) {
    while let Some(command) = rx.recv().await {
        let mut flushes = Vec::new();
        let mut latest = None;
        match command {
            PersistCommand::Snapshot(lines) => latest = Some(lines),
            PersistCommand::Flush(done) => flushes.push(done),
        }
        // only the newest queued snapshot needs writing
        while let Ok(next) = rx.try_recv() {
            match next {
                PersistCommand::Snapshot(lines) => latest = Some(lines),
                PersistCommand::Flush(done) => flushes.push(done),
            }
        }

        if let Some(lines) = latest {
            let store = store.clone();
            let key = key.clone();
            let written = tokio::task::spawn_blocking(move || {
                store.save(&key, &lines);
                lines.len()
            })
            .await;
            match written {
                Ok(count) => log::debug!("cart: {} lines persisted", count),
                Err(err) => log::error!("cart: persistence failed: {}", err),
            }
        }
        for done in flushes {
            let _ = done.send(());
        }
    }
    log::debug!("cart: persistence task stopped");
}
