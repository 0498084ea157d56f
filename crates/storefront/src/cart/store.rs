//! The authoritative in-memory cart store.
//!
//! All reads go through [`CartStore::state`]; all writes go through the
//! named transition operations. Transitions are synchronous critical
//! sections - no await point while the state lock is held - so under any
//! scheduling two mutations can never interleave mid-operation, and a later
//! save always reflects state at least as new as an earlier one.
//!
//! Each transition commits with an explicit persistence effect: item
//! mutations save, `clear_cart` purges, and drawer toggling deliberately
//! commits nothing (visibility is ephemeral UI state; writing a snapshot on
//! every open/close would be pure churn).

use std::sync::{Arc, Mutex, PoisonError};

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tokio::sync::watch;

use greengrocer_core::{Price, ProductId};

use super::persistence::CartPersistence;

/// One product entry in the cart with an aggregated quantity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartLineItem {
    pub id: ProductId,
    pub name: String,
    /// Unit price captured at the time the item was added.
    pub price: Price,
    /// Always at least 1; a line at quantity 0 does not exist.
    pub quantity: u32,
    #[serde(default)]
    pub image_url: Option<String>,
}

impl CartLineItem {
    /// A single unit of a product.
    #[must_use]
    pub const fn new(id: ProductId, name: String, price: Price) -> Self {
        Self {
            id,
            name,
            price,
            quantity: 1,
            image_url: None,
        }
    }

    /// Price of this line (unit price times quantity).
    #[must_use]
    pub fn line_total(&self) -> Decimal {
        self.price.line_total(self.quantity)
    }
}

/// The full cart state observed by subscribers.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartState {
    /// Line items in insertion order, at most one per product id.
    pub items: Vec<CartLineItem>,
    /// Whether the cart drawer is shown. Independent of `items` and never
    /// part of what `clear_cart` resets.
    pub is_open: bool,
}

impl CartState {
    /// Sum of all line totals.
    #[must_use]
    pub fn subtotal(&self) -> Decimal {
        self.items.iter().map(CartLineItem::line_total).sum()
    }

    /// Total unit count across all lines.
    #[must_use]
    pub fn total_quantity(&self) -> u32 {
        self.items.iter().map(|item| item.quantity).sum()
    }

    /// Whether the cart holds no items.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

/// Durable-storage effect a transition commits with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CommitEffect {
    /// Write a fresh snapshot.
    Save,
    /// Delete the durable entry entirely.
    Purge,
    /// Leave durable storage untouched.
    None,
}

/// Single source of truth for the shopping cart.
///
/// Construct one instance at the composition root and hand clones to
/// whoever mutates or observes the cart; all clones share state, the
/// subscriber channel, and the persistence adapter.
#[derive(Clone)]
pub struct CartStore {
    inner: Arc<CartStoreInner>,
}

struct CartStoreInner {
    state: Mutex<CartState>,
    watch: watch::Sender<CartState>,
    persistence: CartPersistence,
}

impl CartStore {
    /// Open the cart: hydrate from a valid persisted snapshot, or start
    /// empty.
    #[must_use]
    pub fn open(persistence: CartPersistence) -> Self {
        let state = persistence.load().unwrap_or_default();
        let (watch, _) = watch::channel(state.clone());

        Self {
            inner: Arc::new(CartStoreInner {
                state: Mutex::new(state),
                watch,
                persistence,
            }),
        }
    }

    /// Current state snapshot.
    #[must_use]
    pub fn state(&self) -> CartState {
        self.lock().clone()
    }

    /// Subscribe to state changes. The receiver always holds the latest
    /// committed state.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<CartState> {
        self.inner.watch.subscribe()
    }

    /// Sum of all line totals.
    #[must_use]
    pub fn subtotal(&self) -> Decimal {
        self.lock().subtotal()
    }

    /// Total unit count across all lines.
    #[must_use]
    pub fn total_quantity(&self) -> u32 {
        self.lock().total_quantity()
    }

    // =========================================================================
    // Transitions
    // =========================================================================

    /// Flip drawer visibility. Notifies subscribers; never writes storage.
    pub fn toggle_drawer(&self) {
        self.transition(|state| {
            state.is_open = !state.is_open;
            CommitEffect::None
        });
    }

    /// Add an item. An existing line with the same id absorbs the incoming
    /// quantity; otherwise the item is appended. A quantity of 0 is treated
    /// as 1 (the boundary rejects malformed input; the store stays total).
    pub fn add_item(&self, item: CartLineItem) {
        self.transition(|state| {
            let quantity = item.quantity.max(1);
            match state.items.iter_mut().find(|line| line.id == item.id) {
                Some(line) => line.quantity = line.quantity.saturating_add(quantity),
                None => state.items.push(CartLineItem { quantity, ..item }),
            }
            CommitEffect::Save
        });
    }

    /// Increment the quantity of the line with `id`. No-op if absent - a
    /// phantom line is never created.
    pub fn increase_quantity(&self, id: ProductId) {
        self.transition(|state| {
            match state.items.iter_mut().find(|line| line.id == id) {
                Some(line) => {
                    line.quantity = line.quantity.saturating_add(1);
                    CommitEffect::Save
                }
                None => CommitEffect::None,
            }
        });
    }

    /// Decrement the quantity of the line with `id`, clamping at 1.
    /// No-op if absent or already at 1; a line never reaches quantity 0
    /// through this operation (use [`Self::remove_item`] to delete it).
    pub fn decrease_quantity(&self, id: ProductId) {
        self.transition(|state| {
            match state.items.iter_mut().find(|line| line.id == id) {
                Some(line) if line.quantity > 1 => {
                    line.quantity -= 1;
                    CommitEffect::Save
                }
                _ => CommitEffect::None,
            }
        });
    }

    /// Delete the line with `id`. No-op if absent.
    pub fn remove_item(&self, id: ProductId) {
        self.transition(|state| {
            let before = state.items.len();
            state.items.retain(|line| line.id != id);
            if state.items.len() == before {
                CommitEffect::None
            } else {
                CommitEffect::Save
            }
        });
    }

    /// Empty the cart, leaving drawer visibility untouched. Deletes the
    /// durable entry rather than writing an empty snapshot with a fresh
    /// expiry.
    pub fn clear_cart(&self) {
        self.transition(|state| {
            state.items.clear();
            CommitEffect::Purge
        });
    }

    // =========================================================================
    // Commit
    // =========================================================================

    fn lock(&self) -> std::sync::MutexGuard<'_, CartState> {
        self.inner
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Apply a transition and commit its persistence effect.
    ///
    /// The mutation runs under the state lock; persistence and subscriber
    /// notification happen after, against the snapshot the transition
    /// produced.
    fn transition(&self, apply: impl FnOnce(&mut CartState) -> CommitEffect) {
        let (snapshot, effect) = {
            let mut state = self.lock();
            let effect = apply(&mut state);
            (state.clone(), effect)
        };

        match effect {
            CommitEffect::Save => self.inner.persistence.save(&snapshot),
            CommitEffect::Purge => self.inner.persistence.purge(),
            CommitEffect::None => {}
        }

        self.inner.watch.send_replace(snapshot);
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::cart::persistence::{CART_KEY, MemoryStore, SnapshotStore};

    fn apple() -> CartLineItem {
        CartLineItem::new(
            ProductId::new(1),
            "Apple".to_string(),
            Price::new(Decimal::new(1000, 2)).unwrap(),
        )
    }

    fn pear() -> CartLineItem {
        CartLineItem::new(
            ProductId::new(2),
            "Pear".to_string(),
            Price::new(Decimal::new(150, 2)).unwrap(),
        )
    }

    fn empty_store() -> CartStore {
        CartStore::open(CartPersistence::disabled())
    }

    fn backed_store() -> (CartStore, Arc<MemoryStore>) {
        let memory = Arc::new(MemoryStore::default());
        let store = CartStore::open(CartPersistence::new(Arc::clone(&memory) as Arc<dyn SnapshotStore>));
        (store, memory)
    }

    #[test]
    fn test_add_item_appends() {
        let store = empty_store();
        store.add_item(apple());
        store.add_item(pear());

        let state = store.state();
        assert_eq!(state.items.len(), 2);
        assert_eq!(state.items[0].name, "Apple");
        assert_eq!(state.items[1].name, "Pear");
    }

    #[test]
    fn test_add_existing_id_merges_quantity() {
        let store = empty_store();
        store.add_item(apple());
        store.add_item(CartLineItem {
            quantity: 3,
            ..apple()
        });

        let state = store.state();
        assert_eq!(state.items.len(), 1);
        assert_eq!(state.items[0].quantity, 4);
    }

    #[test]
    fn test_ids_stay_unique_under_interleaved_adds() {
        let store = empty_store();
        for _ in 0..5 {
            store.add_item(apple());
            store.add_item(pear());
        }

        let state = store.state();
        assert_eq!(state.items.len(), 2);
        assert!(state.items.iter().all(|line| line.quantity == 5));
    }

    #[test]
    fn test_zero_quantity_input_counts_as_one() {
        let store = empty_store();
        store.add_item(CartLineItem {
            quantity: 0,
            ..apple()
        });

        assert_eq!(store.state().items[0].quantity, 1);
    }

    #[test]
    fn test_add_then_increase() {
        let store = empty_store();
        store.add_item(apple());
        store.increase_quantity(ProductId::new(1));

        let state = store.state();
        assert_eq!(state.items.len(), 1);
        assert_eq!(state.items[0].quantity, 2);
        assert_eq!(state.subtotal(), Decimal::new(2000, 2));
    }

    #[test]
    fn test_increase_missing_id_creates_nothing() {
        let store = empty_store();
        store.add_item(apple());
        store.increase_quantity(ProductId::new(99));

        let state = store.state();
        assert_eq!(state.items.len(), 1);
        assert_eq!(state.items[0].quantity, 1);
    }

    #[test]
    fn test_decrease_clamps_at_one() {
        let store = empty_store();
        store.add_item(CartLineItem {
            quantity: 2,
            ..apple()
        });

        store.decrease_quantity(ProductId::new(1));
        assert_eq!(store.state().items[0].quantity, 1);

        store.decrease_quantity(ProductId::new(1));
        let state = store.state();
        assert_eq!(state.items.len(), 1, "line must not vanish at the floor");
        assert_eq!(state.items[0].quantity, 1);
    }

    #[test]
    fn test_quantity_never_below_one() {
        let store = empty_store();
        store.add_item(apple());
        for _ in 0..10 {
            store.decrease_quantity(ProductId::new(1));
        }

        assert!(store.state().items.iter().all(|line| line.quantity >= 1));
    }

    #[test]
    fn test_remove_nonexistent_is_a_no_op() {
        let store = empty_store();
        store.add_item(CartLineItem {
            quantity: 2,
            ..apple()
        });

        store.remove_item(ProductId::new(9));

        let state = store.state();
        assert_eq!(state.items.len(), 1);
        assert_eq!(state.items[0].quantity, 2);
    }

    #[test]
    fn test_remove_deletes_line() {
        let store = empty_store();
        store.add_item(apple());
        store.add_item(pear());
        store.remove_item(ProductId::new(1));

        let state = store.state();
        assert_eq!(state.items.len(), 1);
        assert_eq!(state.items[0].id, ProductId::new(2));
    }

    #[test]
    fn test_clear_is_idempotent_and_keeps_drawer() {
        let store = empty_store();
        store.toggle_drawer();
        store.add_item(apple());

        store.clear_cart();
        let first = store.state();
        assert!(first.is_empty());
        assert!(first.is_open);

        store.clear_cart();
        assert_eq!(store.state(), first);
    }

    #[test]
    fn test_mutations_persist_and_clear_purges() {
        let (store, memory) = backed_store();

        store.add_item(apple());
        assert!(memory.get(CART_KEY).is_some());

        store.clear_cart();
        assert!(
            memory.get(CART_KEY).is_none(),
            "clear must delete the entry, not save an empty snapshot"
        );
    }

    #[test]
    fn test_toggle_drawer_does_not_persist() {
        let (store, memory) = backed_store();

        store.toggle_drawer();
        assert!(store.state().is_open);
        assert!(memory.get(CART_KEY).is_none());
    }

    #[test]
    fn test_hydrates_from_persisted_snapshot() {
        let memory = Arc::new(MemoryStore::default());

        let first = CartStore::open(CartPersistence::new(Arc::clone(&memory) as Arc<dyn SnapshotStore>));
        first.add_item(apple());
        first.add_item(pear());
        drop(first);

        let second = CartStore::open(CartPersistence::new(Arc::clone(&memory) as Arc<dyn SnapshotStore>));
        let state = second.state();
        assert_eq!(state.items.len(), 2);
        assert_eq!(state.total_quantity(), 2);
    }

    #[test]
    fn test_subscribers_observe_transitions() {
        let store = empty_store();
        let rx = store.subscribe();

        store.add_item(apple());
        assert_eq!(rx.borrow().items.len(), 1);

        store.toggle_drawer();
        assert!(rx.borrow().is_open);
    }
}
