//! Inventory ledger: distribution-center and store balances.
//!
//! Two independent [`BalanceBook`]s keyed by (location, product). Absent
//! entries read as zero. Every mutation returns an [`InventoryTransaction`]
//! carrying the delta and the resulting balance.
//!
//! The ledger is pure balance arithmetic. It never moves stock between the
//! two books on its own; the engine pairs a distribution-center decrement at
//! dispatch with a store increment at delivery.

use crate::id::{DcId, ProductId, StoreId};
use crate::shipment::LineItem;
use crate::time::SimTime;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

// ---------------------------------------------------------------------------
// Transaction records
// ---------------------------------------------------------------------------

/// Where a balance lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Location {
    Dc(DcId),
    Store(StoreId),
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Location::Dc(dc) => dc.fmt(f),
            Location::Store(store) => store.fmt(f),
        }
    }
}

/// Why a balance changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TransactionKind {
    /// Initial stock placed before the simulation starts moving goods.
    OpeningBalance,
    /// Goods received into a distribution center.
    Receipt,
    /// Goods sold from a store.
    Sale,
    /// Goods delivered to a store by a completed shipment.
    Delivery,
    /// Goods loaded out of a distribution center onto a dispatched truck.
    DispatchOut,
}

/// One balance change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct InventoryTransaction {
    pub location: Location,
    pub product: ProductId,
    /// Signed change applied to the balance.
    pub delta: i64,
    /// Balance after the change.
    pub balance: i64,
    pub at: SimTime,
    pub kind: TransactionKind,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LedgerError {
    #[error("received quantity must be positive ({product} at {location})")]
    ZeroQuantity { location: Location, product: ProductId },
}

// ---------------------------------------------------------------------------
// BalanceBook
// ---------------------------------------------------------------------------

/// Balances keyed by (location, product). Missing entries are zero.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BalanceBook<L: Ord> {
    balances: BTreeMap<(L, ProductId), i64>,
}

impl<L: Ord> Default for BalanceBook<L> {
    fn default() -> Self {
        Self {
            balances: BTreeMap::new(),
        }
    }
}

impl<L: Ord + Copy> BalanceBook<L> {
    pub fn get(&self, location: L, product: ProductId) -> i64 {
        self.balances.get(&(location, product)).copied().unwrap_or(0)
    }

    /// Apply a signed delta and return the new balance.
    pub fn adjust(&mut self, location: L, product: ProductId, delta: i64) -> i64 {
        let balance = self.balances.entry((location, product)).or_insert(0);
        *balance = balance.saturating_add(delta);
        *balance
    }

    /// Non-zero balances in (location, product) order.
    pub fn iter(&self) -> impl Iterator<Item = (L, ProductId, i64)> + '_ {
        self.balances
            .iter()
            .filter(|&(_, &qty)| qty != 0)
            .map(|(&(location, product), &qty)| (location, product, qty))
    }

    /// Sum of all product balances at one location.
    pub fn location_total(&self, location: L) -> i64 {
        self.balances
            .iter()
            .filter(|((l, _), _)| *l == location)
            .map(|(_, &qty)| qty)
            .sum()
    }
}

// ---------------------------------------------------------------------------
// InventoryLedger
// ---------------------------------------------------------------------------

/// Distribution-center and store balances.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InventoryLedger {
    dc: BalanceBook<DcId>,
    store: BalanceBook<StoreId>,
}

impl InventoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn dc_balance(&self, dc: DcId, product: ProductId) -> i64 {
        self.dc.get(dc, product)
    }

    pub fn store_balance(&self, store: StoreId, product: ProductId) -> i64 {
        self.store.get(store, product)
    }

    pub fn dc_book(&self) -> &BalanceBook<DcId> {
        &self.dc
    }

    pub fn store_book(&self) -> &BalanceBook<StoreId> {
        &self.store
    }

    /// Place opening stock at a distribution center.
    pub fn stock_dc(
        &mut self,
        dc: DcId,
        product: ProductId,
        quantity: u32,
        at: SimTime,
    ) -> InventoryTransaction {
        let delta = quantity as i64;
        let balance = self.dc.adjust(dc, product, delta);
        InventoryTransaction {
            location: Location::Dc(dc),
            product,
            delta,
            balance,
            at,
            kind: TransactionKind::OpeningBalance,
        }
    }

    /// Place opening stock at a store.
    pub fn stock_store(
        &mut self,
        store: StoreId,
        product: ProductId,
        quantity: u32,
        at: SimTime,
    ) -> InventoryTransaction {
        let delta = quantity as i64;
        let balance = self.store.adjust(store, product, delta);
        InventoryTransaction {
            location: Location::Store(store),
            product,
            delta,
            balance,
            at,
            kind: TransactionKind::OpeningBalance,
        }
    }

    /// Receive goods into a distribution center. Quantity must be positive.
    pub fn receive(
        &mut self,
        dc: DcId,
        product: ProductId,
        quantity: u32,
        at: SimTime,
    ) -> Result<InventoryTransaction, LedgerError> {
        if quantity == 0 {
            return Err(LedgerError::ZeroQuantity {
                location: Location::Dc(dc),
                product,
            });
        }
        let delta = quantity as i64;
        let balance = self.dc.adjust(dc, product, delta);
        Ok(InventoryTransaction {
            location: Location::Dc(dc),
            product,
            delta,
            balance,
            at,
            kind: TransactionKind::Receipt,
        })
    }

    /// Sell from a store, capped at the available balance. Returns `None`
    /// when nothing can be sold.
    pub fn sell(
        &mut self,
        store: StoreId,
        product: ProductId,
        requested: u32,
        at: SimTime,
    ) -> Option<InventoryTransaction> {
        let available = self.store.get(store, product).max(0);
        let sold = (requested as i64).min(available);
        if sold == 0 {
            return None;
        }
        let balance = self.store.adjust(store, product, -sold);
        Some(InventoryTransaction {
            location: Location::Store(store),
            product,
            delta: -sold,
            balance,
            at,
            kind: TransactionKind::Sale,
        })
    }

    /// Credit a store with delivered line items. One transaction per
    /// non-empty line.
    pub fn deliver(
        &mut self,
        store: StoreId,
        items: &[LineItem],
        at: SimTime,
    ) -> Vec<InventoryTransaction> {
        items
            .iter()
            .filter(|item| item.quantity > 0)
            .map(|item| {
                let delta = item.quantity as i64;
                let balance = self.store.adjust(store, item.product, delta);
                InventoryTransaction {
                    location: Location::Store(store),
                    product: item.product,
                    delta,
                    balance,
                    at,
                    kind: TransactionKind::Delivery,
                }
            })
            .collect()
    }

    /// Debit a distribution center for line items loaded onto a truck. The
    /// balance is allowed to go negative; callers decide whether to flag it.
    pub fn dispatch_out(
        &mut self,
        dc: DcId,
        items: &[LineItem],
        at: SimTime,
    ) -> Vec<InventoryTransaction> {
        items
            .iter()
            .filter(|item| item.quantity > 0)
            .map(|item| {
                let delta = -(item.quantity as i64);
                let balance = self.dc.adjust(dc, item.product, delta);
                InventoryTransaction {
                    location: Location::Dc(dc),
                    product: item.product,
                    delta,
                    balance,
                    at,
                    kind: TransactionKind::DispatchOut,
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const T: SimTime = SimTime(3_600);

    #[test]
    fn absent_balance_reads_zero() {
        let ledger = InventoryLedger::new();
        assert_eq!(ledger.dc_balance(DcId(1), ProductId(1)), 0);
        assert_eq!(ledger.store_balance(StoreId(1), ProductId(1)), 0);
    }

    #[test]
    fn receive_increases_dc_balance() {
        let mut ledger = InventoryLedger::new();
        ledger.receive(DcId(1), ProductId(1), 40, T).unwrap();
        let tx = ledger.receive(DcId(1), ProductId(1), 10, T).unwrap();
        assert_eq!(tx.delta, 10);
        assert_eq!(tx.balance, 50);
        assert_eq!(tx.kind, TransactionKind::Receipt);
        assert_eq!(tx.location, Location::Dc(DcId(1)));
    }

    #[test]
    fn receive_zero_is_rejected() {
        let mut ledger = InventoryLedger::new();
        let err = ledger.receive(DcId(2), ProductId(3), 0, T).unwrap_err();
        assert!(matches!(err, LedgerError::ZeroQuantity { .. }));
        assert_eq!(ledger.dc_balance(DcId(2), ProductId(3)), 0);
    }

    #[test]
    fn sell_caps_at_available() {
        let mut ledger = InventoryLedger::new();
        ledger.stock_store(StoreId(1), ProductId(1), 5, T);
        let tx = ledger.sell(StoreId(1), ProductId(1), 8, T).unwrap();
        assert_eq!(tx.delta, -5);
        assert_eq!(tx.balance, 0);
        assert_eq!(ledger.store_balance(StoreId(1), ProductId(1)), 0);
    }

    #[test]
    fn sell_with_nothing_available_produces_no_transaction() {
        let mut ledger = InventoryLedger::new();
        assert!(ledger.sell(StoreId(1), ProductId(1), 3, T).is_none());
        ledger.stock_store(StoreId(1), ProductId(1), 2, T);
        assert!(ledger.sell(StoreId(1), ProductId(1), 0, T).is_none());
    }

    #[test]
    fn deliver_credits_each_line() {
        let mut ledger = InventoryLedger::new();
        let items = [
            LineItem::new(ProductId(1), 30),
            LineItem::new(ProductId(2), 0),
            LineItem::new(ProductId(3), 12),
        ];
        let txs = ledger.deliver(StoreId(9), &items, T);
        assert_eq!(txs.len(), 2);
        assert!(txs.iter().all(|tx| tx.kind == TransactionKind::Delivery));
        assert_eq!(ledger.store_balance(StoreId(9), ProductId(1)), 30);
        assert_eq!(ledger.store_balance(StoreId(9), ProductId(3)), 12);
    }

    #[test]
    fn dispatch_out_debits_dc_only() {
        let mut ledger = InventoryLedger::new();
        ledger.stock_dc(DcId(1), ProductId(1), 100, T);
        let txs = ledger.dispatch_out(DcId(1), &[LineItem::new(ProductId(1), 60)], T);
        assert_eq!(txs[0].delta, -60);
        assert_eq!(txs[0].balance, 40);
        assert_eq!(ledger.store_book().iter().count(), 0);
    }

    #[test]
    fn dispatch_out_may_go_negative() {
        let mut ledger = InventoryLedger::new();
        let txs = ledger.dispatch_out(DcId(1), &[LineItem::new(ProductId(1), 5)], T);
        assert_eq!(txs[0].balance, -5);
    }

    #[test]
    fn location_total_sums_products() {
        let mut ledger = InventoryLedger::new();
        ledger.stock_store(StoreId(1), ProductId(1), 3, T);
        ledger.stock_store(StoreId(1), ProductId(2), 4, T);
        ledger.stock_store(StoreId(2), ProductId(1), 100, T);
        assert_eq!(ledger.store_book().location_total(StoreId(1)), 7);
    }
}
