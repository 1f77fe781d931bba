//! Partition a normalized batch into inserts and partial updates against a catalog snapshot.

use std::collections::{HashMap, HashSet};

use pricewatch_core::{NormalizedRecord, Product, UpdateOp, NOT_AVAILABLE};
use serde::Serialize;
use tracing::debug;

use crate::identity::IdentityKey;

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct WriteSet {
    pub updates: Vec<UpdateOp>,
    pub inserts: Vec<NormalizedRecord>,
    /// Records matching a catalog entry with nothing to change.
    pub unchanged: usize,
    /// Later records repeating an identity key already seen in the batch.
    pub duplicates: usize,
}

impl WriteSet {
    pub fn is_empty(&self) -> bool {
        self.updates.is_empty() && self.inserts.is_empty()
    }
}

/// Fields of `record` that differ from `product`, or `None` when nothing changed.
///
/// Sentinel prices and a sentinel image never produce a change, so an update never
/// clears data the incoming record did not observe.
pub fn diff(product: &Product, record: &NormalizedRecord) -> Option<UpdateOp> {
    let mut op = UpdateOp::new(product.id);
    for (distributor, amount) in record.prices.observed() {
        if product.prices.get(distributor) != amount {
            op.prices.insert(distributor, amount);
        }
    }
    if record.image_url != NOT_AVAILABLE && record.image_url != product.image_url {
        op.image_url = Some(record.image_url.clone());
    }
    (!op.is_empty()).then_some(op)
}

/// Builds the write-set for one run. Output lists keep the order of `incoming`.
///
/// When the snapshot holds several products for one identity key the last one wins.
/// Within the batch the first record per key is authoritative.
pub fn reconcile(existing: &[Product], incoming: Vec<NormalizedRecord>) -> WriteSet {
    let catalog = existing
        .iter()
        .map(|p| (IdentityKey::of_product(p), p))
        .collect::<HashMap<_, _>>();
    if catalog.len() < existing.len() {
        debug!(
            products = existing.len(),
            keys = catalog.len(),
            "catalog snapshot holds duplicate identity keys"
        );
    }

    let mut seen = HashSet::with_capacity(incoming.len());
    let mut out = WriteSet::default();
    for record in incoming {
        let key = IdentityKey::of_record(&record);
        if seen.contains(&key) {
            out.duplicates += 1;
            continue;
        }
        match catalog.get(&key) {
            None => out.inserts.push(record),
            Some(product) => match diff(product, &record) {
                Some(op) => out.updates.push(op),
                None => out.unchanged += 1,
            },
        }
        seen.insert(key);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use pricewatch_core::{Distributor, DistributorPrices};
    use uuid::Uuid;

    fn product(name: &str, category_id: Uuid, prices: DistributorPrices, image: &str) -> Product {
        Product {
            id: Uuid::new_v4(),
            name: name.into(),
            image_url: image.into(),
            prices,
            category_id,
            created_at: Utc::now(),
        }
    }

    fn record(name: &str, category_id: Uuid, prices: DistributorPrices, image: &str) -> NormalizedRecord {
        NormalizedRecord {
            name: name.into(),
            image_url: image.into(),
            prices,
            category_id,
        }
    }

    fn apply(catalog: &mut Vec<Product>, set: &WriteSet) {
        for op in &set.updates {
            let target = catalog.iter_mut().find(|p| p.id == op.product_id).unwrap();
            op.apply_to(target);
        }
        for r in &set.inserts {
            catalog.push(product(&r.name, r.category_id, r.prices, &r.image_url));
        }
    }

    #[test]
    fn changed_price_emits_single_partial_update() {
        let granos = Uuid::new_v4();
        let mut prices = DistributorPrices::only(Distributor::D1, 3000);
        prices.set(Distributor::Exito, 3300);
        prices.set(Distributor::Olimpica, 3150);
        let existing = vec![product("Arroz Diana", granos, prices, "https://img/arroz.png")];

        let incoming = vec![record(
            "Arroz Diana",
            granos,
            DistributorPrices::only(Distributor::D1, 3200),
            NOT_AVAILABLE,
        )];
        let set = reconcile(&existing, incoming);

        assert!(set.inserts.is_empty());
        assert_eq!(set.updates.len(), 1);
        let op = &set.updates[0];
        assert_eq!(op.product_id, existing[0].id);
        assert_eq!(op.prices.len(), 1);
        assert_eq!(op.prices.get(&Distributor::D1), Some(&3200));
        assert_eq!(op.image_url, None);
    }

    #[test]
    fn all_sentinel_record_never_updates() {
        let cat = Uuid::new_v4();
        let existing = vec![
            product("Panela", cat, DistributorPrices::only(Distributor::Exito, 4100), "https://img/p.png"),
            product("Sal", cat, DistributorPrices::default(), NOT_AVAILABLE),
        ];
        let incoming = vec![
            record("PANELA", cat, DistributorPrices::default(), NOT_AVAILABLE),
            record("sal ", cat, DistributorPrices::default(), NOT_AVAILABLE),
        ];
        let set = reconcile(&existing, incoming);
        assert!(set.is_empty());
        assert_eq!(set.unchanged, 2);
    }

    #[test]
    fn new_image_alone_triggers_update() {
        let cat = Uuid::new_v4();
        let existing = vec![product("Sal", cat, DistributorPrices::only(Distributor::D1, 900), NOT_AVAILABLE)];
        let incoming = vec![record("Sal", cat, DistributorPrices::only(Distributor::D1, 900), "https://img/sal.png")];
        let set = reconcile(&existing, incoming);
        assert_eq!(set.updates.len(), 1);
        assert!(set.updates[0].prices.is_empty());
        assert_eq!(set.updates[0].image_url.as_deref(), Some("https://img/sal.png"));
    }

    #[test]
    fn unknown_keys_become_inserts_in_input_order() {
        let cat = Uuid::new_v4();
        let other = Uuid::new_v4();
        let existing = vec![product("Leche", cat, DistributorPrices::only(Distributor::D1, 3000), NOT_AVAILABLE)];
        let incoming = vec![
            record("Queso", cat, DistributorPrices::only(Distributor::D1, 9000), NOT_AVAILABLE),
            record("Leche", other, DistributorPrices::only(Distributor::D1, 3000), NOT_AVAILABLE),
            record("Avena", cat, DistributorPrices::only(Distributor::D1, 5000), NOT_AVAILABLE),
        ];
        let set = reconcile(&existing, incoming);
        let names = set.inserts.iter().map(|r| r.name.as_str()).collect::<Vec<_>>();
        assert_eq!(names, vec!["Queso", "Leche", "Avena"]);
        assert!(set.updates.is_empty());
    }

    #[test]
    fn repeated_keys_in_one_batch_collapse_to_first() {
        let cat = Uuid::new_v4();
        let incoming = vec![
            record("Avena", cat, DistributorPrices::only(Distributor::D1, 5000), NOT_AVAILABLE),
            record("avena ", cat, DistributorPrices::only(Distributor::D1, 5200), NOT_AVAILABLE),
        ];
        let set = reconcile(&[], incoming);
        assert_eq!(set.inserts.len(), 1);
        assert_eq!(set.inserts[0].prices.d1, 5000);
        assert_eq!(set.duplicates, 1);
    }

    #[test]
    fn last_duplicate_in_snapshot_is_the_match() {
        let cat = Uuid::new_v4();
        let older = product("Leche", cat, DistributorPrices::only(Distributor::D1, 2800), NOT_AVAILABLE);
        let newer = product("leche", cat, DistributorPrices::only(Distributor::D1, 3000), NOT_AVAILABLE);
        let incoming = vec![record("Leche", cat, DistributorPrices::only(Distributor::D1, 3000), NOT_AVAILABLE)];
        let set = reconcile(&[older, newer], incoming);
        assert!(set.is_empty());
    }

    #[test]
    fn second_pass_over_same_batch_is_a_no_op() {
        let cat = Uuid::new_v4();
        let mut catalog = vec![
            product("Leche Entera 1L", cat, DistributorPrices::only(Distributor::Exito, 3450), "https://img/a.png"),
            product("Huevos AA", cat, DistributorPrices::only(Distributor::D1, 14000), NOT_AVAILABLE),
        ];
        let batch = vec![
            record("leche entera 1l", cat, DistributorPrices::only(Distributor::D1, 3200), "https://img/b.png"),
            record("Huevos AA", cat, DistributorPrices::only(Distributor::D1, 14500), NOT_AVAILABLE),
            record("Kumis 1L", cat, DistributorPrices::only(Distributor::D1, 4200), NOT_AVAILABLE),
            record("Kumis 1L", cat, DistributorPrices::only(Distributor::D1, 4300), NOT_AVAILABLE),
        ];

        let first = reconcile(&catalog, batch.clone());
        assert_eq!(first.updates.len(), 2);
        assert_eq!(first.inserts.len(), 1);
        apply(&mut catalog, &first);

        let second = reconcile(&catalog, batch);
        assert!(second.is_empty(), "{second:?}");
        assert_eq!(catalog[0].prices.exito, 3450);
        assert_eq!(catalog[0].prices.d1, 3200);
    }
}
