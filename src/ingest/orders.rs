use std::collections::HashMap;

use rust_decimal::Decimal;
use uuid::Uuid;

use super::{field, log_batch, on_duplicate, parse_rows, BulkIngestion, ImportOptions, ImportReport, ImportSource, Origin, Plan, Row};
use crate::access::Identity;
use crate::domain::aggregates::{NewOrder, NewOrderItem, Order, OrderPatch};
use crate::domain::value_objects::{Money, Sku};
use crate::{FulfillmentError, Result};

const KIND: &str = "orders";

/// Columns understood in text input, in positional order. Rows sharing the
/// external order id, customer name and address are items of one order.
pub const COLUMNS: &[&str] = &[
    "externalOrderId",
    "customerName",
    "customerAddress",
    "customerPhone",
    "sku",
    "productId",
    "quantity",
    "unitPrice",
    "totalAmount",
    "merchantId",
];

impl<'a> BulkIngestion<'a> {
    /// Imports orders for `merchant_id` (the caller's own business for merchants).
    /// Existing orders are matched on external order id within the merchant.
    pub async fn import_orders(
        &self,
        identity: &Identity,
        source: ImportSource<NewOrder>,
        options: ImportOptions,
        merchant_id: Option<Uuid>,
    ) -> Result<ImportReport<Order>> {
        let (_, merchant) = self.begin(identity, merchant_id)?;

        let candidates: Vec<(Origin, std::result::Result<NewOrder, Vec<String>>)> = match source {
            ImportSource::Records { records } => {
                records.into_iter().enumerate().map(|(i, r)| (Origin::at(i + 1), Ok(r))).collect()
            }
            ImportSource::Text { text, format } => {
                let rows = parse_rows(&text, format, COLUMNS)?;
                let mut out = vec![];
                for (i, group) in group_rows(&rows).into_iter().enumerate() {
                    let origin = Origin {
                        record: i + 1,
                        lines: group.iter().map(|r| r.line).collect(),
                        key: group[0].get("externalOrderId").map(str::to_string),
                    };
                    out.push((origin, self.order_from_rows(&group).await?));
                }
                out
            }
        };

        if let Some((origin, _)) = candidates.iter().find(|(_, c)| {
            matches!(c, Ok(o) if o.merchant_id.is_some_and(|m| m != merchant))
        }) {
            return Err(FulfillmentError::Permission(format!(
                "Record {} targets another merchant than {merchant}",
                origin.record
            )));
        }

        let lifecycle = self.ctx.orders();
        let mut plans = Vec::with_capacity(candidates.len());
        let mut seen: HashMap<String, usize> = HashMap::new();
        for (mut origin, candidate) in candidates {
            let new = match candidate {
                Ok(new) => new,
                Err(problems) => { plans.push((origin, Plan::Reject(problems))); continue; }
            };
            let mut problems = new.problems();
            problems.extend(lifecycle.item_problems(&new, merchant).await?);
            if !problems.is_empty() {
                plans.push((origin, Plan::Reject(problems)));
                continue;
            }
            let Some(ext) = new.external_id().map(str::to_string) else {
                plans.push((origin, Plan::Create(new)));
                continue;
            };
            origin.key = Some(ext.clone());
            if let Some(first) = seen.get(&ext) {
                let plan = on_duplicate(options, format!("externalOrderId {ext} repeats record {first}"));
                plans.push((origin, plan));
                continue;
            }
            seen.insert(ext.clone(), origin.record);

            let plan = match self.ctx.store.find_order_by_external_id(merchant, &ext).await? {
                None => Plan::Create(new),
                Some(existing) if options.update_existing && existing.status.is_terminal() => {
                    Plan::Reject(vec![format!("Order {ext} is already {} and cannot be updated", existing.status)])
                }
                Some(existing) if options.update_existing => Plan::Update((existing, new)),
                Some(_) => on_duplicate(options, format!("An order with externalOrderId {ext} already exists")),
            };
            plans.push((origin, plan));
        }

        let (mut report, accepted) = self.decide(KIND, options, plans)?;
        if options.validate_only {
            return Ok(report);
        }

        let mut batches = 0;
        for (n, batch) in accepted.chunks(self.batch_size()).enumerate() {
            log_batch(KIND, n + 1, batch.len());
            batches += 1;
            for (origin, plan) in batch {
                let result = match plan {
                    Plan::Create(new) => lifecycle.insert(new, merchant).await.map(|(mut order, _)| {
                        // The run's audit entry stands in for per-order events.
                        order.take_events();
                        (order, false)
                    }),
                    Plan::Update((existing, new)) => self.update_order_record(identity, existing.clone(), new).await.map(|o| (o, true)),
                    Plan::Skip | Plan::Reject(_) => continue,
                };
                report.outcome(origin, result);
            }
        }
        Ok(self.finish(identity, KIND, merchant, options, batches, report).await)
    }

    /// Only customer details and the total are refreshed; items never change.
    async fn update_order_record(&self, identity: &Identity, mut order: Order, new: &NewOrder) -> Result<Order> {
        let patch = OrderPatch {
            customer_name: Some(new.customer_name.clone()),
            customer_address: Some(new.customer_address.clone()),
            customer_phone: new.customer_phone.clone(),
            total_amount: new.total_amount,
            ..Default::default()
        };
        order.apply_details(&patch, identity.user_id)?;
        order.take_events();
        self.ctx.store.update_order(&order).await?;
        Ok(order)
    }

    /// Builds one order from its rows. Items name their product by id or by SKU.
    async fn order_from_rows(&self, rows: &[&Row]) -> Result<std::result::Result<NewOrder, Vec<String>>> {
        let head = rows[0];
        let mut problems = vec![];
        let total = field::<Decimal>(head, "totalAmount", &mut problems);
        let merchant_id = match head.get("merchantId").map(Uuid::parse_str) {
            None => None,
            Some(Ok(id)) => Some(id),
            Some(Err(_)) => {
                problems.push("merchantId must be a UUID".to_string());
                None
            }
        };

        let mut items = Vec::with_capacity(rows.len());
        for row in rows {
            let quantity = field::<i64>(row, "quantity", &mut problems);
            let price = field::<Decimal>(row, "unitPrice", &mut problems);
            let product_id = match (row.get("productId"), row.get("sku")) {
                (Some(raw), _) => match Uuid::parse_str(raw) {
                    Ok(id) => Some(id),
                    Err(_) => {
                        problems.push(format!("line {}: productId must be a UUID", row.line));
                        None
                    }
                },
                (None, Some(raw)) => match Sku::new(raw) {
                    Ok(sku) => match self.ctx.store.find_product_by_sku(&sku).await? {
                        Some(p) => Some(p.id),
                        None => {
                            problems.push(format!("line {}: unknown SKU {sku}", row.line));
                            None
                        }
                    },
                    Err(e) => {
                        problems.push(format!("line {}: {e}", row.line));
                        None
                    }
                },
                (None, None) => {
                    problems.push(format!("line {}: productId or sku is required", row.line));
                    None
                }
            };
            if let Some(product_id) = product_id {
                items.push(NewOrderItem { product_id, quantity: quantity.unwrap_or(0), unit_price: price.map(Money::new) });
            }
        }

        if !problems.is_empty() {
            return Ok(Err(problems));
        }
        Ok(Ok(NewOrder {
            external_order_id: head.get("externalOrderId").map(str::to_string),
            customer_name: head.text("customerName"),
            customer_address: head.text("customerAddress"),
            customer_phone: head.get("customerPhone").map(str::to_string),
            total_amount: total.map(Money::new),
            order_date: None,
            merchant_id,
            items,
        }))
    }
}

/// Groups rows by external order id, customer name and address, keeping first-seen order.
fn group_rows(rows: &[Row]) -> Vec<Vec<&Row>> {
    let mut index: HashMap<(&str, &str, &str), usize> = HashMap::new();
    let mut groups: Vec<Vec<&Row>> = vec![];
    for row in rows {
        let key = (
            row.get("externalOrderId").unwrap_or_default(),
            row.get("customerName").unwrap_or_default(),
            row.get("customerAddress").unwrap_or_default(),
        );
        match index.get(&key) {
            Some(&i) => groups[i].push(row),
            None => {
                index.insert(key, groups.len());
                groups.push(vec![row]);
            }
        }
    }
    groups
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::access::Role;
    use crate::domain::aggregates::{NewProduct, OrderStatus};
    use crate::ingest::TextFormat;
    use crate::services::Fulfillment;
    use crate::store::{InMemoryStore, Store};
    use std::sync::Arc;

    struct World {
        store: Arc<InMemoryStore>,
        ctx: Fulfillment,
        merchant: Identity,
        product: Uuid,
    }

    async fn world() -> World {
        let store = Arc::new(InMemoryStore::new());
        let ctx = Fulfillment::with_store(store.clone());
        let merchant = Identity::new(Uuid::new_v4(), Role::Merchant, Some(Uuid::new_v4()));
        let np = NewProduct { name: "Desk Lamp".into(), sku: Some("LAMP-1".into()), weight: 1.5, ..Default::default() };
        let product = ctx.catalog().create_product(&merchant, np).await.unwrap().product.id;
        World { store, ctx, merchant, product }
    }

    fn order(ext: &str, product_id: Uuid, quantity: i64) -> NewOrder {
        NewOrder {
            external_order_id: Some(ext.into()),
            customer_name: "Ada".into(),
            customer_address: "1 Marina, Lagos".into(),
            items: vec![NewOrderItem { product_id, quantity, unit_price: None }],
            ..Default::default()
        }
    }

    fn records(list: Vec<NewOrder>) -> ImportSource<NewOrder> {
        ImportSource::Records { records: list }
    }

    #[tokio::test]
    async fn test_one_bad_order_among_five() {
        let w = world().await;
        let batch = (1..=5).map(|i| order(&format!("EXT-{i}"), w.product, if i == 3 { 0 } else { 2 })).collect();
        let report = w.ctx.ingest().import_orders(&w.merchant, records(batch), ImportOptions::default(), None).await.unwrap();
        assert_eq!(report.summary.created, 4);
        assert_eq!(report.summary.errors, 1);
        assert_eq!(report.errors[0].record, 3);
        assert_eq!(w.store.order_count().await, 4);
        assert!(report.created.iter().all(|o| o.status == OrderStatus::New));

        let audit = w.store.audit_entries().await;
        assert_eq!(audit.iter().filter(|e| e.entity_type == "BulkImport").count(), 1);
        assert_eq!(audit.iter().filter(|e| e.entity_type == "Order").count(), 0);
    }

    #[tokio::test]
    async fn test_small_batches_commit_everything() {
        let store = Arc::new(InMemoryStore::new());
        let mut settings = crate::services::Settings::from(&crate::config::Config::default());
        settings.bulk_batch_size = 2;
        let ctx = Fulfillment::new(store.clone(), Arc::new(crate::notify::LogNotifier), settings);
        let merchant = Identity::new(Uuid::new_v4(), Role::Merchant, Some(Uuid::new_v4()));
        let np = NewProduct { name: "Kettle".into(), weight: 1.0, ..Default::default() };
        let product = ctx.catalog().create_product(&merchant, np).await.unwrap().product.id;

        let batch = (1..=5).map(|i| order(&format!("K-{i}"), product, 1)).collect();
        let report = ctx.ingest().import_orders(&merchant, records(batch), ImportOptions::default(), None).await.unwrap();
        assert_eq!(report.summary.created, 5);
        let audit = store.audit_entries().await;
        let bulk = audit.iter().find(|e| e.entity_type == "BulkImport").unwrap();
        assert_eq!(bulk.details["batches"], 3);
    }

    #[tokio::test]
    async fn test_existing_external_id() {
        let w = world().await;
        w.ctx.orders().create_order(&w.merchant, order("EXT-1", w.product, 1)).await.unwrap();

        let mut again = order("EXT-1", w.product, 1);
        again.customer_name = "Ada Obi".into();
        let report = w.ctx.ingest().import_orders(&w.merchant, records(vec![again.clone()]), ImportOptions::default(), None).await.unwrap();
        assert_eq!(report.summary.errors, 1);
        assert_eq!(report.errors[0].key.as_deref(), Some("EXT-1"));

        let options = ImportOptions { update_existing: true, ..Default::default() };
        let report = w.ctx.ingest().import_orders(&w.merchant, records(vec![again]), options, None).await.unwrap();
        assert_eq!(report.summary.updated, 1);
        assert_eq!(report.updated[0].customer_name, "Ada Obi");
        assert_eq!(w.store.order_count().await, 1);
    }

    #[tokio::test]
    async fn test_duplicates_within_batch_are_skipped() {
        let w = world().await;
        let batch = vec![order("EXT-1", w.product, 1), order("EXT-1", w.product, 3)];
        let options = ImportOptions { skip_duplicates: true, ..Default::default() };
        let report = w.ctx.ingest().import_orders(&w.merchant, records(batch), options, None).await.unwrap();
        assert_eq!(report.summary.created, 1);
        assert_eq!(report.skipped, vec![2]);
    }

    #[tokio::test]
    async fn test_foreign_product_is_a_record_error() {
        let w = world().await;
        let other = Identity::new(Uuid::new_v4(), Role::Merchant, Some(Uuid::new_v4()));
        let np = NewProduct { name: "Mug".into(), weight: 0.3, ..Default::default() };
        let foreign = w.ctx.catalog().create_product(&other, np).await.unwrap().product.id;
        let batch = vec![order("A", w.product, 1), order("B", foreign, 1)];
        let report = w.ctx.ingest().import_orders(&w.merchant, records(batch), ImportOptions::default(), None).await.unwrap();
        assert_eq!(report.summary.created, 1);
        assert!(report.errors[0].error.contains("another business"));
    }

    #[tokio::test]
    async fn test_text_rows_group_into_orders() {
        let w = world().await;
        let text = format!(
            "externalOrderId,customerName,customerAddress,sku,productId,quantity,unitPrice\n\
             T-1,Ada,1 Marina,LAMP-1,,2,15.50\n\
             T-2,Bola,3 Allen,,{},1,\n\
             T-1,Ada,1 Marina,,{},1,15.50\n\
             T-3,Chi,9 Broad,NOPE-9,,1,\n",
            w.product, w.product
        );
        let source = ImportSource::Text { text, format: TextFormat::default() };
        let report = w.ctx.ingest().import_orders(&w.merchant, source, ImportOptions::default(), None).await.unwrap();
        assert_eq!(report.summary.total, 3);
        assert_eq!(report.summary.created, 2);
        assert_eq!(report.errors[0].record, 3);
        assert_eq!(report.errors[0].lines, vec![5]);
        assert!(report.errors[0].error.contains("unknown SKU NOPE-9"));

        let first = report.created.iter().find(|o| o.external_order_id.as_deref() == Some("T-1")).unwrap();
        assert_eq!(w.store.order_items(first.id).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_strict_mode() {
        let w = world().await;
        let batch = vec![order("A", w.product, 1), order("B", w.product, -1)];
        let options = ImportOptions { strict: true, ..Default::default() };
        let err = w.ctx.ingest().import_orders(&w.merchant, records(batch), options, None).await.unwrap_err();
        assert_eq!(err.kind(), "validation");
        assert_eq!(w.store.order_count().await, 0);
    }
}
