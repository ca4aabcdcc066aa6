use std::collections::{HashMap, HashSet};

use uuid::Uuid;

use super::{field, log_batch, on_duplicate, parse_rows, BulkIngestion, ImportOptions, ImportReport, ImportSource, Origin, Plan, Row};
use crate::access::Identity;
use crate::domain::aggregates::{NewProduct, Product, ProductPatch, StockAllocation, StockPlacement};
use crate::domain::value_objects::Dimensions;
use crate::services::Catalog;
use crate::{FulfillmentError, Result};

const KIND: &str = "products";

/// Columns understood in text input, in positional order.
pub const COLUMNS: &[&str] = &[
    "name",
    "sku",
    "weight",
    "length",
    "width",
    "height",
    "warehouse",
    "allocatedQuantity",
    "safetyStock",
    "businessId",
];

impl<'a> BulkIngestion<'a> {
    /// Imports products into `business_id` (the caller's own business for merchants).
    pub async fn import_products(
        &self,
        identity: &Identity,
        source: ImportSource<NewProduct>,
        options: ImportOptions,
        business_id: Option<Uuid>,
    ) -> Result<ImportReport<Product>> {
        let (_, business) = self.begin(identity, business_id)?;

        let candidates: Vec<(Origin, std::result::Result<NewProduct, Vec<String>>)> = match source {
            ImportSource::Records { records } => {
                records.into_iter().enumerate().map(|(i, r)| (Origin::at(i + 1), Ok(r))).collect()
            }
            ImportSource::Text { text, format } => parse_rows(&text, format, COLUMNS)?
                .iter()
                .enumerate()
                .map(|(i, row)| {
                    let origin = Origin { record: i + 1, lines: vec![row.line], key: row.get("sku").map(str::to_string) };
                    (origin, product_from_row(row))
                })
                .collect(),
        };

        if let Some((origin, _)) = candidates.iter().find(|(_, c)| {
            matches!(c, Ok(p) if p.business_id.is_some_and(|b| b != business))
        }) {
            return Err(FulfillmentError::Permission(format!(
                "Record {} targets another business than {business}",
                origin.record
            )));
        }

        let mut plans = Vec::with_capacity(candidates.len());
        let mut seen: HashMap<String, usize> = HashMap::new();
        for (mut origin, candidate) in candidates {
            let new = match candidate {
                Ok(new) => new,
                Err(problems) => { plans.push((origin, Plan::Reject(problems))); continue; }
            };
            let problems = new.problems();
            if !problems.is_empty() {
                plans.push((origin, Plan::Reject(problems)));
                continue;
            }
            let Some(sku) = new.explicit_sku() else {
                plans.push((origin, Plan::Create(new)));
                continue;
            };
            origin.key = Some(sku.to_string());
            if let Some(first) = seen.get(sku.as_str()) {
                let plan = on_duplicate(options, format!("SKU {sku} repeats record {first}"));
                plans.push((origin, plan));
                continue;
            }
            seen.insert(sku.to_string(), origin.record);

            let plan = match self.ctx.store.find_product_by_sku(&sku).await? {
                None => Plan::Create(new),
                Some(existing) if options.update_existing && existing.business_id == business => Plan::Update((existing, new)),
                Some(_) if options.update_existing => Plan::Reject(vec![format!("SKU {sku} belongs to another business")]),
                Some(_) => on_duplicate(options, format!("SKU {sku} already exists")),
            };
            plans.push((origin, plan));
        }

        let (mut report, accepted) = self.decide(KIND, options, plans)?;
        if options.validate_only {
            return Ok(report);
        }

        let catalog = self.ctx.catalog();
        let mut batches = 0;
        for (n, batch) in accepted.chunks(self.batch_size()).enumerate() {
            log_batch(KIND, n + 1, batch.len());
            batches += 1;
            for (origin, plan) in batch {
                let result = match plan {
                    Plan::Create(new) => create(&catalog, identity, new, business).await.map(|p| (p, false)),
                    Plan::Update((existing, new)) => self.update_product_record(&catalog, identity, existing.clone(), new).await.map(|p| (p, true)),
                    Plan::Skip | Plan::Reject(_) => continue,
                };
                report.outcome(origin, result);
            }
        }
        Ok(self.finish(identity, KIND, business, options, batches, report).await)
    }

    /// Overwrites name, weight and dimensions; replaces stock only when the record carries some.
    async fn update_product_record(&self, catalog: &Catalog<'_>, identity: &Identity, mut product: Product, new: &NewProduct) -> Result<Product> {
        let patch = ProductPatch { name: Some(new.name.clone()), weight: Some(new.weight), dimensions: new.dimensions };
        product.apply(&patch).map_err(FulfillmentError::validation)?;
        let rows: Vec<StockAllocation> = catalog
            .place_stock(identity, &new.stock)
            .await?
            .into_iter()
            .map(|(w, input)| -> Result<StockAllocation> { Ok(input.validate()?.into_allocation(product.id, w)) })
            .collect::<Result<_>>()?;
        let stock = (!rows.is_empty()).then_some(rows.as_slice());
        self.ctx.store.update_product_with_stock(&product, stock).await?;
        Ok(product)
    }
}

async fn create(catalog: &Catalog<'_>, identity: &Identity, new: &NewProduct, business: Uuid) -> Result<Product> {
    catalog.check_sku_free(new).await?;
    let rows = catalog.place_stock(identity, &new.stock).await?;
    let product = catalog.insert_product(new, business, &mut HashSet::new()).await?;
    catalog.attach_stock(&product, rows).await?;
    Ok(product)
}

/// One text row is one product with at most one stock placement.
fn product_from_row(row: &Row) -> std::result::Result<NewProduct, Vec<String>> {
    let mut problems = vec![];
    let weight = field::<f64>(row, "weight", &mut problems);
    let length = field::<f64>(row, "length", &mut problems);
    let width = field::<f64>(row, "width", &mut problems);
    let height = field::<f64>(row, "height", &mut problems);
    let allocated = field::<i64>(row, "allocatedQuantity", &mut problems);
    let safety = field::<i64>(row, "safetyStock", &mut problems);
    let business_id = match row.get("businessId").map(Uuid::parse_str) {
        None => None,
        Some(Ok(id)) => Some(id),
        Some(Err(_)) => {
            problems.push("businessId must be a UUID".to_string());
            None
        }
    };

    let dimensions = match (length, width, height) {
        (None, None, None) => None,
        (Some(length), Some(width), Some(height)) => Some(Dimensions { length, width, height }),
        _ => {
            problems.push("dimensions need length, width and height together".to_string());
            None
        }
    };
    let warehouse = row.get("warehouse").map(str::to_string);
    let stock = if warehouse.is_some() || allocated.is_some() {
        vec![StockPlacement { warehouse, allocated_quantity: allocated.unwrap_or(0), safety_stock: safety.unwrap_or(0) }]
    } else {
        vec![]
    };

    if !problems.is_empty() {
        return Err(problems);
    }
    Ok(NewProduct {
        name: row.text("name"),
        sku: row.get("sku").map(str::to_string),
        weight: weight.unwrap_or(0.0),
        dimensions,
        business_id,
        stock,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::access::Role;
    use crate::ingest::TextFormat;
    use crate::services::Fulfillment;
    use crate::store::{AllocationFilter, InMemoryStore, Store};
    use std::sync::Arc;

    fn setup() -> (Arc<InMemoryStore>, Fulfillment, Identity) {
        let store = Arc::new(InMemoryStore::new());
        let ctx = Fulfillment::with_store(store.clone());
        (store, ctx, Identity::new(Uuid::new_v4(), Role::Merchant, Some(Uuid::new_v4())))
    }

    fn product(name: &str, weight: f64) -> NewProduct {
        NewProduct { name: name.into(), weight, ..Default::default() }
    }

    fn records(list: Vec<NewProduct>) -> ImportSource<NewProduct> {
        ImportSource::Records { records: list }
    }

    #[tokio::test]
    async fn test_invalid_record_does_not_stop_siblings() {
        let (store, ctx, merchant) = setup();
        let batch = vec![product("Kettle", 1.2), product("Toaster", 0.0), product("Blender", 2.0)];
        let report = ctx.ingest().import_products(&merchant, records(batch), ImportOptions::default(), None).await.unwrap();
        assert_eq!(report.summary.created, 2);
        assert_eq!(report.summary.errors, 1);
        assert_eq!(report.errors[0].record, 2);
        assert!(report.errors[0].error.contains("weight"));
        assert_eq!(store.product_count().await, 2);

        let audit = store.audit_entries().await;
        let bulk: Vec<_> = audit.iter().filter(|e| e.entity_type == "BulkImport").collect();
        assert_eq!(bulk.len(), 1);
        assert_eq!(bulk[0].action, "BULK_IMPORT_PRODUCTS");
        assert!(audit.iter().all(|e| e.entity_type != "Product"));
    }

    #[tokio::test]
    async fn test_strict_rejects_whole_batch() {
        let (store, ctx, merchant) = setup();
        let batch = vec![product("Kettle", 1.2), product("", 1.0)];
        let options = ImportOptions { strict: true, ..Default::default() };
        let err = ctx.ingest().import_products(&merchant, records(batch), options, None).await.unwrap_err();
        assert_eq!(err.kind(), "validation");
        assert_eq!(store.product_count().await, 0);
    }

    #[tokio::test]
    async fn test_validate_only_writes_nothing() {
        let (store, ctx, merchant) = setup();
        let batch = vec![product("Kettle", 1.2), product("Blender", 2.0)];
        let options = ImportOptions { validate_only: true, ..Default::default() };
        let report = ctx.ingest().import_products(&merchant, records(batch), options, None).await.unwrap();
        assert!(report.summary.validate_only);
        assert_eq!(report.summary.created, 2);
        assert!(report.created.is_empty());
        assert_eq!(store.product_count().await, 0);
        assert!(store.audit_entries().await.is_empty());
    }

    #[tokio::test]
    async fn test_duplicate_skus() {
        let (store, ctx, merchant) = setup();
        let mut a = product("Cable", 0.1);
        a.sku = Some("CAB-1".into());
        ctx.catalog().create_product(&merchant, a.clone()).await.unwrap();

        let mut b = product("Plug", 0.1);
        b.sku = Some("PLG-1".into());
        let batch = vec![a.clone(), b.clone(), b.clone()];

        let report = ctx.ingest().import_products(&merchant, records(batch.clone()), ImportOptions::default(), None).await.unwrap();
        assert_eq!(report.summary.created, 1);
        assert_eq!(report.summary.errors, 2);
        assert_eq!(report.errors[0].key.as_deref(), Some("CAB-1"));

        let options = ImportOptions { skip_duplicates: true, ..Default::default() };
        let report = ctx.ingest().import_products(&merchant, records(batch), options, None).await.unwrap();
        assert_eq!(report.summary.skipped, 3);
        assert_eq!(report.summary.created, 0);
        assert_eq!(store.product_count().await, 2);
    }

    #[tokio::test]
    async fn test_update_existing() {
        let (store, ctx, merchant) = setup();
        let mut a = product("Cable", 0.1);
        a.sku = Some("CAB-1".into());
        let created = ctx.catalog().create_product(&merchant, a.clone()).await.unwrap();

        a.name = "Braided Cable".into();
        a.stock.push(StockPlacement { warehouse: None, allocated_quantity: 30, safety_stock: 5 });
        let options = ImportOptions { update_existing: true, ..Default::default() };
        let report = ctx.ingest().import_products(&merchant, records(vec![a]), options, None).await.unwrap();
        assert_eq!(report.summary.updated, 1);
        assert_eq!(report.updated[0].id, created.product.id);
        assert_eq!(report.updated[0].name, "Braided Cable");
        let stock = store.list_allocations(AllocationFilter { product_id: Some(created.product.id), warehouse_id: None }).await.unwrap();
        assert_eq!(stock[0].allocated_quantity, 30);
    }

    #[tokio::test]
    async fn test_failed_update_leaves_product_untouched() {
        let (store, ctx, merchant) = setup();
        let mut a = product("Cable", 0.1);
        a.sku = Some("CAB-1".into());
        let created = ctx.catalog().create_product(&merchant, a.clone()).await.unwrap();

        a.name = "Braided Cable".into();
        a.stock = vec![
            StockPlacement { warehouse: None, allocated_quantity: 30, safety_stock: 5 },
            StockPlacement { warehouse: Some("DEFAULT_WAREHOUSE".into()), allocated_quantity: 10, safety_stock: 0 },
        ];
        let options = ImportOptions { update_existing: true, ..Default::default() };
        let report = ctx.ingest().import_products(&merchant, records(vec![a]), options, None).await.unwrap();
        assert_eq!((report.summary.updated, report.summary.errors), (0, 1));
        let stored = store.get_product(created.product.id).await.unwrap().unwrap();
        assert_eq!(stored.name, "Cable");
        assert!(store.list_allocations(AllocationFilter { product_id: Some(stored.id), warehouse_id: None }).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_text_input() {
        let (store, ctx, merchant) = setup();
        let text = "Name;Weight;Allocated Quantity;Safety Stock\nDesk Lamp;1.5;10;2\nKettle;abc;;\n".to_string();
        let source = ImportSource::Text { text, format: TextFormat { delimiter: ';', has_header: true } };
        let report = ctx.ingest().import_products(&merchant, source, ImportOptions::default(), None).await.unwrap();
        assert_eq!(report.summary.created, 1);
        assert_eq!(report.errors[0].lines, vec![3]);
        assert!(report.errors[0].error.starts_with("weight must be a number"));
        let stock = store.list_allocations(AllocationFilter::default()).await.unwrap();
        assert_eq!(stock.len(), 1);
        assert_eq!(stock[0].safety_stock, 2);
    }

    #[tokio::test]
    async fn test_foreign_business_rejects_batch() {
        let (store, ctx, merchant) = setup();
        let mut foreign = product("Kettle", 1.0);
        foreign.business_id = Some(Uuid::new_v4());
        let batch = vec![product("Mug", 0.3), foreign];
        let err = ctx.ingest().import_products(&merchant, records(batch), ImportOptions::default(), None).await.unwrap_err();
        assert_eq!(err.kind(), "permission");
        assert_eq!(store.product_count().await, 0);
    }

    #[tokio::test]
    async fn test_logistics_cannot_import() {
        let (_, ctx, _) = setup();
        let courier = Identity::new(Uuid::new_v4(), Role::Logistics, None);
        let err = ctx.ingest().import_products(&courier, records(vec![]), ImportOptions::default(), None).await.unwrap_err();
        assert_eq!(err.kind(), "permission");
    }

    #[test]
    fn test_partial_dimensions_are_a_problem() {
        let row = Row::from_pairs(2, &[("name", "Box"), ("weight", "1"), ("length", "3")]);
        let problems = product_from_row(&row).unwrap_err();
        assert_eq!(problems.len(), 1);
    }
}
