mod common;

use common::{ShopConnection, catalog, none, shop};
use phql::prelude::*;
use phql::{CacheBackend, Row, Snapshot};
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

/// Stores snapshots as JSON text, the way an external cache service would.
#[derive(Debug, Default)]
struct JsonCache {
    entries: Mutex<HashMap<String, String>>,
}

impl CacheBackend for JsonCache {
    fn get(&self, key: &str, _lifetime: Duration) -> Result<Option<Snapshot>> {
        let entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries
            .get(key)
            .map(|text| {
                serde_json::from_str(text).map_err(|e| Error::config(format!("bad cache entry: {e}")))
            })
            .transpose()
    }

    fn save(&self, key: &str, value: &Snapshot, _lifetime: Duration) -> Result<()> {
        let text =
            serde_json::to_string(value).map_err(|e| Error::config(format!("unserializable: {e}")))?;
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries.insert(key.to_string(), text);
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<bool> {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        Ok(entries.remove(key).is_some())
    }
}

#[test]
fn cached_records_survive_serialization() {
    let connection = ShopConnection::postgres();
    connection.seed("products", catalog());
    let manager = shop(connection.clone());
    let cache = Arc::new(JsonCache::default());
    manager.register_cache("json", cache.clone());

    let run = || {
        let mut query = manager.create_query("SELECT * FROM Products ORDER BY id");
        query.cache(CacheOptions::new("products").service("json"));
        query
            .execute(&Binds::new(), &none())
            .unwrap()
            .into_resultset()
            .unwrap()
    };

    let mut fresh = run();
    let mut cached = run();
    assert_eq!(connection.queries().len(), 1);
    assert!(fresh.is_fresh());
    assert!(!cached.is_fresh());
    assert_eq!(cached.count(), 3);

    let stool = cached.last().unwrap().unwrap().into_record().unwrap();
    assert_eq!(stool.model_name(), "Products");
    assert_eq!(stool.get("status"), Some(&Value::from("archived")));
    assert_eq!(fresh.to_json().unwrap(), cached.to_json().unwrap());

    assert!(cache.delete("products").unwrap());
    run();
    assert_eq!(connection.queries().len(), 2);
}

#[test]
fn cached_scalar_rows_keep_their_columns() {
    let connection = ShopConnection::postgres();
    connection.seed(
        "products",
        vec![
            Row::from_pairs([("status", Value::from("active")), ("total", Value::BigInt(2))]),
            Row::from_pairs([("status", Value::from("archived")), ("total", Value::BigInt(1))]),
        ],
    );
    let manager = shop(connection.clone());
    manager.register_cache("modelsCache", Arc::new(phql::MemoryCache::new()));

    let phql = "SELECT status, COUNT(*) AS total FROM Products GROUP BY status";
    for _ in 0..2 {
        let mut query = manager.create_query(phql);
        query.cache(CacheOptions::new("totals"));
        let mut totals = query
            .execute(&Binds::new(), &none())
            .unwrap()
            .into_resultset()
            .unwrap();
        let archived = totals.get(1).unwrap();
        assert!(archived.as_row().is_some());
        assert_eq!(archived.get("total"), Some(Value::BigInt(1)));
    }
    assert_eq!(connection.queries().len(), 1);
}

#[test]
fn snapshot_of_unknown_model_cannot_be_thawed() {
    let manager = shop(ShopConnection::postgres());
    let text = r#"{
        "shape": {"type": "records", "model": "Warehouses"},
        "hydrate_mode": "records",
        "columns": ["id"],
        "rows": [[{"BigInt": 1}]]
    }"#;
    let snapshot: Snapshot = serde_json::from_str(text).unwrap();
    assert_eq!(snapshot.len(), 1);
    let err = snapshot.thaw(&manager).err().unwrap();
    assert_eq!(err.message(), "Model 'Warehouses' could not be loaded");
}

#[test]
fn eager_relation_attaches_to_owner() {
    let connection = ShopConnection::postgres();
    connection.seed(
        "products",
        vec![Row::from_pairs([
            ("_p_id", Value::BigInt(2)),
            ("_p_name", Value::from("Desk")),
            ("_p_price", Value::Double(120.0)),
            ("_p_categories_id", Value::BigInt(2)),
            ("_p_status", Value::from("active")),
            ("_AA0_id", Value::BigInt(2)),
            ("_AA0_name", Value::from("Furniture")),
        ])],
    );
    let manager = shop(connection.clone());

    let mut products = manager
        .execute_query("SELECT p.* FROM Products p WITH category", &Binds::new(), &none())
        .unwrap()
        .into_resultset()
        .unwrap();

    let sql = connection.last_query();
    assert!(sql.starts_with("SELECT p.id AS _p_id"), "{sql}");
    assert!(sql.contains("AA0.name AS _AA0_name"), "{sql}");
    assert!(sql.ends_with("INNER JOIN categories AS AA0 ON p.categories_id = AA0.id"), "{sql}");

    let item = products.first().unwrap().unwrap();
    let desk = item.component("p").and_then(Hydrated::as_record).unwrap();
    let category = desk.related("category").unwrap();
    assert_eq!(category.len(), 1);
    assert_eq!(category[0].get("name"), Some(&Value::from("Furniture")));

    products.set_hydrate_mode(HydrateMode::Objects);
    let object = products.first().unwrap().unwrap().to_json();
    assert_eq!(object["p"]["category"][0]["name"], serde_json::json!("Furniture"));
}

#[test]
fn hydrated_records_keep_snapshots_on_request() {
    let connection = ShopConnection::postgres();
    connection.seed("products", catalog());
    let manager = shop(connection.clone());
    manager.keep_snapshots("Products", true);

    let mut products = manager
        .execute_query("SELECT * FROM Products", &Binds::new(), &none())
        .unwrap()
        .into_resultset()
        .unwrap();
    let mut lamp = products.first().unwrap().unwrap().into_record().unwrap();
    assert!(lamp.snapshot().is_some());

    lamp.set("price", 21.0);
    assert!(lamp.has_changed("price"));
    assert!(!lamp.has_changed("name"));
    assert!(lamp.update().unwrap());
    assert_eq!(
        connection.writes()[0].sql,
        "UPDATE products SET price = :price WHERE id = :id"
    );
}
