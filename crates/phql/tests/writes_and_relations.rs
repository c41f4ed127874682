mod common;

use common::{ShopConnection, catalog, none, product, shop};
use indexmap::IndexMap;
use phql::prelude::*;
use phql::{DirtyState, Row};

#[test]
fn insert_returns_created_record() {
    let connection = ShopConnection::postgres();
    let manager = shop(connection.clone());

    let status = manager
        .execute_query(
            "INSERT INTO Products (name, price, status) VALUES (:name:, 12.5, 'active')",
            &binds! { "name" => "Shelf" },
            &none(),
        )
        .unwrap()
        .into_status()
        .unwrap();

    assert!(status.success());
    let record = status.record().unwrap();
    assert_eq!(record.get("name"), Some(&Value::from("Shelf")));
    assert_eq!(record.get("status"), Some(&Value::from("active")));
    assert_eq!(record.state(), DirtyState::Persistent);

    let writes = connection.writes();
    assert_eq!(writes.len(), 1);
    assert!(writes[0].sql.starts_with("INSERT INTO products (name, price, status)"));
    assert_eq!(writes[0].binds.lookup("name"), Some(&Value::from("Shelf")));
}

#[test]
fn insert_failing_validation_writes_nothing() {
    let connection = ShopConnection::postgres();
    let manager = shop(connection.clone());

    let status = phql::execute(
        &manager,
        "INSERT INTO Products (name, price) VALUES ('Crate', :price:)",
        &binds! { "price" => -1.0 },
    )
    .unwrap()
    .into_status()
    .unwrap();

    assert!(!status.success());
    assert_eq!(status.messages()[0].message, "price cannot be negative");
    assert_eq!(status.messages()[0].field.as_deref(), Some("price"));
    assert!(connection.writes().is_empty());
}

#[test]
fn update_runs_in_one_transaction() {
    let connection = ShopConnection::postgres();
    connection.seed("products", catalog());
    let manager = shop(connection.clone());

    let status = manager
        .execute_query(
            "UPDATE Products SET status = :status: WHERE categories_id = :category:",
            &binds! { "status" => "sale", "category" => 2 },
            &none(),
        )
        .unwrap()
        .into_status()
        .unwrap();
    assert!(status.success());
    assert!(status.record().is_none());

    let select = &connection.queries()[0];
    assert!(select.sql.ends_with("FROM products WHERE products.categories_id = :category"));
    assert!(select.binds.lookup("status").is_none());

    let writes = connection.writes();
    assert_eq!(writes.len(), 3);
    assert!(writes.iter().all(|w| w.sql.starts_with("UPDATE products SET")));
    assert!(writes.iter().all(|w| w.binds.lookup("status") == Some(&Value::from("sale"))));
    assert_eq!(connection.transactions(), vec!["begin", "commit"]);
}

#[test]
fn delete_stops_at_first_rejected_record() {
    let connection = ShopConnection::postgres();
    connection.seed("products", catalog());
    let manager = shop(connection.clone());

    let status = manager
        .execute_query("DELETE FROM Products", &Binds::new(), &none())
        .unwrap()
        .into_status()
        .unwrap();

    assert!(!status.success());
    assert_eq!(status.messages()[0].message, "Archived products are kept");
    assert_eq!(
        status.record().and_then(|r| r.get("name").cloned()),
        Some(Value::from("Stool"))
    );
    assert_eq!(connection.transactions(), vec!["begin", "rollback"]);
}

#[test]
fn delete_of_nothing_succeeds_without_transaction() {
    let connection = ShopConnection::postgres();
    let manager = shop(connection.clone());

    let status = manager
        .execute_query("DELETE FROM Products WHERE id = 99", &Binds::new(), &none())
        .unwrap()
        .into_status()
        .unwrap();
    assert!(status.success());
    assert!(connection.transactions().is_empty());
}

#[test]
fn resultset_bulk_update_honors_predicate() {
    let connection = ShopConnection::postgres();
    connection.seed("products", catalog());
    let manager = shop(connection.clone());

    let mut products = manager
        .execute_query("SELECT * FROM Products", &Binds::new(), &none())
        .unwrap()
        .into_resultset()
        .unwrap();

    let mut data = IndexMap::new();
    data.insert("price".to_string(), Value::Double(99.0));
    let mut active = |record: &Record| record.get("status") == Some(&Value::from("active"));
    assert!(products.update(&data, Some(&mut active)).unwrap());

    assert_eq!(connection.writes().len(), 2);
    assert_eq!(connection.transactions(), vec!["begin", "commit"]);
}

#[test]
fn resultset_bulk_delete_reports_messages() {
    let connection = ShopConnection::postgres();
    connection.seed("products", catalog());
    let manager = shop(connection.clone());

    let mut products = manager
        .execute_query("SELECT * FROM Products", &Binds::new(), &none())
        .unwrap()
        .into_resultset()
        .unwrap();

    assert!(!products.delete(None).unwrap());
    assert_eq!(products.messages()[0].message, "Archived products are kept");
    assert_eq!(connection.transactions(), vec!["begin", "rollback"]);
}

#[test]
fn scalar_resultsets_cannot_be_modified() {
    let connection = ShopConnection::postgres();
    connection.seed("products", vec![Row::from_pairs([("name", "Lamp")])]);
    let manager = shop(connection);

    let mut names = manager
        .execute_query("SELECT name FROM Products", &Binds::new(), &none())
        .unwrap()
        .into_resultset()
        .unwrap();
    let err = names.delete(None).unwrap_err();
    assert_eq!(err.message(), "Only result sets of records can be modified");
}

#[test]
fn belongs_to_relation_fetches_owner() {
    let connection = ShopConnection::postgres();
    connection.seed(
        "categories",
        vec![Row::from_pairs([
            ("id", Value::BigInt(2)),
            ("name", Value::from("Furniture")),
        ])],
    );
    let manager = shop(connection.clone());

    let model = manager.load("Products").unwrap();
    let desk = Record::new(&manager, model)
        .with("id", 2_i64)
        .with("categories_id", 2_i64);
    let categories = manager.related_records(&desk, "category").unwrap();

    assert_eq!(categories.len(), 1);
    assert_eq!(categories[0].get("name"), Some(&Value::from("Furniture")));
    let sent = &connection.queries()[0];
    assert_eq!(
        sent.sql,
        "SELECT categories.id, categories.name FROM categories WHERE categories.id = :APR0"
    );
    assert_eq!(sent.binds.lookup("APR0"), Some(&Value::BigInt(2)));
}

#[test]
fn has_many_relation_fetches_children() {
    let connection = ShopConnection::postgres();
    connection.seed("products", vec![product(2, "Desk", 120.0, 2, "active")]);
    let manager = shop(connection.clone());

    let model = manager.load("Categories").unwrap();
    let furniture = Record::new(&manager, model).with("id", 2_i64);
    let products = manager.related_records(&furniture, "products").unwrap();

    assert_eq!(products.len(), 1);
    assert_eq!(products[0].model_name(), "Products");
    assert!(connection.last_query().ends_with("WHERE products.categories_id = :APR0"));

    let err = manager.related_records(&furniture, "owner").unwrap_err();
    assert_eq!(
        err.message(),
        "There is no defined relations for the model 'Categories' using alias 'owner'"
    );
}

#[test]
fn relations_are_looked_up_case_insensitively() {
    let manager = shop(ShopConnection::postgres());
    assert!(manager.exists_relation("products", "CATEGORIES"));
    assert!(manager.relation_by_alias("Products", "Tags").is_some());
    assert!(manager.relation_by_alias("Products", "tags").is_some_and(|r| r.is_through()));
    assert!(!manager.exists_relation("Tags", "Categories"));
}

#[test]
fn criteria_builds_and_runs_select() {
    let connection = ShopConnection::postgres();
    connection.seed("products", catalog());
    let manager = shop(connection.clone());

    let mut products = Criteria::for_model("Products")
        .where_("status = :status:", Some(binds! { "status" => "active" }))
        .in_where("categories_id", vec![Value::from(1), Value::from(2)])
        .order_by("price DESC")
        .limit(2, None)
        .execute(&manager)
        .unwrap()
        .into_resultset()
        .unwrap();
    assert_eq!(products.count(), 3);

    let sent = &connection.queries()[0];
    assert!(sent.sql.ends_with(
        "WHERE (products.status = :status) AND (products.categories_id IN (:ACP0, :ACP1)) ORDER BY products.price DESC LIMIT 2"
    ));
    assert_eq!(sent.binds.lookup("ACP1"), Some(&Value::Int(2)));
}

#[test]
fn criteria_from_input_matches_text_loosely() {
    let connection = ShopConnection::postgres();
    let manager = shop(connection.clone());

    let mut input = IndexMap::new();
    input.insert("name".to_string(), Value::from("de"));
    input.insert("categories_id".to_string(), Value::from(2));
    input.insert("color".to_string(), Value::from("red"));

    Criteria::from_input(&manager, "Products", &input, "AND")
        .unwrap()
        .execute(&manager)
        .unwrap();

    let sent = &connection.queries()[0];
    assert!(sent.sql.ends_with(
        "WHERE products.name LIKE :name AND products.categories_id = :categories_id"
    ));
    assert_eq!(sent.binds.lookup("name"), Some(&Value::from("%de%")));
}

#[test]
fn builder_carries_cache_and_binds() {
    let connection = ShopConnection::postgres();
    connection.seed("products", catalog());
    let manager = shop(connection.clone());
    manager.register_cache("modelsCache", Arc::new(phql::MemoryCache::new()));

    let params = Params::new()
        .model_as("Products", "p")
        .conditions("p.price < :max:")
        .bind(binds! { "max" => 50 })
        .cache(CacheOptions::new("cheap-products"));
    let builder = manager.create_builder(params);
    assert_eq!(
        builder.phql().unwrap(),
        "SELECT [p].* FROM [Products] AS [p] WHERE p.price < :max:"
    );

    for _ in 0..2 {
        let mut query = builder.query().unwrap();
        let cheap = query
            .execute(&Binds::new(), &none())
            .unwrap()
            .into_resultset()
            .unwrap();
        assert_eq!(cheap.count(), 3);
    }
    assert_eq!(connection.queries().len(), 1);
}
