mod common;

use common::{ShopConnection, catalog, none, shop, shop_with};
use phql::prelude::*;
use phql::{Flavor, QueryResult, Row, StatementKind};

#[test]
fn select_whole_model_returns_records_in_order() {
    let connection = ShopConnection::postgres();
    connection.seed("products", catalog());
    let manager = shop(connection.clone());

    let mut products = manager
        .execute_query(
            "SELECT * FROM Products WHERE price > :min: ORDER BY name",
            &binds! { "min" => 10 },
            &none(),
        )
        .unwrap()
        .into_resultset()
        .unwrap();

    assert_eq!(
        connection.last_query(),
        "SELECT products.id, products.name, products.price, products.categories_id, products.status FROM products WHERE products.price > :min ORDER BY products.name"
    );
    assert_eq!(connection.queries()[0].binds.lookup("min"), Some(&Value::Int(10)));
    assert_eq!(products.count(), 3);

    let names: Vec<Value> = products
        .to_array()
        .unwrap()
        .iter()
        .filter_map(|item| item.get("name"))
        .collect();
    assert_eq!(
        names,
        vec![Value::from("Lamp"), Value::from("Desk"), Value::from("Stool")]
    );
    let desk = products.get(1).unwrap().into_record().unwrap();
    assert_eq!(desk.model_name(), "Products");
}

#[test]
fn implicit_join_uses_declared_relation() {
    let connection = ShopConnection::postgres();
    let manager = shop(connection.clone());

    let statement = manager
        .create_query("SELECT p.name, c.name AS category FROM Products p JOIN Categories c")
        .sql()
        .unwrap();
    assert_eq!(
        statement.sql,
        "SELECT p.name, c.name AS category FROM products AS p INNER JOIN categories AS c ON p.categories_id = c.id"
    );
}

#[test]
fn many_to_many_join_goes_through_intermediate_model() {
    let connection = ShopConnection::postgres();
    let manager = shop(connection);

    let statement = manager
        .create_query("SELECT p.name FROM Products p JOIN Tags t WHERE t.label = :label:")
        .sql()
        .unwrap();
    assert!(statement.sql.contains("INNER JOIN products_tags"));
    assert!(statement.sql.contains("INNER JOIN tags AS t"));
    assert!(statement.sql.ends_with("WHERE t.label = :label"));
}

#[test]
fn implicit_joins_can_be_disabled() {
    let connection = ShopConnection::postgres();
    let manager = shop_with(connection, Settings::new().enable_implicit_joins(false));

    let statement = manager
        .create_query("SELECT p.name FROM Products p JOIN Categories c")
        .sql()
        .unwrap();
    assert_eq!(
        statement.sql,
        "SELECT p.name FROM products AS p INNER JOIN categories AS c"
    );
}

#[test]
fn scalar_selection_returns_rows() {
    let connection = ShopConnection::postgres();
    connection.seed(
        "products",
        vec![Row::from_pairs([
            ("status", Value::from("active")),
            ("total", Value::BigInt(2)),
        ])],
    );
    let manager = shop(connection.clone());

    let row = manager
        .create_query("SELECT status, COUNT(*) AS total FROM Products GROUP BY status")
        .single_result(&Binds::new(), &none())
        .unwrap()
        .unwrap();
    assert!(row.as_row().is_some());
    assert_eq!(row.get("total"), Some(Value::BigInt(2)));
    assert_eq!(
        connection.last_query(),
        "SELECT products.status, COUNT(*) AS total FROM products GROUP BY products.status"
    );
}

#[test]
fn typed_array_placeholder_expands_per_element() {
    let connection = ShopConnection::postgres();
    connection.seed("products", catalog());
    let manager = shop(connection.clone());

    let result = manager
        .execute_query(
            "SELECT * FROM Products WHERE id IN ({ids:array-int})",
            &binds! { "ids" => vec![1i64, 3] },
            &none(),
        )
        .unwrap();
    assert!(matches!(result, QueryResult::Resultset(_)));

    let sent = &connection.queries()[0];
    assert!(sent.sql.ends_with("WHERE products.id IN (:ids0, :ids1)"));
    assert_eq!(sent.binds.lookup("ids0"), Some(&Value::BigInt(1)));
    assert_eq!(sent.binds.lookup("ids1"), Some(&Value::BigInt(3)));
}

#[test]
fn missing_array_bind_is_an_error() {
    let manager = shop(ShopConnection::postgres());
    let err = manager
        .execute_query(
            "SELECT * FROM Products WHERE id IN ({ids:array})",
            &Binds::new(),
            &none(),
        )
        .unwrap_err();
    assert_eq!(
        err.message(),
        "Bind value is required for array type placeholder: ids"
    );
}

#[test]
fn shared_lock_depends_on_dialect() {
    for (flavor, suffix) in [
        (Flavor::Postgres, "FROM products FOR SHARE"),
        (Flavor::Mysql, "FROM products LOCK IN SHARE MODE"),
        (Flavor::Sqlite, "FROM products"),
    ] {
        let connection = ShopConnection::new(flavor);
        let manager = shop(connection.clone());
        let mut query = manager.create_query("SELECT id FROM Products");
        query.set_shared_lock(true);
        query.execute(&Binds::new(), &none()).unwrap();
        assert!(
            connection.last_query().ends_with(suffix),
            "{flavor:?}: {}",
            connection.last_query()
        );
    }
}

#[test]
fn literals_can_be_disabled() {
    let manager = shop_with(
        ShopConnection::postgres(),
        Settings::new().enable_literals(false),
    );
    let err = manager
        .execute_query("SELECT * FROM Products WHERE name = 'Lamp'", &Binds::new(), &none())
        .unwrap_err();
    assert_eq!(err.message(), "Literals are disabled in PHQL statements");

    manager
        .execute_query(
            "SELECT * FROM Products WHERE name = :name:",
            &binds! { "name" => "Lamp" },
            &none(),
        )
        .unwrap();
}

#[test]
fn resolution_errors_name_the_statement() {
    let manager = shop(ShopConnection::postgres());

    let err = manager
        .execute_query("SELECT weight FROM Products", &Binds::new(), &none())
        .unwrap_err();
    assert_eq!(
        err.message(),
        "Column 'weight' doesn't belong to any of the selected models"
    );
    assert!(err.to_string().ends_with("when preparing: SELECT weight FROM Products"));

    let err = manager
        .execute_query("SELECT id FROM Products JOIN Categories", &Binds::new(), &none())
        .unwrap_err();
    assert_eq!(err.message(), "The column 'id' is ambiguous");

    let err = manager
        .execute_query("SELECT * FROM Warehouses", &Binds::new(), &none())
        .unwrap_err();
    assert_eq!(err.message(), "Model 'Warehouses' could not be loaded");
}

#[test]
fn syntax_errors_are_reported_before_resolution() {
    let manager = shop(ShopConnection::postgres());
    let err = manager
        .execute_query("SELECT FROM Products", &Binds::new(), &none())
        .unwrap_err();
    assert!(err.message().starts_with("Syntax error"), "{}", err.message());
}

#[test]
fn statement_kind_is_known_after_parse() {
    let manager = shop(ShopConnection::postgres());
    let mut query = manager.create_query("UPDATE Products SET price = 10 WHERE id = 1");
    assert_eq!(query.statement_kind(), None);
    query.parse().unwrap();
    assert_eq!(query.statement_kind(), Some(StatementKind::Update));
}

#[test]
fn hydration_modes_shape_each_row() {
    let connection = ShopConnection::postgres();
    connection.seed("products", catalog());
    let manager = shop(connection);

    let mut products = manager
        .execute_query("SELECT * FROM Products", &Binds::new(), &none())
        .unwrap()
        .into_resultset()
        .unwrap();

    products.set_hydrate_mode(HydrateMode::Arrays);
    let first = products.first().unwrap().unwrap();
    assert!(matches!(first, Hydrated::Array(_)));
    assert_eq!(first.get("name"), Some(Value::from("Lamp")));

    products.set_hydrate_mode(HydrateMode::Objects);
    let last = products.last().unwrap().unwrap();
    assert_eq!(last.to_json()["status"], serde_json::json!("archived"));
}

#[test]
fn typed_placeholder_registers_bind_type() {
    let manager = shop(ShopConnection::postgres());
    let mut query =
        manager.create_query("SELECT name FROM Products WHERE price > :min: AND id = :x:int");
    query.set_bind_params(binds! { "min" => 1, "x" => "5" }, false);
    let statement = query.sql().unwrap();
    assert_eq!(statement.bind_types.lookup("x"), Some(&BindType::Int));
}

#[test]
fn object_with_scalar_gives_complex_rows() {
    let connection = ShopConnection::postgres();
    connection.seed(
        "products",
        vec![Row::from_pairs([
            ("_p_id", Value::BigInt(1)),
            ("_p_name", Value::from("Lamp")),
            ("_p_price", Value::Double(19.5)),
            ("_p_categories_id", Value::BigInt(1)),
            ("_p_status", Value::from("active")),
            ("double_price", Value::Double(39.0)),
        ])],
    );
    let manager = shop(connection.clone());

    let item = manager
        .create_query("SELECT p.*, p.price * 2 AS double_price FROM Products p")
        .single_result(&Binds::new(), &none())
        .unwrap()
        .unwrap();
    let lamp = item.component("p").and_then(Hydrated::as_record).unwrap();
    assert_eq!(lamp.get("name"), Some(&Value::from("Lamp")));
    assert_eq!(item.get("double_price"), Some(Value::Double(39.0)));
    assert!(connection.last_query().ends_with("p.price * 2 AS double_price FROM products AS p"));
}

#[test]
fn multi_model_update_fails_before_any_connection_use() {
    let connection = ShopConnection::postgres();
    let manager = shop(connection.clone());
    let err = manager
        .execute_query("UPDATE Products, Categories SET name = 'x'", &Binds::new(), &none())
        .unwrap_err();
    assert_eq!(
        err.message(),
        "Updating several models at the same time is still not supported"
    );
    assert!(connection.queries().is_empty());
    assert!(connection.transactions().is_empty());
}
