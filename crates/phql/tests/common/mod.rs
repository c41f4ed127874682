//! Shop schema and an in-memory connection shared by the integration tests.

#![allow(dead_code)]

use phql::prelude::*;
use phql::{Cursor, Dialect, Flavor, Row, RowsCursor, SqlDialect};
use std::collections::HashMap;
use std::sync::Mutex;

/// Products refuse a negative price and archived products cannot be deleted.
#[derive(Debug, Default)]
pub struct Products;

impl Model for Products {
    fn name(&self) -> &str {
        "Products"
    }

    fn source(&self) -> &str {
        "products"
    }

    fn validation(&self, record: &Record, operation: Operation) -> Vec<Message> {
        match operation {
            Operation::Create | Operation::Update => record
                .get("price")
                .and_then(Value::as_f64)
                .filter(|price| *price < 0.0)
                .map(|_| vec![Message::new("price cannot be negative").field("price")])
                .unwrap_or_default(),
            Operation::Delete => {
                if record.get("status").and_then(Value::as_str) == Some("archived") {
                    vec![Message::new("Archived products are kept").field("status")]
                } else {
                    Vec::new()
                }
            }
        }
    }
}

pub fn shop_metadata() -> MemoryMetaData {
    MemoryMetaData::new()
        .with(
            "Products",
            ModelMeta::new()
                .primary("id", DataType::Integer)
                .column("name", DataType::Varchar)
                .column("price", DataType::Decimal)
                .column("categories_id", DataType::Integer)
                .column("status", DataType::Varchar),
        )
        .with(
            "Categories",
            ModelMeta::new()
                .primary("id", DataType::Integer)
                .column("name", DataType::Varchar),
        )
        .with(
            "Tags",
            ModelMeta::new()
                .primary("id", DataType::Integer)
                .column("label", DataType::Varchar),
        )
        .with(
            "ProductsTags",
            ModelMeta::new()
                .primary("id", DataType::Integer)
                .column("products_id", DataType::Integer)
                .column("tags_id", DataType::Integer),
        )
}

/// A manager over the shop schema answering from `connection`.
pub fn shop(connection: Arc<ShopConnection>) -> Manager {
    shop_with(connection, Settings::new())
}

pub fn shop_with(connection: Arc<ShopConnection>, settings: Settings) -> Manager {
    let manager = match Manager::builder()
        .metadata(Arc::new(shop_metadata()))
        .settings(settings)
        .connection(connection)
        .build()
    {
        Ok(manager) => manager,
        Err(e) => panic!("shop manager: {e}"),
    };
    manager.register_model(Products);
    manager.register_model(ModelDefinition::new("Categories", "categories"));
    manager.register_model(ModelDefinition::new("Tags", "tags"));
    manager.register_model(ModelDefinition::new("ProductsTags", "products_tags"));

    let relations = [
        manager.add_belongs_to(
            "Products",
            "categories_id",
            "Categories",
            "id",
            RelationOptions::new().alias("category"),
        ),
        manager.add_has_many(
            "Categories",
            "id",
            "Products",
            "categories_id",
            RelationOptions::new().alias("products"),
        ),
        manager.add_has_many_to_many(
            "Products",
            "id",
            Through::new("ProductsTags", "products_id", "tags_id"),
            "Tags",
            "id",
            RelationOptions::new().alias("tags"),
        ),
    ];
    for relation in relations {
        if let Err(e) = relation {
            panic!("shop relation: {e}");
        }
    }
    manager
}

/// One statement the connection received.
#[derive(Debug, Clone)]
pub struct Statement {
    pub sql: String,
    pub binds: Binds,
}

#[derive(Debug, Default)]
struct Store {
    tables: HashMap<String, Vec<Row>>,
    queries: Vec<Statement>,
    writes: Vec<Statement>,
    transactions: Vec<&'static str>,
    open: bool,
    last_id: i64,
}

/// Answers each SELECT with the rows seeded for the table it reads from.
#[derive(Debug)]
pub struct ShopConnection {
    store: Mutex<Store>,
    dialect: SqlDialect,
}

impl ShopConnection {
    pub fn new(flavor: Flavor) -> Arc<Self> {
        Arc::new(Self {
            store: Mutex::new(Store::default()),
            dialect: SqlDialect::new(flavor),
        })
    }

    pub fn postgres() -> Arc<Self> {
        Self::new(Flavor::Postgres)
    }

    pub fn seed(&self, table: &str, rows: Vec<Row>) {
        let mut store = self.store.lock().unwrap_or_else(|e| e.into_inner());
        store.tables.insert(table.to_string(), rows);
    }

    pub fn queries(&self) -> Vec<Statement> {
        self.store.lock().unwrap_or_else(|e| e.into_inner()).queries.clone()
    }

    pub fn last_query(&self) -> String {
        self.queries().last().map(|s| s.sql.clone()).unwrap_or_default()
    }

    pub fn writes(&self) -> Vec<Statement> {
        self.store.lock().unwrap_or_else(|e| e.into_inner()).writes.clone()
    }

    pub fn transactions(&self) -> Vec<&'static str> {
        self.store
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .transactions
            .clone()
    }
}

fn table_of(sql: &str) -> Option<&str> {
    let rest = &sql[sql.find(" FROM ")? + " FROM ".len()..];
    rest.split_whitespace().next()
}

impl Connection for ShopConnection {
    fn db_type(&self) -> &str {
        self.dialect.flavor().db_type()
    }

    fn dialect(&self) -> &dyn Dialect {
        &self.dialect
    }

    fn query(&self, sql: &str, binds: &Binds, _types: &BindTypes) -> Result<Option<Box<dyn Cursor>>> {
        let mut store = self.store.lock().unwrap_or_else(|e| e.into_inner());
        store.queries.push(Statement {
            sql: sql.to_string(),
            binds: binds.clone(),
        });
        let rows = table_of(sql)
            .and_then(|table| store.tables.get(table))
            .cloned()
            .unwrap_or_default();
        Ok(Some(Box::new(RowsCursor::new(rows))))
    }

    fn execute(&self, sql: &str, binds: &Binds, _types: &BindTypes) -> Result<u64> {
        let mut store = self.store.lock().unwrap_or_else(|e| e.into_inner());
        store.writes.push(Statement {
            sql: sql.to_string(),
            binds: binds.clone(),
        });
        if sql.starts_with("INSERT") {
            store.last_id += 1;
        }
        Ok(1)
    }

    fn begin(&self) -> Result<()> {
        let mut store = self.store.lock().unwrap_or_else(|e| e.into_inner());
        store.open = true;
        store.transactions.push("begin");
        Ok(())
    }

    fn commit(&self) -> Result<()> {
        let mut store = self.store.lock().unwrap_or_else(|e| e.into_inner());
        store.open = false;
        store.transactions.push("commit");
        Ok(())
    }

    fn rollback(&self) -> Result<()> {
        let mut store = self.store.lock().unwrap_or_else(|e| e.into_inner());
        store.open = false;
        store.transactions.push("rollback");
        Ok(())
    }

    fn is_under_transaction(&self) -> bool {
        self.store.lock().unwrap_or_else(|e| e.into_inner()).open
    }

    fn last_insert_id(&self) -> Option<Value> {
        let store = self.store.lock().unwrap_or_else(|e| e.into_inner());
        (store.last_id > 0).then_some(Value::BigInt(store.last_id))
    }
}

pub fn product(id: i64, name: &str, price: f64, category: i64, status: &str) -> Row {
    Row::from_pairs([
        ("id", Value::BigInt(id)),
        ("name", Value::from(name)),
        ("price", Value::Double(price)),
        ("categories_id", Value::BigInt(category)),
        ("status", Value::from(status)),
    ])
}

pub fn catalog() -> Vec<Row> {
    vec![
        product(1, "Lamp", 19.5, 1, "active"),
        product(2, "Desk", 120.0, 2, "active"),
        product(3, "Stool", 35.0, 2, "archived"),
    ]
}

pub fn none() -> BindTypes {
    BindTypes::new()
}
