//! Assemble a PHQL SELECT from parts.

use crate::cache::CacheOptions;
use crate::manager::Manager;
use crate::query::Query;
use phql_core::bind::{BindTypes, Binds};
use phql_core::error::Error;
use phql_core::ir::JoinType;
use phql_core::Result;
use regex::Regex;
use std::sync::OnceLock;

/// A model in FROM, optionally aliased.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelRef {
    pub name: String,
    pub alias: Option<String>,
}

/// A join to add after FROM.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JoinSpec {
    pub model: String,
    pub conditions: Option<String>,
    pub alias: Option<String>,
    /// Plain `JOIN` when unset
    pub join_type: Option<JoinType>,
}

/// Parts of a SELECT. Expressions are PHQL fragments used as written.
#[derive(Debug, Clone, Default)]
pub struct Params {
    pub models: Vec<ModelRef>,
    pub columns: Vec<String>,
    pub distinct: Option<bool>,
    pub joins: Vec<JoinSpec>,
    pub conditions: Option<String>,
    pub bind: Binds,
    pub bind_types: BindTypes,
    pub group: Vec<String>,
    pub having: Option<String>,
    pub order: Vec<String>,
    pub limit: Option<u64>,
    pub offset: Option<u64>,
    pub for_update: bool,
    pub shared_lock: bool,
    pub cache: Option<CacheOptions>,
}

impl Params {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn model(mut self, name: impl Into<String>) -> Self {
        self.models.push(ModelRef {
            name: name.into(),
            alias: None,
        });
        self
    }

    pub fn model_as(mut self, name: impl Into<String>, alias: impl Into<String>) -> Self {
        self.models.push(ModelRef {
            name: name.into(),
            alias: Some(alias.into()),
        });
        self
    }

    pub fn column(mut self, column: impl Into<String>) -> Self {
        self.columns.push(column.into());
        self
    }

    pub fn distinct(mut self, distinct: bool) -> Self {
        self.distinct = Some(distinct);
        self
    }

    pub fn join(mut self, join: JoinSpec) -> Self {
        self.joins.push(join);
        self
    }

    pub fn conditions(mut self, conditions: impl Into<String>) -> Self {
        self.conditions = Some(conditions.into());
        self
    }

    pub fn bind(mut self, bind: Binds) -> Self {
        self.bind = bind;
        self
    }

    pub fn bind_types(mut self, bind_types: BindTypes) -> Self {
        self.bind_types = bind_types;
        self
    }

    pub fn group(mut self, group: impl Into<String>) -> Self {
        self.group.push(group.into());
        self
    }

    pub fn having(mut self, having: impl Into<String>) -> Self {
        self.having = Some(having.into());
        self
    }

    pub fn order(mut self, order: impl Into<String>) -> Self {
        self.order.push(order.into());
        self
    }

    pub fn limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn offset(mut self, offset: u64) -> Self {
        self.offset = Some(offset);
        self
    }

    pub fn for_update(mut self, for_update: bool) -> Self {
        self.for_update = for_update;
        self
    }

    pub fn shared_lock(mut self, shared_lock: bool) -> Self {
        self.shared_lock = shared_lock;
        self
    }

    pub fn cache(mut self, options: CacheOptions) -> Self {
        self.cache = Some(options);
        self
    }
}

fn identifier() -> Option<&'static Regex> {
    static IDENTIFIER: OnceLock<Option<Regex>> = OnceLock::new();
    IDENTIFIER
        .get_or_init(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").ok())
        .as_ref()
}

/// Bracket a plain identifier; anything else is used as written.
fn escape(name: &str) -> String {
    let plain = match identifier() {
        Some(re) => re.is_match(name),
        None => false,
    };
    if plain {
        format!("[{name}]")
    } else {
        name.to_string()
    }
}

/// Builds a PHQL SELECT from [`Params`] and turns it into a [`Query`].
#[derive(Debug, Clone)]
pub struct Builder {
    manager: Manager,
    params: Params,
}

impl Builder {
    pub fn new(params: Params, manager: &Manager) -> Self {
        Self {
            manager: manager.clone(),
            params,
        }
    }

    pub fn params(&self) -> &Params {
        &self.params
    }

    pub fn params_mut(&mut self) -> &mut Params {
        &mut self.params
    }

    /// The PHQL statement for the current parts.
    pub fn phql(&self) -> Result<String> {
        let params = &self.params;
        if params.models.is_empty() {
            return Err(Error::config(
                "At least one model is required to build the query",
            ));
        }

        let mut phql = String::from("SELECT ");
        match params.distinct {
            Some(true) => phql.push_str("DISTINCT "),
            Some(false) => phql.push_str("ALL "),
            None => {}
        }

        if params.columns.is_empty() {
            let columns: Vec<String> = params
                .models
                .iter()
                .map(|model| {
                    let domain = model.alias.as_deref().unwrap_or(&model.name);
                    format!("{}.*", escape(domain))
                })
                .collect();
            phql.push_str(&columns.join(", "));
        } else {
            phql.push_str(&params.columns.join(", "));
        }

        let models: Vec<String> = params
            .models
            .iter()
            .map(|model| match &model.alias {
                Some(alias) => format!("{} AS {}", escape(&model.name), escape(alias)),
                None => escape(&model.name),
            })
            .collect();
        phql.push_str(" FROM ");
        phql.push_str(&models.join(", "));

        for join in &params.joins {
            phql.push(' ');
            phql.push_str(join.join_type.map_or("JOIN", JoinType::as_str));
            phql.push(' ');
            phql.push_str(&escape(&join.model));
            if let Some(alias) = &join.alias {
                phql.push_str(" AS ");
                phql.push_str(&escape(alias));
            }
            if let Some(conditions) = &join.conditions {
                phql.push_str(" ON ");
                phql.push_str(conditions);
            }
        }

        if let Some(conditions) = &params.conditions {
            phql.push_str(" WHERE ");
            phql.push_str(conditions);
        }
        if !params.group.is_empty() {
            let group: Vec<String> = params.group.iter().map(|g| escape(g)).collect();
            phql.push_str(" GROUP BY ");
            phql.push_str(&group.join(", "));
        }
        if let Some(having) = &params.having {
            phql.push_str(" HAVING ");
            phql.push_str(having);
        }
        if !params.order.is_empty() {
            phql.push_str(" ORDER BY ");
            phql.push_str(&params.order.join(", "));
        }
        if let Some(limit) = params.limit {
            phql.push_str(&format!(" LIMIT {limit}"));
            if let Some(offset) = params.offset {
                phql.push_str(&format!(" OFFSET {offset}"));
            }
        }
        if params.for_update {
            phql.push_str(" FOR UPDATE");
        }
        Ok(phql)
    }

    /// A query for the built statement, carrying binds, lock and cache
    /// options.
    pub fn query(&self) -> Result<Query> {
        let phql = self.phql()?;
        tracing::debug!(phql = %phql, "Built PHQL");
        let mut query = self.manager.create_query(phql);
        query
            .set_bind_params(self.params.bind.clone(), false)
            .set_bind_types(self.params.bind_types.clone(), false)
            .set_shared_lock(self.params.shared_lock);
        if let Some(options) = &self.params.cache {
            query.cache(options.clone());
        }
        Ok(query)
    }
}
