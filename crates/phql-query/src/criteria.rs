//! Fluent construction of model queries.

use crate::builder::{Builder, JoinSpec, ModelRef, Params};
use crate::cache::CacheOptions;
use crate::manager::Manager;
use crate::query::QueryResult;
use indexmap::IndexMap;
use phql_core::bind::{BindTypes, Binds};
use phql_core::error::Error;
use phql_core::ir::JoinType;
use phql_core::value::Value;
use phql_core::Result;

/// Query parameters for one model, assembled step by step.
///
/// Conditions added through `between_where`, `in_where` and friends bind
/// their values to generated `ACP{n}` placeholders.
#[derive(Debug, Clone, Default)]
pub struct Criteria {
    model: Option<String>,
    params: Params,
    hidden_params: usize,
}

impl Criteria {
    pub fn new() -> Self {
        Self::default()
    }

    /// Criteria for `model`.
    pub fn for_model(model: impl Into<String>) -> Self {
        Self::new().model(model)
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn model_name(&self) -> Option<&str> {
        self.model.as_deref()
    }

    pub fn params(&self) -> &Params {
        &self.params
    }

    pub fn conditions_text(&self) -> Option<&str> {
        self.params.conditions.as_deref()
    }

    /// Replace the bound values, or merge into them.
    pub fn bind(mut self, binds: Binds, merge: bool) -> Self {
        if merge {
            self.params.bind.merge(&binds);
        } else {
            self.params.bind = binds;
        }
        self
    }

    pub fn bind_types(mut self, types: BindTypes) -> Self {
        self.params.bind_types = types;
        self
    }

    pub fn distinct(mut self, distinct: bool) -> Self {
        self.params.distinct = Some(distinct);
        self
    }

    pub fn columns<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.params.columns = columns.into_iter().map(Into::into).collect();
        self
    }

    pub fn join(
        mut self,
        model: impl Into<String>,
        conditions: Option<&str>,
        alias: Option<&str>,
        join_type: Option<JoinType>,
    ) -> Self {
        self.params.joins.push(JoinSpec {
            model: model.into(),
            conditions: conditions.map(str::to_string),
            alias: alias.map(str::to_string),
            join_type,
        });
        self
    }

    pub fn inner_join(self, model: impl Into<String>, conditions: Option<&str>, alias: Option<&str>) -> Self {
        self.join(model, conditions, alias, Some(JoinType::Inner))
    }

    pub fn left_join(self, model: impl Into<String>, conditions: Option<&str>, alias: Option<&str>) -> Self {
        self.join(model, conditions, alias, Some(JoinType::Left))
    }

    pub fn right_join(self, model: impl Into<String>, conditions: Option<&str>, alias: Option<&str>) -> Self {
        self.join(model, conditions, alias, Some(JoinType::Right))
    }

    /// Set the WHERE clause, merging `binds` into the bound values.
    pub fn where_(mut self, conditions: impl Into<String>, binds: Option<Binds>) -> Self {
        self.params.conditions = Some(conditions.into());
        self.merge_binds(binds)
    }

    /// Alias of [`Criteria::where_`] without binds.
    pub fn conditions(self, conditions: impl Into<String>) -> Self {
        self.where_(conditions, None)
    }

    pub fn and_where(self, conditions: impl Into<String>, binds: Option<Binds>) -> Self {
        self.combine("AND", conditions.into(), binds)
    }

    pub fn or_where(self, conditions: impl Into<String>, binds: Option<Binds>) -> Self {
        self.combine("OR", conditions.into(), binds)
    }

    /// `expr BETWEEN min AND max`, added with AND.
    pub fn between_where(self, expr: &str, min: impl Into<Value>, max: impl Into<Value>) -> Self {
        self.range_where(expr, "BETWEEN", min.into(), max.into())
    }

    pub fn not_between_where(
        self,
        expr: &str,
        min: impl Into<Value>,
        max: impl Into<Value>,
    ) -> Self {
        self.range_where(expr, "NOT BETWEEN", min.into(), max.into())
    }

    /// `expr IN (...)`, added with AND. No values matches no row.
    pub fn in_where(self, expr: &str, values: Vec<Value>) -> Self {
        if values.is_empty() {
            return self.and_where(format!("{expr} != {expr}"), None);
        }
        self.list_where(expr, "IN", values)
    }

    /// `expr NOT IN (...)`, added with AND. No values adds nothing.
    pub fn not_in_where(self, expr: &str, values: Vec<Value>) -> Self {
        if values.is_empty() {
            return self;
        }
        self.list_where(expr, "NOT IN", values)
    }

    pub fn order_by(mut self, order: impl Into<String>) -> Self {
        self.params.order = vec![order.into()];
        self
    }

    pub fn group_by(mut self, group: impl Into<String>) -> Self {
        self.params.group = vec![group.into()];
        self
    }

    pub fn having(mut self, having: impl Into<String>) -> Self {
        self.params.having = Some(having.into());
        self
    }

    /// Limit the rows. Negative numbers count as positive; zero leaves the
    /// criteria unchanged.
    pub fn limit(mut self, limit: i64, offset: Option<i64>) -> Self {
        let limit = limit.unsigned_abs();
        if limit == 0 {
            return self;
        }
        self.params.limit = Some(limit);
        self.params.offset = offset.map(i64::unsigned_abs).filter(|offset| *offset > 0);
        self
    }

    pub fn for_update(mut self, for_update: bool) -> Self {
        self.params.for_update = for_update;
        self
    }

    pub fn shared_lock(mut self, shared_lock: bool) -> Self {
        self.params.shared_lock = shared_lock;
        self
    }

    pub fn cache(mut self, options: CacheOptions) -> Self {
        self.params.cache = Some(options);
        self
    }

    /// Criteria matching the non-empty values of `data`: text columns with
    /// `LIKE '%value%'`, others with `=`, joined by `operator`.
    pub fn from_input(
        manager: &Manager,
        model: &str,
        data: &IndexMap<String, Value>,
        operator: &str,
    ) -> Result<Self> {
        let metadata = manager.metadata();
        let data_types = metadata.data_types(model)?;
        let columns = metadata.reverse_column_map(model)?;

        let mut conditions = Vec::new();
        let mut binds = Binds::new();
        for (field, value) in data {
            let column = columns
                .as_ref()
                .and_then(|map| map.get(field))
                .map_or(field.as_str(), String::as_str);
            let Some(data_type) = data_types.get(column) else {
                continue;
            };
            if value.is_blank() {
                continue;
            }
            if data_type.is_textual() {
                conditions.push(format!("[{field}] LIKE :{field}:"));
                let text = match value {
                    Value::Text(text) => text.clone(),
                    other => other.to_json().to_string(),
                };
                binds.insert(field.as_str(), format!("%{text}%"));
            } else {
                conditions.push(format!("[{field}] = :{field}:"));
                binds.insert(field.as_str(), value.clone());
            }
        }

        let criteria = Self::for_model(model);
        if conditions.is_empty() {
            return Ok(criteria);
        }
        Ok(criteria
            .where_(conditions.join(&format!(" {operator} ")), None)
            .bind(binds, false))
    }

    /// A builder over the model and parameters.
    pub fn create_builder(&self, manager: &Manager) -> Result<Builder> {
        let model = self.model.as_ref().ok_or_else(|| {
            Error::config("A model name is required to execute the criteria")
        })?;
        let mut params = self.params.clone();
        params.models = vec![ModelRef {
            name: model.clone(),
            alias: None,
        }];
        Ok(Builder::new(params, manager))
    }

    /// Build and run the query.
    pub fn execute(&self, manager: &Manager) -> Result<QueryResult> {
        let mut query = self.create_builder(manager)?.query()?;
        query.execute(&Binds::new(), &BindTypes::new())
    }

    fn combine(mut self, operator: &str, conditions: String, binds: Option<Binds>) -> Self {
        self.params.conditions = Some(match self.params.conditions.take() {
            Some(current) => format!("({current}) {operator} ({conditions})"),
            None => conditions,
        });
        self.merge_binds(binds)
    }

    fn merge_binds(mut self, binds: Option<Binds>) -> Self {
        if let Some(binds) = binds {
            self.params.bind.merge(&binds);
        }
        self
    }

    fn hidden_param(&mut self) -> String {
        let name = format!("ACP{}", self.hidden_params);
        self.hidden_params += 1;
        name
    }

    fn range_where(mut self, expr: &str, operator: &str, min: Value, max: Value) -> Self {
        let (low, high) = (self.hidden_param(), self.hidden_param());
        let mut binds = Binds::new();
        binds.insert(low.as_str(), min).insert(high.as_str(), max);
        self.and_where(format!("{expr} {operator} :{low}: AND :{high}:"), Some(binds))
    }

    fn list_where(mut self, expr: &str, operator: &str, values: Vec<Value>) -> Self {
        let mut binds = Binds::new();
        let mut placeholders = Vec::with_capacity(values.len());
        for value in values {
            let name = self.hidden_param();
            placeholders.push(format!(":{name}:"));
            binds.insert(name, value);
        }
        self.and_where(
            format!("{expr} {operator} ({})", placeholders.join(", ")),
            Some(binds),
        )
    }
}
