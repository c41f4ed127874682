//! Engine settings carried by the models manager.

/// Feature switches and limits of the query engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    /// Translate attributes through model column maps (default: true)
    pub column_renaming: bool,
    /// Derive join conditions from relations when a join has no ON (default: true)
    pub enable_implicit_joins: bool,
    /// Cast fetched values to the declared column types (default: false)
    pub cast_on_hydrate: bool,
    /// Accept string and number literals in PHQL (default: true)
    pub enable_literals: bool,
    /// Number of prepared statements kept by the IR cache (default: 1024)
    pub ir_cache_capacity: usize,
    /// Result sets up to this many rows are fetched eagerly (default: 32)
    pub eager_threshold: usize,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            column_renaming: true,
            enable_implicit_joins: true,
            cast_on_hydrate: false,
            enable_literals: true,
            ir_cache_capacity: 1024,
            eager_threshold: 32,
        }
    }
}

impl Settings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn column_renaming(mut self, enabled: bool) -> Self {
        self.column_renaming = enabled;
        self
    }

    pub fn enable_implicit_joins(mut self, enabled: bool) -> Self {
        self.enable_implicit_joins = enabled;
        self
    }

    pub fn cast_on_hydrate(mut self, enabled: bool) -> Self {
        self.cast_on_hydrate = enabled;
        self
    }

    pub fn enable_literals(mut self, enabled: bool) -> Self {
        self.enable_literals = enabled;
        self
    }

    pub fn ir_cache_capacity(mut self, capacity: usize) -> Self {
        self.ir_cache_capacity = capacity;
        self
    }

    pub fn eager_threshold(mut self, rows: usize) -> Self {
        self.eager_threshold = rows;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let settings = Settings::default();
        assert!(settings.column_renaming);
        assert!(settings.enable_implicit_joins);
        assert!(!settings.cast_on_hydrate);
        assert!(settings.enable_literals);
        assert_eq!(settings.eager_threshold, 32);
    }

    #[test]
    fn test_chained_setters() {
        let settings = Settings::new()
            .enable_literals(false)
            .cast_on_hydrate(true)
            .ir_cache_capacity(8);
        assert!(!settings.enable_literals);
        assert!(settings.cast_on_hydrate);
        assert_eq!(settings.ir_cache_capacity, 8);
    }
}
