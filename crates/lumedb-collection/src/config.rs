use serde::{Deserialize, Serialize};

fn default_id_field() -> String {
    "_id".to_string()
}

/// Configures a `Collection`: its namespace and which fields get a
/// secondary index at construction time. `db_name`/`id_field` are modeled
/// as collection-level state rather than assuming `_id`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollectionConfig {
    pub db_name: String,
    pub name: String,
    #[serde(default = "default_id_field")]
    pub id_field: String,
    #[serde(default)]
    pub indexes: Vec<String>,
}

impl CollectionConfig {
    pub fn new(db_name: impl Into<String>, name: impl Into<String>) -> Self {
        CollectionConfig {
            db_name: db_name.into(),
            name: name.into(),
            id_field: default_id_field(),
            indexes: Vec::new(),
        }
    }

    pub fn with_id_field(mut self, field: impl Into<String>) -> Self {
        self.id_field = field.into();
        self
    }

    pub fn with_indexes(mut self, fields: impl IntoIterator<Item = String>) -> Self {
        self.indexes = fields.into_iter().collect();
        self
    }
}
