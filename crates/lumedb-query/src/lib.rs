mod matcher;
mod path;
mod sort;
mod value;

pub use matcher::{parse_query, match_document, Query, QueryError};
pub use path::{MatchPosition, Path, PathError};
pub use sort::{parse_sort, Sort, SortDirection};
pub use value::{add_values, cmp_values, mul_values, values_equal, ArithmeticError};

/// The document-value sum type everything in this workspace operates
/// on. Reusing `bson::Bson` directly rather than inventing a parallel
/// value type.
pub type Value = bson::Bson;
