use bson::Document;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDirection {
    Asc,
    Desc,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sort {
    pub field: String,
    pub direction: SortDirection,
}

/// Parse a MongoDB-style `orderby` document (`{ field: 1 }` ascending,
/// `{ field: -1 }` descending) into an ordered list of `Sort` keys.
pub fn parse_sort(doc: &Document) -> Vec<Sort> {
    doc.iter()
        .map(|(field, v)| {
            let direction = match v.as_i32().or_else(|| v.as_i64().map(|n| n as i32)) {
                Some(n) if n < 0 => SortDirection::Desc,
                _ => SortDirection::Asc,
            };
            Sort {
                field: field.clone(),
                direction,
            }
        })
        .collect()
}
