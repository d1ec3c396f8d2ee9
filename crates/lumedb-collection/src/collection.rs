//! Collection Core: the public operation surface over a document store,
//! an index set, and the update engine. Operates directly against an
//! in-memory `bson::Document` store — there is no planner/executor
//! staging at this scope.

use std::cmp::Ordering;
use std::sync::atomic::{AtomicUsize, Ordering as AtomicOrdering};
use std::sync::{Mutex, RwLock};

use bson::oid::ObjectId;
use bson::{doc, Bson, Document};

use lumedb_engine::{apply_update, is_all_operators, EngineError, FieldIndex, Index, IndexSet};
use lumedb_query::{cmp_values, match_document, parse_query, parse_sort, values_equal, MatchPosition, Path, Sort, SortDirection};
use lumedb_store::{DocumentStore, MemoryStore, StoreKey};

use crate::config::CollectionConfig;
use crate::error::CollectionError;

fn doc_size(doc: &Document) -> usize {
    bson::to_vec(doc).map(|b| b.len()).unwrap_or(0)
}

fn truthy(v: &Bson) -> bool {
    !matches!(v, Bson::Boolean(false) | Bson::Int32(0) | Bson::Int64(0) | Bson::Double(0.0) | Bson::Null)
}

fn looks_like_query_expression(v: &Bson) -> bool {
    matches!(v, Bson::Document(d) if d.keys().next().map(|k| k.starts_with('$')).unwrap_or(false))
}

/// A document that survived the Query Matcher, carrying the store key
/// it lives under and the array index (if any) the match bound to `$`.
struct Candidate {
    key: StoreKey,
    doc: Document,
    match_pos: Option<usize>,
}

fn apply_sort(mut candidates: Vec<Candidate>, keys: &[Sort]) -> Vec<Candidate> {
    if keys.is_empty() {
        return candidates;
    }
    let paths: Vec<Path> = keys.iter().map(|k| Path::parse(&k.field)).collect();
    candidates.sort_by(|a, b| {
        for (path, key) in paths.iter().zip(keys) {
            let ctx = MatchPosition::none();
            let av = path.get(&a.doc, &ctx).cloned().unwrap_or(Bson::Null);
            let bv = path.get(&b.doc, &ctx).cloned().unwrap_or(Bson::Null);
            let ord = cmp_values(&av, &bv);
            let ord = match key.direction {
                SortDirection::Asc => ord,
                SortDirection::Desc => ord.reverse(),
            };
            if ord != Ordering::Equal {
                return ord;
            }
        }
        Ordering::Equal
    });
    candidates
}

/// Splits a `handleQuery` argument into its filter and (optional) sort
/// spec. Supports both the bare-filter form and MongoDB's wrapped
/// `{ $query: ..., $orderby: ... }` / `{ query: ..., orderby: ... }` form.
fn split_query_wrapper(doc: &Document) -> (Document, Option<Document>) {
    match doc.get_document("query").or_else(|_| doc.get_document("$query")) {
        Ok(q) => {
            let orderby = doc
                .get_document("orderby")
                .or_else(|_| doc.get_document("$orderby"))
                .ok()
                .cloned();
            (q.clone(), orderby)
        }
        Err(_) => (doc.clone(), None),
    }
}

fn required_document<'a>(spec: &'a Document, field: &str) -> Result<&'a Document, CollectionError> {
    spec.get_document(field)
        .map_err(|_| CollectionError::MissingField(field.to_string()))
}

enum IdentifierSelectorKind {
    Absent,
    Pinned(Bson),
    In(Bson),
}

/// How the selector relates to the identifier field, for upsert id
/// derivation. A direct equality value
/// "pins" the identifier (the caller already knows it, so no `upserted`
/// field is reported back); a `{ $in: [...] }` clause only narrows it.
fn identifier_selector_kind(id_field: &str, selector: &Document) -> IdentifierSelectorKind {
    match selector.get(id_field) {
        None => IdentifierSelectorKind::Absent,
        Some(v) if looks_like_query_expression(v) => {
            if let Bson::Document(d) = v {
                if let Some(Bson::Array(arr)) = d.get("$in") {
                    if let Some(first) = arr.first() {
                        return IdentifierSelectorKind::In(first.clone());
                    }
                }
            }
            IdentifierSelectorKind::Absent
        }
        Some(v) => IdentifierSelectorKind::Pinned(v.clone()),
    }
}

/// A MongoDB-compatible document collection: document storage, the
/// secondary index set, and the concurrency discipline this workspace
/// relies on (collection-level serialization of structural mutation,
/// an independently locked index list, concurrent readers). Generic
/// over the backing `DocumentStore` — `MemoryStore` is the only backend
/// in scope; persistence is out of scope.
pub struct Collection<S: DocumentStore<Document> = MemoryStore<Document>> {
    db_name: String,
    name: String,
    id_field: String,
    store: S,
    indexes: RwLock<IndexSet>,
    write_lock: Mutex<()>,
    data_size: AtomicUsize,
    deleted_count: AtomicUsize,
}

impl Collection<MemoryStore<Document>> {
    pub fn new(config: CollectionConfig) -> Self {
        Self::with_store(config, MemoryStore::new())
    }
}

impl<S: DocumentStore<Document>> Collection<S> {
    pub fn with_store(config: CollectionConfig, store: S) -> Self {
        let mut indexes = IndexSet::new(&config.id_field);
        for field in &config.indexes {
            indexes.add_index(Box::new(FieldIndex::new(field)));
        }
        Collection {
            db_name: config.db_name,
            name: config.name,
            id_field: config.id_field,
            store,
            indexes: RwLock::new(indexes),
            write_lock: Mutex::new(()),
            data_size: AtomicUsize::new(0),
            deleted_count: AtomicUsize::new(0),
        }
    }

    pub fn namespace(&self) -> String {
        format!("{}.{}", self.db_name, self.name)
    }

    /// Register an additional secondary index. Protected by the index
    /// list's own lock, distinct from `write_lock` — index-list mutation
    /// is its own, narrower critical section.
    pub fn add_index(&self, index: Box<dyn Index>) {
        self.indexes.write().unwrap().add_index(index);
    }

    // ── Insert operations ───────────────────────────────────────

    /// Inserts every document in `docs`, stopping at the first failure
    /// and reporting how many were inserted before it — there is no
    /// batch transactionality. Each document missing an identifier
    /// field gets a fresh `ObjectId`.
    pub fn insert_documents(&self, docs: Vec<Document>) -> (usize, Result<(), CollectionError>) {
        let _guard = self.write_lock.lock().unwrap();
        let mut inserted = 0;
        for doc in docs {
            match self.insert_one(doc) {
                Ok(_) => inserted += 1,
                Err(e) => return (inserted, Err(e)),
            }
        }
        (inserted, Ok(()))
    }

    fn insert_one(&self, mut doc: Document) -> Result<(StoreKey, Document), CollectionError> {
        match doc.get(&self.id_field) {
            None | Some(Bson::Null) => {
                doc.insert(self.id_field.clone(), Bson::ObjectId(ObjectId::new()));
            }
            Some(Bson::Array(_)) => return Err(CollectionError::IdentifierIsArray),
            Some(_) => {}
        }
        let indexes = self.indexes.read().unwrap();
        indexes.check_add(&doc)?;
        let key = self.store.insert(doc.clone())?;
        indexes.add(&doc, key);
        drop(indexes);
        self.data_size.fetch_add(doc_size(&doc), AtomicOrdering::Relaxed);
        Ok((key, doc))
    }

    // ── Query operations ────────────────────────────────────────

    /// Runs a query, optionally sorted/skipped/limited/projected. The
    /// composition is: public op -> (optional) Index Set narrowing ->
    /// document-store fetch -> Query Matcher per candidate.
    pub fn handle_query(
        &self,
        query_object: &Document,
        skip: usize,
        limit: usize,
        field_selector: Option<&Document>,
    ) -> Result<Vec<Document>, CollectionError> {
        let (query, orderby) = split_query_wrapper(query_object);
        let mut candidates = self.matching_candidates(&query)?;
        if let Some(orderby) = orderby {
            candidates = apply_sort(candidates, &parse_sort(&orderby));
        }
        let mut docs: Vec<Document> = candidates.into_iter().skip(skip).map(|c| c.doc).collect();
        if limit > 0 {
            docs.truncate(limit);
        }
        if let Some(selector) = field_selector {
            docs = docs.iter().map(|d| self.project(d, selector)).collect();
        }
        Ok(docs)
    }

    /// Number of documents matching `query` (an empty document counts
    /// everything).
    pub fn count(&self, query: Option<&Document>) -> Result<usize, CollectionError> {
        let empty = doc! {};
        Ok(self.matching_candidates(query.unwrap_or(&empty))?.len())
    }

    fn matching_candidates(&self, query_doc: &Document) -> Result<Vec<Candidate>, CollectionError> {
        let query = parse_query(query_doc)?;
        let narrowed = self.indexes.read().unwrap().candidate_keys(query_doc);
        let mut out = Vec::new();
        match narrowed {
            Some(keys) => {
                for key in keys {
                    if let Some(doc) = self.store.get(key)? {
                        if let Some(pos) = match_document(&query, &doc) {
                            out.push(Candidate { key, doc, match_pos: pos });
                        }
                    }
                }
            }
            None => {
                for (key, doc) in self.store.scan()? {
                    if let Some(pos) = match_document(&query, &doc) {
                        out.push(Candidate { key, doc, match_pos: pos });
                    }
                }
            }
        }
        Ok(out)
    }

    /// Copies every field named in `selector` (with a truthy include
    /// flag) via its dotted path, skipping intermediates that aren't
    /// documents. The identifier is implicitly included unless the
    /// selector explicitly excludes it.
    fn project(&self, doc: &Document, selector: &Document) -> Document {
        let mut out = Document::new();
        let mut include_id = !selector.contains_key(&self.id_field);
        for (field, flag) in selector.iter() {
            if field == &self.id_field {
                include_id = truthy(flag);
                continue;
            }
            if !truthy(flag) {
                continue;
            }
            let path = Path::parse(field);
            if let Some(value) = path.get(doc, &MatchPosition::none()) {
                let _ = path.set(&mut out, &MatchPosition::none(), value.clone());
            }
        }
        if include_id {
            if let Some(id) = doc.get(&self.id_field) {
                out.insert(self.id_field.clone(), id.clone());
            }
        }
        out
    }

    // ── Distinct ─────────────────────────────────────────────────

    /// Sorted, deduplicated values at `key` across every document
    /// matching `query`. Array field values contribute their elements
    /// individually, matching MongoDB's `distinct`. Deduplication uses
    /// the Value Comparator's cross-type equality (`values_equal`), not
    /// `Hash`/`Eq` on raw BSON, so `5` and `5i64` collapse to one value.
    pub fn handle_distinct(&self, key: &str, query: &Document) -> Result<Document, CollectionError> {
        let candidates = self.matching_candidates(query)?;
        let path = Path::parse(key);
        let mut values = Vec::new();
        for candidate in &candidates {
            match path.get(&candidate.doc, &MatchPosition::none()) {
                Some(Bson::Array(arr)) => values.extend(arr.iter().cloned()),
                Some(v) => values.push(v.clone()),
                None => {}
            }
        }
        values.sort_by(cmp_values);
        values.dedup_by(|a, b| values_equal(a, b));
        Ok(doc! { "values": values, "ok": 1 })
    }

    // ── Update operations ───────────────────────────────────────

    pub fn update_documents(
        &self,
        selector: &Document,
        update: &Document,
        multi: bool,
        upsert: bool,
    ) -> Result<Document, CollectionError> {
        let _guard = self.write_lock.lock().unwrap();
        if multi && !is_all_operators(update) {
            return Err(CollectionError::Engine(EngineError::MultiUpdateRequiresOperators));
        }
        let mut candidates = self.matching_candidates(selector)?;
        if !multi {
            candidates.truncate(1);
        }
        if candidates.is_empty() {
            if upsert {
                let (_, id, pinned) = self.upsert(selector, update)?;
                let mut response = doc! { "n": 1, "updatedExisting": false };
                if !pinned {
                    response.insert("upserted", id);
                }
                return Ok(response);
            }
            return Ok(doc! { "n": 0, "updatedExisting": false });
        }
        let mut n: i64 = 0;
        for candidate in candidates {
            self.update_one_locked(candidate.key, &candidate.doc, update, candidate.match_pos, false)?;
            n += 1;
        }
        Ok(doc! { "n": n, "updatedExisting": true })
    }

    /// Applies `update` to `old`, checks every index against the
    /// result, then commits. The index check runs before the store
    /// write so a rejected update never touches the store; both happen
    /// under the caller's `write_lock`, so no reader ever observes the
    /// half-applied state.
    fn update_one_locked(
        &self,
        key: StoreKey,
        old: &Document,
        update: &Document,
        match_pos: Option<usize>,
        upsert_inserting: bool,
    ) -> Result<Document, CollectionError> {
        let new_doc = apply_update(old, update, match_pos, &self.id_field, upsert_inserting)?;
        let indexes = self.indexes.read().unwrap();
        indexes.check_update(old, &new_doc, key)?;
        indexes.update_in_place(old, &new_doc, key);
        drop(indexes);
        self.store.replace(key, new_doc.clone())?;
        self.adjust_data_size(doc_size(old), doc_size(&new_doc));
        Ok(new_doc)
    }

    fn adjust_data_size(&self, old_size: usize, new_size: usize) {
        if new_size >= old_size {
            self.data_size.fetch_add(new_size - old_size, AtomicOrdering::Relaxed);
        } else {
            self.data_size.fetch_sub(old_size - new_size, AtomicOrdering::Relaxed);
        }
    }

    // ── Delete operations ───────────────────────────────────────

    /// Deletes up to `limit` documents matching `selector` (`limit ==
    /// 0` means unlimited), returning how many were removed.
    pub fn delete_documents(&self, selector: &Document, limit: usize) -> Result<usize, CollectionError> {
        let _guard = self.write_lock.lock().unwrap();
        let candidates = self.matching_candidates(selector)?;
        let take = if limit == 0 { candidates.len() } else { limit.min(candidates.len()) };
        let mut deleted = 0;
        for candidate in candidates.into_iter().take(take) {
            self.delete_by_key(candidate.key, &candidate.doc)?;
            deleted += 1;
        }
        Ok(deleted)
    }

    fn delete_by_key(&self, key: StoreKey, doc: &Document) -> Result<(), CollectionError> {
        let indexes = self.indexes.read().unwrap();
        indexes.remove(doc, key);
        drop(indexes);
        self.store.remove(key)?;
        self.data_size.fetch_sub(doc_size(doc), AtomicOrdering::Relaxed);
        self.deleted_count.fetch_add(1, AtomicOrdering::Relaxed);
        Ok(())
    }

    // ── findAndModify ────────────────────────────────────────────

    /// Atomically finds the first document matching `spec.query` (in
    /// `spec.sort` order, if given) and either removes it or applies
    /// `spec.update` to it, returning the pre- or post-image per
    /// `spec.new`. Falls through to an upsert when nothing matches and
    /// `spec.upsert` is set. Grounded on `executor/nodes/upsert.rs` and
    /// `projection.rs`, adapted to the in-memory `Collection`.
    pub fn find_and_modify(&self, spec: &Document) -> Result<Document, CollectionError> {
        let _guard = self.write_lock.lock().unwrap();
        let empty = doc! {};
        let query = spec.get_document("query").unwrap_or(&empty);
        let remove = spec.get_bool("remove").unwrap_or(false);
        let new_flag = spec.get_bool("new").unwrap_or(false);
        let upsert = spec.get_bool("upsert").unwrap_or(false);
        let fields = spec.get_document("fields").ok();

        let mut candidates = self.matching_candidates(query)?;
        if let Ok(sort_doc) = spec.get_document("sort") {
            candidates = apply_sort(candidates, &parse_sort(sort_doc));
        }

        let candidate = match candidates.into_iter().next() {
            Some(c) => c,
            None => {
                if upsert && !remove {
                    let update = required_document(spec, "update")?;
                    let (new_doc, id, pinned) = self.upsert(query, update)?;
                    let value = if new_flag {
                        fields.map(|f| self.project(&new_doc, f)).unwrap_or(new_doc)
                    } else {
                        Bson::Null
                    };
                    let mut last_error = doc! { "updatedExisting": false, "n": 1 };
                    if !pinned {
                        last_error.insert("upserted", id);
                    }
                    return Ok(doc! { "value": value, "lastErrorObject": last_error, "ok": 1 });
                }
                return Ok(doc! { "value": Bson::Null, "ok": 1 });
            }
        };

        if remove {
            let pre = candidate.doc.clone();
            self.delete_by_key(candidate.key, &pre)?;
            let value = fields.map(|f| self.project(&pre, f)).unwrap_or(pre);
            return Ok(doc! {
                "value": value,
                "lastErrorObject": { "updatedExisting": true, "n": 1 },
                "ok": 1,
            });
        }

        let update = required_document(spec, "update")?;
        let pre = candidate.doc.clone();
        let new_doc = self.update_one_locked(candidate.key, &pre, update, candidate.match_pos, false)?;
        let returned = if new_flag { new_doc } else { pre };
        let value = fields.map(|f| self.project(&returned, f)).unwrap_or(returned);
        Ok(doc! {
            "value": value,
            "lastErrorObject": { "updatedExisting": true, "n": 1 },
            "ok": 1,
        })
    }

    /// Upsert procedure: seed a document from the
    /// selector (dropping `$`-prefixed top-level keys and any value
    /// that is itself a query expression), apply the update to that
    /// seed with the upsert flag set, derive the identifier if still
    /// absent (the selector's pinned value, the first element of an
    /// `_id: { $in: [...] }` clause, or a fresh `ObjectId`), then
    /// insert. Returns the inserted document, its identifier, and
    /// whether the selector pinned that identifier directly — callers
    /// use the latter to decide whether to report `upserted`.
    fn upsert(&self, selector: &Document, update: &Document) -> Result<(Document, Bson, bool), CollectionError> {
        let mut seed = Document::new();
        for (k, v) in selector.iter() {
            if k.starts_with('$') || looks_like_query_expression(v) {
                continue;
            }
            seed.insert(k.clone(), v.clone());
        }
        let applied = apply_update(&seed, update, None, &self.id_field, true)?;
        let (doc, pinned) = self.ensure_identifier(applied, selector)?;
        let id = doc.get(&self.id_field).cloned().expect("ensure_identifier always sets the identifier");
        self.insert_one(doc.clone())?;
        Ok((doc, id, pinned))
    }

    fn ensure_identifier(&self, mut doc: Document, selector: &Document) -> Result<(Document, bool), CollectionError> {
        if !matches!(doc.get(&self.id_field), None | Some(Bson::Null)) {
            let pinned = matches!(identifier_selector_kind(&self.id_field, selector), IdentifierSelectorKind::Pinned(_));
            return Ok((doc, pinned));
        }
        match identifier_selector_kind(&self.id_field, selector) {
            IdentifierSelectorKind::Pinned(v) => {
                doc.insert(self.id_field.clone(), v);
                Ok((doc, true))
            }
            IdentifierSelectorKind::In(v) => {
                doc.insert(self.id_field.clone(), v);
                Ok((doc, false))
            }
            IdentifierSelectorKind::Absent => {
                doc.insert(self.id_field.clone(), Bson::ObjectId(ObjectId::new()));
                Ok((doc, false))
            }
        }
    }

    // ── Diagnostics ──────────────────────────────────────────────

    pub fn get_stats(&self) -> Document {
        let indexes = self.indexes.read().unwrap();
        let count = self.store.len();
        let size = self.data_size.load(AtomicOrdering::Relaxed) as i64;
        let avg_obj_size = if count > 0 { size / count as i64 } else { 0 };
        let mut index_size = Document::new();
        for idx in indexes.iter() {
            index_size.insert(idx.name().to_string(), idx.data_size() as i64);
        }
        doc! {
            "ns": self.namespace(),
            "count": count as i64,
            "size": size,
            "avgObjSize": avg_obj_size,
            "storageSize": 0_i64,
            "numExtents": 0_i64,
            "nindexes": indexes.len() as i64,
            "indexSize": index_size,
            "ok": 1,
        }
    }

    pub fn validate(&self) -> Document {
        let indexes = self.indexes.read().unwrap();
        let mut keys_per_index = Document::new();
        for idx in indexes.iter() {
            keys_per_index.insert(idx.name().to_string(), idx.count() as i64);
        }
        doc! {
            "ns": self.namespace(),
            "extentCount": 0_i64,
            "datasize": self.data_size.load(AtomicOrdering::Relaxed) as i64,
            "nrecords": self.store.len() as i64,
            "padding": 1_i64,
            "deletedCount": self.deleted_count.load(AtomicOrdering::Relaxed) as i64,
            "deletedSize": 0_i64,
            "nIndexes": indexes.len() as i64,
            "keysPerIndex": keys_per_index,
            "valid": true,
            "errors": Vec::<Bson>::new(),
            "ok": 1,
        }
    }
}
