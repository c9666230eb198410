use mongodb::bson::{Bson, Document as BsonDocument, doc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use super::{DocumentId, StoreError, StoreResult};

/// Field every stored document is keyed by.
pub const ID_FIELD: &str = "_id";

/// Query predicate in MongoDB query syntax. An empty filter matches everything.
pub type Filter = BsonDocument;

/// Partial modification. Either operator form (`$set`, `$unset`, `$inc`) or a
/// plain field map, which is treated as `$set`.
pub type Update = BsonDocument;

/// Filter matching the document with the given identifier.
pub fn by_id(id: DocumentId) -> Filter {
    let mut filter = Filter::new();
    filter.insert(ID_FIELD, id_bson(id));
    filter
}

/// Stored representation of an identifier.
pub(crate) fn id_bson(id: DocumentId) -> Bson {
    Bson::String(id.to_string())
}

/// Equality conditions of a filter: plain values and `{"$eq": v}`. Seeds the
/// document an upsert inserts.
pub(crate) fn equality_fields(filter: &Filter) -> BsonDocument {
    filter
        .iter()
        .filter(|(key, _)| !key.starts_with('$'))
        .filter_map(|(key, condition)| match condition {
            Bson::Document(ops) if !ops.is_empty() && ops.keys().all(|k| k.starts_with('$')) => {
                ops.get("$eq").map(|value| (key.clone(), value.clone()))
            }
            other => Some((key.clone(), other.clone())),
        })
        .collect()
}

/// Normalise a patch into operator form.
///
/// Rejects patches that mix operators with plain fields and any attempt to
/// change `_id`.
pub fn normalize_update(patch: Update) -> StoreResult<Update> {
    if patch.is_empty() {
        return Ok(patch);
    }

    let operators = patch.keys().filter(|k| k.starts_with('$')).count();
    let normalized = if operators == 0 {
        doc! { "$set": patch }
    } else if operators == patch.len() {
        patch
    } else {
        return Err(StoreError::validation(
            "update mixes operators with plain fields",
        ));
    };

    for (operator, fields) in &normalized {
        let fields = fields.as_document().ok_or_else(|| {
            StoreError::validation(format!("'{operator}' expects a document of fields"))
        })?;
        if fields.contains_key(ID_FIELD) {
            return Err(StoreError::validation("the _id field is immutable"));
        }
    }

    Ok(normalized)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    #[strum(to_string = "asc", serialize = "ascending")]
    Ascending,
    #[strum(to_string = "desc", serialize = "descending")]
    Descending,
}

impl SortDirection {
    fn as_bson(self) -> i32 {
        match self {
            SortDirection::Ascending => 1,
            SortDirection::Descending => -1,
        }
    }
}

/// Ordered sort specification; earlier fields take precedence.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Sort(Vec<(String, SortDirection)>);

impl Sort {
    pub fn by(field: impl Into<String>, direction: SortDirection) -> Self {
        Self(vec![(field.into(), direction)])
    }

    pub fn then(mut self, field: impl Into<String>, direction: SortDirection) -> Self {
        self.0.push((field.into(), direction));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn fields(&self) -> impl Iterator<Item = (&str, SortDirection)> {
        self.0.iter().map(|(field, dir)| (field.as_str(), *dir))
    }

    pub fn to_document(&self) -> BsonDocument {
        self.0
            .iter()
            .map(|(field, dir)| (field.clone(), Bson::Int32(dir.as_bson())))
            .collect()
    }
}

/// Page selection for `find_with_pagination`.
///
/// Pages are 1-based; `skip = (page - 1) * limit`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pagination {
    pub page: u64,
    pub limit: u64,
    pub sort: Sort,
}

impl Default for Pagination {
    fn default() -> Self {
        Self {
            page: 1,
            limit: 10,
            sort: Sort::default(),
        }
    }
}

impl Pagination {
    pub fn new(page: u64, limit: u64) -> StoreResult<Self> {
        let pagination = Self {
            page,
            limit,
            sort: Sort::default(),
        };
        pagination.validate()?;
        Ok(pagination)
    }

    pub fn with_sort(mut self, sort: Sort) -> Self {
        self.sort = sort;
        self
    }

    pub fn validate(&self) -> StoreResult<()> {
        if self.page < 1 {
            return Err(StoreError::validation("page must be at least 1"));
        }
        if self.limit < 1 {
            return Err(StoreError::validation("limit must be at least 1"));
        }
        Ok(())
    }

    pub fn skip(&self) -> u64 {
        self.page.saturating_sub(1).saturating_mul(self.limit)
    }
}
