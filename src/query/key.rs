//! Query identity.
//!
//! A `QueryKey` is the deterministic identity of one read: resource name
//! plus filters, search, sort and page exactly as authored. Two keys are
//! equal iff their serialized forms match, so filter order matters.

use crate::core::Value;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FilterOp {
    Eq,
    Ne,
    Gt,
    Gte,
    Lt,
    Lte,
    /// Case-insensitive substring match.
    Contains,
}

impl fmt::Display for FilterOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Eq => "eq",
            Self::Ne => "ne",
            Self::Gt => "gt",
            Self::Gte => "gte",
            Self::Lt => "lt",
            Self::Lte => "lte",
            Self::Contains => "contains",
        };
        write!(f, "{s}")
    }
}

/// One (field, operator, value) filter triple.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Filter {
    pub field: String,
    pub op: FilterOp,
    pub value: Value,
}

impl Filter {
    pub fn new(field: impl Into<String>, op: FilterOp, value: impl Into<Value>) -> Self {
        Self {
            field: field.into(),
            op,
            value: value.into(),
        }
    }

    pub fn eq(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::new(field, FilterOp::Eq, value)
    }

    pub fn ne(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::new(field, FilterOp::Ne, value)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum SortDir {
    #[default]
    Asc,
    Desc,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SortSpec {
    pub field: String,
    pub dir: SortDir,
}

impl SortSpec {
    pub fn asc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            dir: SortDir::Asc,
        }
    }

    pub fn desc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            dir: SortDir::Desc,
        }
    }
}

/// Offset/limit window requested from the remote client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Page {
    pub offset: usize,
    pub limit: usize,
}

impl Page {
    pub fn new(offset: usize, limit: usize) -> Self {
        Self { offset, limit }
    }
}

/// Text search over named fields (all searchable fields of the resource
/// when the controller did not narrow it down).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SearchSpec {
    pub fields: Vec<String>,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct QueryKey {
    pub resource: String,
    pub filters: Vec<Filter>,
    pub search: Option<SearchSpec>,
    pub sort: Option<SortSpec>,
    pub page: Option<Page>,
}

impl QueryKey {
    pub fn resource(resource: impl Into<String>) -> Self {
        Self {
            resource: resource.into(),
            filters: Vec::new(),
            search: None,
            sort: None,
            page: None,
        }
    }

    pub fn filter(mut self, filter: Filter) -> Self {
        self.filters.push(filter);
        self
    }

    pub fn search(mut self, fields: Vec<String>, text: impl Into<String>) -> Self {
        self.search = Some(SearchSpec {
            fields,
            text: text.into(),
        });
        self
    }

    pub fn sort(mut self, sort: SortSpec) -> Self {
        self.sort = Some(sort);
        self
    }

    pub fn page(mut self, page: Page) -> Self {
        self.page = Some(page);
        self
    }
}

impl fmt::Display for QueryKey {
    /// Canonical serialized form; equality of keys is equality of this.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.resource)?;
        for filter in &self.filters {
            write!(f, "&f={}:{}:{}", filter.field, filter.op, filter.value)?;
        }
        if let Some(search) = &self.search {
            write!(f, "&q={}:{}", search.fields.join(","), search.text)?;
        }
        if let Some(sort) = &self.sort {
            let dir = match sort.dir {
                SortDir::Asc => "asc",
                SortDir::Desc => "desc",
            };
            write!(f, "&sort={}:{}", sort.field, dir)?;
        }
        if let Some(page) = &self.page {
            write!(f, "&page={}+{}", page.offset, page.limit)?;
        }
        Ok(())
    }
}

/// Predicate selecting cache entries for invalidation. The common case is
/// "everything reading this resource".
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyPredicate {
    /// Every key over the named resource.
    Resource(String),
    /// Exactly one key.
    Exact(QueryKey),
    /// Every key in the cache.
    All,
}

impl KeyPredicate {
    pub fn resource(name: impl Into<String>) -> Self {
        Self::Resource(name.into())
    }

    pub fn matches(&self, key: &QueryKey) -> bool {
        match self {
            Self::Resource(name) => key.resource == *name,
            Self::Exact(exact) => key == exact,
            Self::All => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_equality_is_filter_order_sensitive() {
        let a = QueryKey::resource("activities")
            .filter(Filter::eq("status", "open"))
            .filter(Filter::eq("owner", "alice"));
        let b = QueryKey::resource("activities")
            .filter(Filter::eq("owner", "alice"))
            .filter(Filter::eq("status", "open"));

        assert_ne!(a, b);
        assert_ne!(a.to_string(), b.to_string());
    }

    #[test]
    fn test_identical_keys_are_equal() {
        let make = || {
            QueryKey::resource("products")
                .filter(Filter::new("unit_price", FilterOp::Gte, 10i64))
                .sort(SortSpec::desc("created_at"))
                .page(Page::new(0, 25))
        };
        assert_eq!(make(), make());
        assert_eq!(make().to_string(), make().to_string());
    }

    #[test]
    fn test_display_form() {
        let key = QueryKey::resource("opportunities")
            .filter(Filter::eq("stage", "won"))
            .page(Page::new(25, 25));
        assert_eq!(key.to_string(), "opportunities&f=stage:eq:won&page=25+25");
    }

    #[test]
    fn test_numeric_filter_values_key_by_exact_type() {
        // Integer and float targets are distinct cache keys, both by
        // equality/hash and in the canonical text form.
        let int_key = QueryKey::resource("products").filter(Filter::eq("quantity", 2i64));
        let float_key = QueryKey::resource("products").filter(Filter::eq("quantity", 2.0));

        assert_ne!(int_key, float_key);
        assert_ne!(int_key.to_string(), float_key.to_string());
    }

    #[test]
    fn test_predicate_matching() {
        let key = QueryKey::resource("activities").filter(Filter::eq("status", "open"));

        assert!(KeyPredicate::resource("activities").matches(&key));
        assert!(!KeyPredicate::resource("products").matches(&key));
        assert!(KeyPredicate::Exact(key.clone()).matches(&key));
        assert!(KeyPredicate::All.matches(&key));
    }
}
