//! Cacheable read descriptions.

use futures::future::{BoxFuture, FutureExt};
use serde_json::Value;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

use super::tag::Tag;
use crate::error::ApiResult;

type Fetcher = Arc<dyn Fn() -> BoxFuture<'static, ApiResult<Value>> + Send + Sync>;
type TagFn = Arc<dyn Fn(&Value) -> Vec<Tag> + Send + Sync>;

#[derive(Clone)]
enum Provides {
    Static(Vec<Tag>),
    Derived(TagFn),
}

/// A read keyed by `key`, fetched by `fetcher`, providing a set of tags.
///
/// # Example
///
/// ```ignore
/// let coordinator = coordinator.clone();
/// let query = Query::new("accounts", move || {
///     let coordinator = coordinator.clone();
///     async move { Ok(coordinator.send(&ApiRequest::get("/accounts")).await?.data) }
/// })
/// .provides_with(|accounts| account_tags(accounts));
/// ```
#[derive(Clone)]
pub struct Query {
    key: String,
    fetcher: Fetcher,
    provides: Provides,
}

impl Query {
    pub fn new<F, Fut>(key: impl Into<String>, fetcher: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ApiResult<Value>> + Send + 'static,
    {
        Self {
            key: key.into(),
            fetcher: Arc::new(move || fetcher().boxed()),
            provides: Provides::Static(Vec::new()),
        }
    }

    /// Tags this read provides regardless of its result.
    pub fn provides(mut self, tags: impl IntoIterator<Item = Tag>) -> Self {
        self.provides = Provides::Static(tags.into_iter().collect());
        self
    }

    /// Tags computed from each fetched result.
    pub fn provides_with<F>(mut self, f: F) -> Self
    where
        F: Fn(&Value) -> Vec<Tag> + Send + Sync + 'static,
    {
        self.provides = Provides::Derived(Arc::new(f));
        self
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    /// Tags known before anything has been fetched.
    pub(crate) fn static_tags(&self) -> Vec<Tag> {
        match &self.provides {
            Provides::Static(tags) => tags.clone(),
            Provides::Derived(_) => Vec::new(),
        }
    }

    pub(crate) fn tags_for(&self, value: &Value) -> Vec<Tag> {
        match &self.provides {
            Provides::Static(tags) => tags.clone(),
            Provides::Derived(f) => f(value),
        }
    }

    pub(crate) fn fetch(&self) -> BoxFuture<'static, ApiResult<Value>> {
        (self.fetcher)()
    }
}

impl fmt::Debug for Query {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Query")
            .field("key", &self.key)
            .field("tags", &self.static_tags())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::tag::{ACCOUNTS, TRANSACTIONS};
    use serde_json::json;

    #[tokio::test]
    async fn test_static_tags() {
        let query = Query::new("accounts", || async { Ok(json!([])) })
            .provides([Tag::list(ACCOUNTS)]);
        assert_eq!(query.key(), "accounts");
        assert_eq!(query.static_tags(), vec![Tag::list(ACCOUNTS)]);
        assert_eq!(query.tags_for(&json!(null)), vec![Tag::list(ACCOUNTS)]);
        assert_eq!(query.fetch().await.unwrap(), json!([]));
    }

    #[test]
    fn test_derived_tags() {
        let query = Query::new("tx", || async { Ok(json!([])) }).provides_with(|value| {
            let mut tags = vec![Tag::list(TRANSACTIONS)];
            if let Some(items) = value.as_array() {
                for item in items {
                    if let Some(id) = item["id"].as_str() {
                        tags.push(Tag::item(TRANSACTIONS, id));
                    }
                }
            }
            tags
        });
        assert!(query.static_tags().is_empty());
        assert_eq!(
            query.tags_for(&json!([{"id": "tx-1"}])),
            vec![Tag::list(TRANSACTIONS), Tag::item(TRANSACTIONS, "tx-1")]
        );
    }
}
