//! MongoDB client and collection wrapper

use std::time::Duration;

use bson::{doc, Document};
use futures::TryStreamExt;
use mongodb::{
    options::{ClientOptions, IndexOptions, ReturnDocument, UpdateModifications},
    results::UpdateResult,
    Client, Collection, Database, IndexModel,
};
use serde::{de::DeserializeOwned, Serialize};
use tracing::info;

use crate::types::EngineError;

/// Trait for schemas that provide index definitions
pub trait IntoIndexes {
    fn into_indices() -> Vec<(Document, Option<IndexOptions>)>;
}

/// Handle on the engine database
#[derive(Clone)]
pub struct MongoClient {
    db: Database,
}

impl MongoClient {
    /// Connect and ping `db_name`. Server selection and connection
    /// attempts give up after `connect_timeout`.
    pub async fn connect(
        uri: &str,
        db_name: &str,
        connect_timeout: Duration,
    ) -> Result<Self, EngineError> {
        info!(uri = %uri, db = %db_name, "Connecting to MongoDB");

        let options = client_options(uri, connect_timeout).await?;
        let db = Client::with_options(options)?.database(db_name);
        db.run_command(doc! { "ping": 1 })
            .await
            .map_err(|e| EngineError::Unavailable(format!("MongoDB ping failed: {}", e)))?;

        info!(db = %db_name, "MongoDB connected");
        Ok(Self { db })
    }

    /// Typed collection with the schema's indexes in place
    pub async fn collection<T>(&self, name: &str) -> Result<MongoCollection<T>, EngineError>
    where
        T: Serialize + DeserializeOwned + Unpin + Send + Sync + IntoIndexes,
    {
        let inner = self.db.collection::<T>(name);
        let indexes: Vec<IndexModel> = T::into_indices()
            .into_iter()
            .map(|(keys, opts)| IndexModel::builder().keys(keys).options(opts).build())
            .collect();

        if !indexes.is_empty() {
            inner.create_indexes(indexes).await.map_err(|e| {
                EngineError::Unavailable(format!("Failed to create indexes on {}: {}", name, e))
            })?;
        }

        Ok(MongoCollection { inner })
    }
}

async fn client_options(
    uri: &str,
    connect_timeout: Duration,
) -> Result<ClientOptions, EngineError> {
    let mut options = ClientOptions::parse(uri)
        .await
        .map_err(|e| EngineError::InvalidArgument(format!("Invalid MongoDB URI: {}", e)))?;
    options.server_selection_timeout = Some(connect_timeout);
    options.connect_timeout = Some(connect_timeout);
    options.app_name.get_or_insert_with(|| "mission-engine".to_string());
    Ok(options)
}

/// Typed collection; all errors come back as [`EngineError`]
#[derive(Debug, Clone)]
pub struct MongoCollection<T>
where
    T: Serialize + DeserializeOwned + Unpin + Send + Sync,
{
    inner: Collection<T>,
}

impl<T> MongoCollection<T>
where
    T: Serialize + DeserializeOwned + Unpin + Send + Sync,
{
    pub async fn insert_one(&self, item: &T) -> Result<(), EngineError> {
        self.inner.insert_one(item).await?;
        Ok(())
    }

    pub async fn find_one(&self, filter: Document) -> Result<Option<T>, EngineError> {
        Ok(self.inner.find_one(filter).await?)
    }

    /// First document matching `filter` in `sort` order
    pub async fn find_first(
        &self,
        filter: Document,
        sort: Document,
    ) -> Result<Option<T>, EngineError> {
        Ok(self.inner.find_one(filter).sort(sort).await?)
    }

    /// All documents matching `filter`, sorted, optionally limited
    pub async fn find_many(
        &self,
        filter: Document,
        sort: Document,
        limit: Option<i64>,
    ) -> Result<Vec<T>, EngineError> {
        let cursor = match limit {
            Some(limit) => self.inner.find(filter).sort(sort).limit(limit).await?,
            None => self.inner.find(filter).sort(sort).await?,
        };

        Ok(cursor.try_collect().await?)
    }

    pub async fn update_one(
        &self,
        filter: Document,
        update: impl Into<UpdateModifications>,
    ) -> Result<UpdateResult, EngineError> {
        Ok(self.inner.update_one(filter, update).await?)
    }

    /// Update or insert, returning the document after the write
    pub async fn upsert_returning(
        &self,
        filter: Document,
        update: impl Into<UpdateModifications>,
    ) -> Result<Option<T>, EngineError> {
        Ok(self
            .inner
            .find_one_and_update(filter, update)
            .upsert(true)
            .return_document(ReturnDocument::After)
            .await?)
    }

    /// Hard delete; returns the number of removed documents
    pub async fn delete_one(&self, filter: Document) -> Result<u64, EngineError> {
        Ok(self.inner.delete_one(filter).await?.deleted_count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_client_options_apply_timeout() {
        let options = client_options("mongodb://localhost:27017", Duration::from_millis(1500))
            .await
            .unwrap();
        assert_eq!(options.server_selection_timeout, Some(Duration::from_millis(1500)));
        assert_eq!(options.connect_timeout, Some(Duration::from_millis(1500)));
        assert_eq!(options.app_name.as_deref(), Some("mission-engine"));

        let named = client_options("mongodb://localhost:27017/?appName=ops", Duration::from_secs(1))
            .await
            .unwrap();
        assert_eq!(named.app_name.as_deref(), Some("ops"));
    }

    #[tokio::test]
    async fn test_bad_uri_is_invalid_argument() {
        let result = client_options("postgres://localhost", Duration::from_secs(1)).await;
        assert!(matches!(result, Err(EngineError::InvalidArgument(_))));
    }
}
