//! Read model storage.
//!
//! Projections store their documents as JSON keyed by `(collection, id)`.
//! [`ReadModels`] is the typed facade listeners and assertions use.

use crate::errors::RepositoryError;
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;

/// Document storage for read models.
#[async_trait]
pub trait ReadModelRepository: Send + Sync {
    /// Inserts or replaces a document.
    async fn upsert(&self, collection: &str, id: &str, document: Value) -> Result<(), RepositoryError>;

    /// Fetches a document.
    async fn get(&self, collection: &str, id: &str) -> Result<Option<Value>, RepositoryError>;

    /// Removes a document; removing a missing one is not an error.
    async fn delete(&self, collection: &str, id: &str) -> Result<(), RepositoryError>;

    /// Every document of `collection`, ordered by id.
    async fn list(&self, collection: &str) -> Result<Vec<(String, Value)>, RepositoryError>;
}

/// Typed access to a [`ReadModelRepository`].
#[derive(Clone)]
pub struct ReadModels {
    repository: Arc<dyn ReadModelRepository>,
}

impl ReadModels {
    /// Wraps `repository`.
    pub fn new(repository: Arc<dyn ReadModelRepository>) -> Self {
        Self { repository }
    }

    /// The untyped repository.
    pub fn repository(&self) -> &Arc<dyn ReadModelRepository> {
        &self.repository
    }

    /// Stores `model` under `(collection, id)`.
    pub async fn put<M: Serialize + Sync>(
        &self,
        collection: &str,
        id: &str,
        model: &M,
    ) -> Result<(), RepositoryError> {
        let document = serde_json::to_value(model)?;
        self.repository.upsert(collection, id, document).await
    }

    /// Loads the model stored under `(collection, id)`.
    pub async fn get<M: DeserializeOwned>(
        &self,
        collection: &str,
        id: &str,
    ) -> Result<Option<M>, RepositoryError> {
        match self.repository.get(collection, id).await? {
            Some(document) => Ok(Some(serde_json::from_value(document)?)),
            None => Ok(None),
        }
    }

    /// Loads, modifies and stores a model, starting from `M::default()`
    /// when it does not exist yet.
    pub async fn update<M, F>(&self, collection: &str, id: &str, change: F) -> Result<M, RepositoryError>
    where
        M: Serialize + DeserializeOwned + Default + Send + Sync,
        F: FnOnce(&mut M) + Send,
    {
        let mut model = self.get::<M>(collection, id).await?.unwrap_or_default();
        change(&mut model);
        self.put(collection, id, &model).await?;
        Ok(model)
    }

    /// Removes the model stored under `(collection, id)`.
    pub async fn delete(&self, collection: &str, id: &str) -> Result<(), RepositoryError> {
        self.repository.delete(collection, id).await
    }

    /// Every model of `collection`, ordered by id.
    pub async fn list<M: DeserializeOwned>(
        &self,
        collection: &str,
    ) -> Result<Vec<(String, M)>, RepositoryError> {
        self.repository
            .list(collection)
            .await?
            .into_iter()
            .map(|(id, document)| -> Result<(String, M), RepositoryError> {
                Ok((id, serde_json::from_value(document)?))
            })
            .collect()
    }
}

impl std::fmt::Debug for ReadModels {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReadModels").finish_non_exhaustive()
    }
}
