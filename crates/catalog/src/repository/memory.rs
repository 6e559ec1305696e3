use async_trait::async_trait;
use domain::AggregateRoot;
use storage::{InMemoryStore, Result, StorageError};

use super::{CatalogUnitOfWork, ExistsResult, PRODUCTS, ProductRepository};
use crate::product::{Product, ProductId, ProductRecord};

/// Product repository over the in-memory document store.
#[derive(Clone)]
pub struct InMemoryProductRepository {
    store: InMemoryStore,
}

impl InMemoryProductRepository {
    /// Creates a repository over `store`.
    pub fn new(store: InMemoryStore) -> Self {
        Self { store }
    }
}

#[async_trait]
impl ProductRepository for InMemoryProductRepository {
    type Store = InMemoryStore;

    async fn insert(&self, uow: &CatalogUnitOfWork<InMemoryStore>, product: &Product) -> Result<()> {
        {
            let mut tx = uow.transaction().await?;
            if self.store.exists(&tx, PRODUCTS, product.id()).await {
                return Err(StorageError::InvalidArgument(format!(
                    "product {} already exists",
                    product.product_id()
                )));
            }
            tx.put(PRODUCTS, product.id(), &product.to_record())?;
        }
        uow.register_aggregate(product);
        Ok(())
    }

    async fn bulk_insert(
        &self,
        uow: &CatalogUnitOfWork<InMemoryStore>,
        products: &[Product],
    ) -> Result<()> {
        for product in products {
            self.insert(uow, product).await?;
        }
        Ok(())
    }

    async fn update(&self, uow: &CatalogUnitOfWork<InMemoryStore>, product: &Product) -> Result<()> {
        {
            let mut tx = uow.transaction().await?;
            if !self.store.exists(&tx, PRODUCTS, product.id()).await {
                return Err(StorageError::not_found(PRODUCTS, product.id()));
            }
            tx.put(PRODUCTS, product.id(), &product.to_record())?;
        }
        uow.register_aggregate(product);
        Ok(())
    }

    async fn delete(&self, uow: &CatalogUnitOfWork<InMemoryStore>, id: ProductId) -> Result<()> {
        let mut tx = uow.transaction().await?;
        if !self.store.exists(&tx, PRODUCTS, id.into()).await {
            return Err(StorageError::not_found(PRODUCTS, id.into()));
        }
        tx.delete(PRODUCTS, id.into());
        Ok(())
    }

    async fn find_by_id(
        &self,
        uow: &CatalogUnitOfWork<InMemoryStore>,
        id: ProductId,
    ) -> Result<Option<Product>> {
        let tx = uow.transaction().await?;
        let record: Option<ProductRecord> = self.store.get(&tx, PRODUCTS, id.into()).await?;
        Ok(record.map(Product::restore))
    }

    async fn find_by_ids(
        &self,
        uow: &CatalogUnitOfWork<InMemoryStore>,
        ids: &[ProductId],
    ) -> Result<Vec<Product>> {
        let products = self.find_all(uow).await?;
        Ok(products
            .into_iter()
            .filter(|p| ids.contains(&p.product_id()))
            .collect())
    }

    async fn find_all(&self, uow: &CatalogUnitOfWork<InMemoryStore>) -> Result<Vec<Product>> {
        let tx = uow.transaction().await?;
        let records: Vec<ProductRecord> = self.store.list(&tx, PRODUCTS).await?;
        Ok(records.into_iter().map(Product::restore).collect())
    }

    async fn exists_by_id(
        &self,
        uow: &CatalogUnitOfWork<InMemoryStore>,
        ids: &[ProductId],
    ) -> Result<ExistsResult> {
        if ids.is_empty() {
            return Err(StorageError::InvalidArgument(
                "ids must be an array with at least one element".to_string(),
            ));
        }

        let tx = uow.transaction().await?;
        let mut result = ExistsResult::default();
        for id in ids {
            if self.store.exists(&tx, PRODUCTS, (*id).into()).await {
                result.exists.push(*id);
            } else {
                result.not_exists.push(*id);
            }
        }
        Ok(result)
    }
}
