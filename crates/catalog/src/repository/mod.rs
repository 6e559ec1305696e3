//! Product persistence boundary.
//!
//! Every operation runs inside the caller's [`UnitOfWork`] and uses its open
//! transaction. Writes register the product with the unit of work so that
//! its events are published when the unit of work completes.

mod memory;
mod postgres;

use async_trait::async_trait;
use domain::UnitOfWork;
use storage::{Result, TransactionManager};

use crate::product::{CatalogEvent, Product, ProductId};

pub use memory::InMemoryProductRepository;
pub use postgres::PostgresProductRepository;

/// Collection and table name products are stored under.
pub const PRODUCTS: &str = "products";

/// Unit of work carrying catalog events over the store `S`.
pub type CatalogUnitOfWork<S> = UnitOfWork<S, CatalogEvent>;

/// Split of requested ids into those that exist and those that do not.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExistsResult {
    pub exists: Vec<ProductId>,
    pub not_exists: Vec<ProductId>,
}

/// Repository for [`Product`] aggregates.
#[async_trait]
pub trait ProductRepository: Send + Sync {
    /// Storage collaborator this repository writes through.
    type Store: TransactionManager + Clone;

    /// Inserts a new product.
    ///
    /// Fails with `InvalidArgument` if a product with the same id exists.
    async fn insert(&self, uow: &CatalogUnitOfWork<Self::Store>, product: &Product) -> Result<()>;

    /// Inserts several new products.
    async fn bulk_insert(
        &self,
        uow: &CatalogUnitOfWork<Self::Store>,
        products: &[Product],
    ) -> Result<()>;

    /// Replaces a stored product. Fails with `NotFound` if it does not exist.
    async fn update(&self, uow: &CatalogUnitOfWork<Self::Store>, product: &Product) -> Result<()>;

    /// Removes a stored product. Fails with `NotFound` if it does not exist.
    async fn delete(&self, uow: &CatalogUnitOfWork<Self::Store>, id: ProductId) -> Result<()>;

    /// Loads a product with an empty ledger.
    async fn find_by_id(
        &self,
        uow: &CatalogUnitOfWork<Self::Store>,
        id: ProductId,
    ) -> Result<Option<Product>>;

    /// Loads every product among `ids` that exists.
    async fn find_by_ids(
        &self,
        uow: &CatalogUnitOfWork<Self::Store>,
        ids: &[ProductId],
    ) -> Result<Vec<Product>>;

    /// Loads every product.
    async fn find_all(&self, uow: &CatalogUnitOfWork<Self::Store>) -> Result<Vec<Product>>;

    /// Reports which of `ids` exist.
    async fn exists_by_id(
        &self,
        uow: &CatalogUnitOfWork<Self::Store>,
        ids: &[ProductId],
    ) -> Result<ExistsResult>;
}
