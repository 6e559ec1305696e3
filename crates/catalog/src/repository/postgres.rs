use async_trait::async_trait;
use domain::AggregateRoot;
use sqlx::Row;
use sqlx::postgres::PgRow;
use std::future::Future;
use std::ops::DerefMut;
use std::pin::Pin;

use storage::{PostgresTransactionManager, Result, StorageError, TransactionError};
use uuid::Uuid;

use super::{CatalogUnitOfWork, ExistsResult, PRODUCTS, ProductRepository};
use crate::product::{Money, Product, ProductId, ProductRecord};

/// Product repository over PostgreSQL.
///
/// Expects the `products` table created by the workspace migrations.
#[derive(Clone, Default)]
pub struct PostgresProductRepository;

impl PostgresProductRepository {
    pub fn new() -> Self {
        Self
    }

    fn row_to_product(row: PgRow) -> Result<Product> {
        Ok(Product::restore(ProductRecord {
            product_id: ProductId::from_uuid(row.try_get::<Uuid, _>("product_id")?),
            name: row.try_get("name")?,
            price: Money::from_cents(row.try_get("price_cents")?),
        }))
    }
}

#[async_trait]
impl ProductRepository for PostgresProductRepository {
    type Store = PostgresTransactionManager;

    async fn insert(
        &self,
        uow: &CatalogUnitOfWork<PostgresTransactionManager>,
        product: &Product,
    ) -> Result<()> {
        {
            let mut tx = transaction(uow).await?;
            sqlx::query("INSERT INTO products (product_id, name, price_cents) VALUES ($1, $2, $3)")
                .bind(product.product_id().as_uuid())
                .bind(product.name())
                .bind(product.price().cents())
                .execute(&mut ***tx)
                .await
                .map_err(|e| map_unique_violation(e, format!("product {}", product.product_id())))?;
        }
        uow.register_aggregate(product);
        Ok(())
    }

    async fn bulk_insert(
        &self,
        uow: &CatalogUnitOfWork<PostgresTransactionManager>,
        products: &[Product],
    ) -> Result<()> {
        if products.is_empty() {
            return Ok(());
        }

        let ids: Vec<Uuid> = products.iter().map(|p| p.product_id().as_uuid()).collect();
        let names: Vec<String> = products.iter().map(|p| p.name().to_string()).collect();
        let prices: Vec<i64> = products.iter().map(|p| p.price().cents()).collect();
        {
            let mut tx = transaction(uow).await?;
            sqlx::query(
                r#"
                INSERT INTO products (product_id, name, price_cents)
                SELECT * FROM UNNEST($1::uuid[], $2::varchar[], $3::bigint[])
                "#,
            )
            .bind(&ids)
            .bind(&names)
            .bind(&prices)
            .execute(&mut ***tx)
            .await
            .map_err(|e| map_unique_violation(e, "a product in the batch"))?;
        }
        for product in products {
            uow.register_aggregate(product);
        }
        Ok(())
    }

    async fn update(
        &self,
        uow: &CatalogUnitOfWork<PostgresTransactionManager>,
        product: &Product,
    ) -> Result<()> {
        {
            let mut tx = transaction(uow).await?;
            let result =
                sqlx::query("UPDATE products SET name = $2, price_cents = $3 WHERE product_id = $1")
                    .bind(product.product_id().as_uuid())
                    .bind(product.name())
                    .bind(product.price().cents())
                    .execute(&mut ***tx)
                    .await?;
            if result.rows_affected() != 1 {
                return Err(StorageError::not_found(PRODUCTS, product.id()));
            }
        }
        uow.register_aggregate(product);
        Ok(())
    }

    async fn delete(
        &self,
        uow: &CatalogUnitOfWork<PostgresTransactionManager>,
        id: ProductId,
    ) -> Result<()> {
        let mut tx = transaction(uow).await?;
        let result = sqlx::query("DELETE FROM products WHERE product_id = $1")
            .bind(id.as_uuid())
            .execute(&mut ***tx)
            .await?;
        if result.rows_affected() != 1 {
            return Err(StorageError::not_found(PRODUCTS, id.into()));
        }
        Ok(())
    }

    async fn find_by_id(
        &self,
        uow: &CatalogUnitOfWork<PostgresTransactionManager>,
        id: ProductId,
    ) -> Result<Option<Product>> {
        let mut tx = transaction(uow).await?;
        let row = sqlx::query("SELECT product_id, name, price_cents FROM products WHERE product_id = $1")
            .bind(id.as_uuid())
            .fetch_optional(&mut ***tx)
            .await?;
        row.map(Self::row_to_product).transpose()
    }

    async fn find_by_ids(
        &self,
        uow: &CatalogUnitOfWork<PostgresTransactionManager>,
        ids: &[ProductId],
    ) -> Result<Vec<Product>> {
        let ids: Vec<Uuid> = ids.iter().map(ProductId::as_uuid).collect();
        let mut tx = transaction(uow).await?;
        let rows = sqlx::query(
            "SELECT product_id, name, price_cents FROM products WHERE product_id = ANY($1) ORDER BY created_at, product_id",
        )
        .bind(&ids)
        .fetch_all(&mut ***tx)
        .await?;
        rows.into_iter().map(Self::row_to_product).collect()
    }

    async fn find_all(
        &self,
        uow: &CatalogUnitOfWork<PostgresTransactionManager>,
    ) -> Result<Vec<Product>> {
        let mut tx = transaction(uow).await?;
        let rows = sqlx::query(
            "SELECT product_id, name, price_cents FROM products ORDER BY created_at, product_id",
        )
        .fetch_all(&mut ***tx)
        .await?;
        rows.into_iter().map(Self::row_to_product).collect()
    }

    async fn exists_by_id(
        &self,
        uow: &CatalogUnitOfWork<PostgresTransactionManager>,
        ids: &[ProductId],
    ) -> Result<ExistsResult> {
        if ids.is_empty() {
            return Err(StorageError::InvalidArgument(
                "ids must be an array with at least one element".to_string(),
            ));
        }

        let uuids: Vec<Uuid> = ids.iter().map(ProductId::as_uuid).collect();
        let found: Vec<Uuid> = {
            let mut tx = transaction(uow).await?;
            sqlx::query_scalar("SELECT product_id FROM products WHERE product_id = ANY($1)")
                .bind(&uuids)
                .fetch_all(&mut ***tx)
                .await?
        };

        let (exists, not_exists) = ids
            .iter()
            .partition(|id| found.contains(&id.as_uuid()));
        Ok(ExistsResult { exists, not_exists })
    }
}

type PgTransaction = sqlx::Transaction<'static, sqlx::Postgres>;
type TransactionGuard<'a> = Box<dyn DerefMut<Target = PgTransaction> + Send + 'a>;

// Boxing the lock future and the guard lets rustc prove the `Send` bound of
// the async-trait futures above; it cannot see through the guard's
// `T: 'a` bound once the generator erases `Transaction<'static, _>`.
fn transaction<'a>(
    uow: &'a CatalogUnitOfWork<PostgresTransactionManager>,
) -> Pin<Box<dyn Future<Output = std::result::Result<TransactionGuard<'a>, TransactionError>> + Send + 'a>>
{
    Box::pin(async move {
        let guard = uow.transaction().await?;
        Ok(Box::new(guard) as TransactionGuard<'a>)
    })
}

fn map_unique_violation(error: sqlx::Error, subject: impl std::fmt::Display) -> StorageError {
    match &error {
        sqlx::Error::Database(db) if db.is_unique_violation() => {
            StorageError::InvalidArgument(format!("{subject} already exists"))
        }
        _ => StorageError::Database(error),
    }
}
