use std::sync::Arc;

use domain::ApplicationService;
use serde::{Deserialize, Serialize};

use crate::error::{CatalogError, Result};
use crate::product::{CatalogEvent, CreateProduct, Money, Product};
use crate::repository::ProductRepository;

/// Input of [`CreateProductUseCase::execute`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateProductInput {
    pub name: String,
    /// Price in cents.
    pub price: i64,
}

/// Public representation of a product.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductOutput {
    pub id: String,
    pub name: String,
    /// Price in cents.
    pub price: i64,
}

impl From<&Product> for ProductOutput {
    fn from(product: &Product) -> Self {
        Self {
            id: product.product_id().to_string(),
            name: product.name().to_string(),
            price: product.price().cents(),
        }
    }
}

/// Creates a product and persists it in one unit of work.
pub struct CreateProductUseCase<R: ProductRepository> {
    service: ApplicationService<R::Store, CatalogEvent>,
    products: Arc<R>,
}

impl<R: ProductRepository + 'static> CreateProductUseCase<R> {
    pub fn new(service: ApplicationService<R::Store, CatalogEvent>, products: Arc<R>) -> Self {
        Self { service, products }
    }

    /// Validates the input, inserts the product and publishes its events.
    ///
    /// Validation happens before any transaction is opened.
    #[tracing::instrument(skip(self, input), fields(name = %input.name))]
    pub async fn execute(&self, input: CreateProductInput) -> Result<ProductOutput> {
        let product = Product::create(CreateProduct::new(input.name, Money::from_cents(input.price)))?;
        let output = ProductOutput::from(&product);

        let products = Arc::clone(&self.products);
        self.service
            .run(|uow| async move {
                products.insert(&uow, &product).await?;
                Ok::<_, CatalogError>(())
            })
            .await?;

        tracing::info!(product_id = %output.id, "product created");
        Ok(output)
    }
}
