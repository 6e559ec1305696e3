//! Product catalog built on the transactional event pipeline.
//!
//! Products are validated aggregates whose changes are recorded as
//! [`CatalogEvent`]s. Use cases persist them through a [`ProductRepository`]
//! inside an [`ApplicationService`](domain::ApplicationService) run, which
//! dispatches domain events before commit and integration events after.

pub mod application;
pub mod config;
pub mod error;
pub mod product;
pub mod repository;

pub use application::{
    CreateProductInput, CreateProductUseCase, ProductCreatedHandler, ProductOutput,
    SendEmailProductCreatedHandler, register_handlers,
};
pub use config::Config;
pub use error::{CatalogError, Result};
pub use product::{
    CatalogEvent, CreateProduct, Money, Product, ProductError, ProductId, ProductRecord,
    ProductService,
};
pub use repository::{
    CatalogUnitOfWork, ExistsResult, InMemoryProductRepository, PostgresProductRepository,
    ProductRepository,
};
