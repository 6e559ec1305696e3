//! Catalog use cases and event handlers.

mod create_product;
mod handlers;

pub use create_product::{CreateProductInput, CreateProductUseCase, ProductOutput};
pub use handlers::{ProductCreatedHandler, SendEmailProductCreatedHandler, register_handlers};
