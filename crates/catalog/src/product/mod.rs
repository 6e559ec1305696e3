//! Product aggregate and related types.

mod aggregate;
mod events;
mod service;
mod value_objects;

pub use aggregate::{CreateProduct, MAX_NAME_LENGTH, Product, ProductRecord};
pub use events::{
    CatalogEvent, PRODUCT_CREATED_INTEGRATION_EVENT, PRODUCT_PRICE_CHANGED_INTEGRATION_EVENT,
    ProductCreatedData, ProductPriceChangedData, ProductRenamedData,
};
pub use service::ProductService;
pub use value_objects::{Money, ProductId};

use thiserror::Error;

/// Validation errors raised by product operations.
#[derive(Debug, Error)]
pub enum ProductError {
    /// Name is empty or blank.
    #[error("Product name is required")]
    NameRequired,

    /// Name exceeds the maximum length.
    #[error("Product name is too long: {length} characters (max {max})")]
    NameTooLong { length: usize, max: usize },

    /// Price is negative.
    #[error("Invalid price: {price} (must not be negative)")]
    InvalidPrice { price: i64 },

    /// Price adjustment does not fit in the money range.
    #[error("Price {price} cannot be increased by {percentage}%")]
    PriceOverflow { price: i64, percentage: i64 },
}
