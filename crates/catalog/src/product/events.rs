//! Product domain events.

use domain::{DomainEvent, EventMetadata, IntegrationEvent, ProjectableEvent};
use serde::{Deserialize, Serialize};

use super::{Money, ProductId};

/// Integration event name published when a product is created.
pub const PRODUCT_CREATED_INTEGRATION_EVENT: &str = "ProductCreatedIntegrationEvent";

/// Integration event name published when a product's price changes.
pub const PRODUCT_PRICE_CHANGED_INTEGRATION_EVENT: &str = "ProductPriceChangedIntegrationEvent";

/// Events that can occur on a product aggregate.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum CatalogEvent {
    /// Product was created.
    ProductCreated(ProductCreatedData),

    /// Product was renamed. Stays inside the catalog.
    ProductRenamed(ProductRenamedData),

    /// Product price was changed.
    ProductPriceChanged(ProductPriceChangedData),
}

impl CatalogEvent {
    /// Kind of [`CatalogEvent::ProductCreated`].
    pub const PRODUCT_CREATED: &'static str = "ProductCreated";
    /// Kind of [`CatalogEvent::ProductRenamed`].
    pub const PRODUCT_RENAMED: &'static str = "ProductRenamed";
    /// Kind of [`CatalogEvent::ProductPriceChanged`].
    pub const PRODUCT_PRICE_CHANGED: &'static str = "ProductPriceChanged";

    /// Returns the product the event belongs to.
    pub fn product_id(&self) -> ProductId {
        match self {
            CatalogEvent::ProductCreated(data) => data.product_id,
            CatalogEvent::ProductRenamed(data) => data.product_id,
            CatalogEvent::ProductPriceChanged(data) => data.product_id,
        }
    }
}

impl DomainEvent for CatalogEvent {
    fn event_type(&self) -> &'static str {
        match self {
            CatalogEvent::ProductCreated(_) => Self::PRODUCT_CREATED,
            CatalogEvent::ProductRenamed(_) => Self::PRODUCT_RENAMED,
            CatalogEvent::ProductPriceChanged(_) => Self::PRODUCT_PRICE_CHANGED,
        }
    }

    fn metadata(&self) -> &EventMetadata {
        match self {
            CatalogEvent::ProductCreated(data) => &data.metadata,
            CatalogEvent::ProductRenamed(data) => &data.metadata,
            CatalogEvent::ProductPriceChanged(data) => &data.metadata,
        }
    }

    fn as_projectable(&self) -> Option<&dyn ProjectableEvent> {
        match self {
            CatalogEvent::ProductCreated(data) => Some(data),
            CatalogEvent::ProductPriceChanged(data) => Some(data),
            CatalogEvent::ProductRenamed(_) => None,
        }
    }
}

/// Data for ProductCreated event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProductCreatedData {
    pub metadata: EventMetadata,
    pub product_id: ProductId,
    pub name: String,
    pub price: Money,
}

impl ProjectableEvent for ProductCreatedData {
    fn to_integration_event(&self) -> IntegrationEvent {
        IntegrationEvent::from_metadata(
            PRODUCT_CREATED_INTEGRATION_EVENT,
            &self.metadata,
            serde_json::json!({
                "product_id": self.product_id,
                "name": self.name,
                "price": self.price,
            }),
        )
    }
}

/// Data for ProductRenamed event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProductRenamedData {
    pub metadata: EventMetadata,
    pub product_id: ProductId,
    pub old_name: String,
    pub new_name: String,
}

/// Data for ProductPriceChanged event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProductPriceChangedData {
    pub metadata: EventMetadata,
    pub product_id: ProductId,
    pub old_price: Money,
    pub new_price: Money,
}

impl ProjectableEvent for ProductPriceChangedData {
    fn to_integration_event(&self) -> IntegrationEvent {
        IntegrationEvent::from_metadata(
            PRODUCT_PRICE_CHANGED_INTEGRATION_EVENT,
            &self.metadata,
            serde_json::json!({
                "product_id": self.product_id,
                "old_price": self.old_price,
                "new_price": self.new_price,
            }),
        )
    }
}
