use std::sync::Arc;

use async_trait::async_trait;
use domain::{DomainEvent, EventHandler, EventMediator, HandlerError, IntegrationEvent};

use crate::product::{CatalogEvent, PRODUCT_CREATED_INTEGRATION_EVENT};

/// Logs every created product before the transaction commits.
#[derive(Debug, Default)]
pub struct ProductCreatedHandler;

#[async_trait]
impl EventHandler<CatalogEvent> for ProductCreatedHandler {
    async fn handle(&self, event: &CatalogEvent) -> Result<(), HandlerError> {
        if let CatalogEvent::ProductCreated(data) = event {
            tracing::info!(
                event_id = %event.event_id(),
                product_id = %data.product_id,
                name = %data.name,
                price = %data.price,
                "product created"
            );
        }
        Ok(())
    }
}

/// Announces newly created products to the outside world once committed.
#[derive(Debug, Default)]
pub struct SendEmailProductCreatedHandler;

#[async_trait]
impl EventHandler<IntegrationEvent> for SendEmailProductCreatedHandler {
    async fn handle(&self, event: &IntegrationEvent) -> Result<(), HandlerError> {
        let Some(product_id) = event.payload.get("product_id").and_then(|v| v.as_str()) else {
            return Err(HandlerError::new(format!(
                "{} without product_id",
                event.event_name
            )));
        };
        tracing::info!(
            event_name = %event.event_name,
            product_id,
            occurred_on = %event.occurred_on,
            "sending product created email"
        );
        metrics::counter!("catalog_emails_sent_total").increment(1);
        Ok(())
    }
}

/// Registers the catalog's handlers on `mediator`.
pub fn register_handlers(mediator: &mut EventMediator<CatalogEvent>) {
    mediator.register(CatalogEvent::PRODUCT_CREATED, Arc::new(ProductCreatedHandler));
    mediator.register_integration(
        PRODUCT_CREATED_INTEGRATION_EVENT,
        Arc::new(SendEmailProductCreatedHandler),
    );
}
