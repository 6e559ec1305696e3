//! Product aggregate implementation.

use common::AggregateId;
use domain::{AggregateRoot, EventLedger, EventMetadata};
use serde::{Deserialize, Serialize};

use super::{
    CatalogEvent, Money, ProductCreatedData, ProductError, ProductId, ProductPriceChangedData,
    ProductRenamedData,
};

/// Longest accepted product name, in characters.
pub const MAX_NAME_LENGTH: usize = 255;

/// Input for [`Product::create`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateProduct {
    pub name: String,
    pub price: Money,
}

impl CreateProduct {
    pub fn new(name: impl Into<String>, price: Money) -> Self {
        Self {
            name: name.into(),
            price,
        }
    }
}

/// Persisted shape of a product.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductRecord {
    pub product_id: ProductId,
    pub name: String,
    pub price: Money,
}

/// A product offered in the catalog.
///
/// Every change is validated first and then recorded as a [`CatalogEvent`];
/// a rejected change leaves both state and ledger untouched.
#[derive(Debug)]
pub struct Product {
    product_id: ProductId,
    name: String,
    price: Money,
    events: EventLedger<CatalogEvent>,
}

impl Product {
    /// Creates a new product and records `ProductCreated`.
    pub fn create(cmd: CreateProduct) -> Result<Self, ProductError> {
        validate_name(&cmd.name)?;
        validate_price(cmd.price)?;

        let mut product = Self {
            product_id: ProductId::new(),
            name: cmd.name,
            price: cmd.price,
            events: EventLedger::new(),
        };
        let event = CatalogEvent::ProductCreated(ProductCreatedData {
            metadata: EventMetadata::new(product.id()),
            product_id: product.product_id,
            name: product.name.clone(),
            price: product.price,
        });
        product.record_event(event);
        Ok(product)
    }

    /// Rebuilds a product from storage with an empty ledger.
    pub fn restore(record: ProductRecord) -> Self {
        Self {
            product_id: record.product_id,
            name: record.name,
            price: record.price,
            events: EventLedger::new(),
        }
    }

    pub fn product_id(&self) -> ProductId {
        self.product_id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn price(&self) -> Money {
        self.price
    }

    /// Renames the product and records `ProductRenamed`.
    pub fn change_name(&mut self, name: impl Into<String>) -> Result<(), ProductError> {
        let name = name.into();
        validate_name(&name)?;

        let old_name = std::mem::replace(&mut self.name, name);
        let event = CatalogEvent::ProductRenamed(ProductRenamedData {
            metadata: EventMetadata::new(self.id()),
            product_id: self.product_id,
            old_name,
            new_name: self.name.clone(),
        });
        self.record_event(event);
        Ok(())
    }

    /// Changes the price and records `ProductPriceChanged`.
    pub fn change_price(&mut self, price: Money) -> Result<(), ProductError> {
        validate_price(price)?;

        let old_price = std::mem::replace(&mut self.price, price);
        let event = CatalogEvent::ProductPriceChanged(ProductPriceChangedData {
            metadata: EventMetadata::new(self.id()),
            product_id: self.product_id,
            old_price,
            new_price: price,
        });
        self.record_event(event);
        Ok(())
    }

    /// Returns the persisted shape of the product.
    pub fn to_record(&self) -> ProductRecord {
        ProductRecord {
            product_id: self.product_id,
            name: self.name.clone(),
            price: self.price,
        }
    }
}

impl AggregateRoot for Product {
    type Event = CatalogEvent;

    fn aggregate_type() -> &'static str {
        "Product"
    }

    fn id(&self) -> AggregateId {
        self.product_id.into()
    }

    fn ledger(&self) -> &EventLedger<CatalogEvent> {
        &self.events
    }
}

fn validate_name(name: &str) -> Result<(), ProductError> {
    if name.trim().is_empty() {
        return Err(ProductError::NameRequired);
    }
    let length = name.chars().count();
    if length > MAX_NAME_LENGTH {
        return Err(ProductError::NameTooLong {
            length,
            max: MAX_NAME_LENGTH,
        });
    }
    Ok(())
}

fn validate_price(price: Money) -> Result<(), ProductError> {
    if price.is_negative() {
        return Err(ProductError::InvalidPrice {
            price: price.cents(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use domain::DomainEvent;

    fn keyboard() -> Product {
        Product::create(CreateProduct::new("Keyboard", Money::from_cents(4999))).unwrap()
    }

    #[test]
    fn test_create_records_product_created() {
        let product = keyboard();

        assert_eq!(product.name(), "Keyboard");
        assert_eq!(product.price(), Money::from_cents(4999));

        let pending = product.ledger().pending_events();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].event_type(), "ProductCreated");
        assert_eq!(pending[0].product_id(), product.product_id());
        assert_eq!(pending[0].metadata().aggregate_id, product.id());
    }

    #[test]
    fn test_create_rejects_empty_name() {
        let result = Product::create(CreateProduct::new("  ", Money::zero()));
        assert!(matches!(result, Err(ProductError::NameRequired)));
    }

    #[test]
    fn test_create_rejects_name_longer_than_255_chars() {
        let result = Product::create(CreateProduct::new("a".repeat(256), Money::zero()));
        assert!(matches!(
            result,
            Err(ProductError::NameTooLong { length: 256, max: 255 })
        ));

        assert!(Product::create(CreateProduct::new("a".repeat(255), Money::zero())).is_ok());
    }

    #[test]
    fn test_create_rejects_negative_price() {
        let result = Product::create(CreateProduct::new("Mouse", Money::from_cents(-1)));
        assert!(matches!(result, Err(ProductError::InvalidPrice { price: -1 })));
    }

    #[test]
    fn test_change_name_records_event() {
        let mut product = keyboard();
        product.change_name("Mechanical Keyboard").unwrap();

        assert_eq!(product.name(), "Mechanical Keyboard");
        let events = product.ledger().all_events();
        assert_eq!(events.len(), 2);
        match events[1].as_ref() {
            CatalogEvent::ProductRenamed(data) => {
                assert_eq!(data.old_name, "Keyboard");
                assert_eq!(data.new_name, "Mechanical Keyboard");
            }
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[test]
    fn test_rejected_change_leaves_product_untouched() {
        let mut product = keyboard();

        assert!(product.change_name("").is_err());
        assert!(product.change_price(Money::from_cents(-5)).is_err());

        assert_eq!(product.name(), "Keyboard");
        assert_eq!(product.price(), Money::from_cents(4999));
        assert_eq!(product.ledger().len(), 1);
    }

    #[test]
    fn test_change_price_records_old_and_new() {
        let mut product = keyboard();
        product.change_price(Money::from_cents(5999)).unwrap();

        match product.ledger().all_events()[1].as_ref() {
            CatalogEvent::ProductPriceChanged(data) => {
                assert_eq!(data.old_price, Money::from_cents(4999));
                assert_eq!(data.new_price, Money::from_cents(5999));
            }
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[test]
    fn test_restore_starts_with_empty_ledger() {
        let record = keyboard().to_record();
        let restored = Product::restore(record.clone());

        assert!(restored.ledger().is_empty());
        assert_eq!(restored.to_record(), record);
    }
}
