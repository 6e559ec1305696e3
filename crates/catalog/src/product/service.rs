//! Domain services operating on several products at once.

use super::{Product, ProductError};

/// Stateless catalog operations that span more than one product.
pub struct ProductService;

impl ProductService {
    /// Raises the price of every product by `percentage` percent.
    ///
    /// All new prices are computed before any product changes, so a failure
    /// leaves every product untouched.
    pub fn increase_price(products: &mut [Product], percentage: i64) -> Result<(), ProductError> {
        let new_prices = products
            .iter()
            .map(|product| {
                let price = product.price().increased_by(percentage).ok_or(
                    ProductError::PriceOverflow {
                        price: product.price().cents(),
                        percentage,
                    },
                )?;
                if price.is_negative() {
                    return Err(ProductError::InvalidPrice {
                        price: price.cents(),
                    });
                }
                Ok(price)
            })
            .collect::<Result<Vec<_>, _>>()?;

        for (product, price) in products.iter_mut().zip(new_prices) {
            product.change_price(price)?;
        }
        tracing::debug!(count = products.len(), percentage, "prices increased");
        Ok(())
    }
}
