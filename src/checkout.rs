//! Checkout pricing.
//!
//! Everything here is pure: the handler loads products and the coupon, these functions
//! price the cart, and the repository persists the resulting `Quote` in one transaction.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::{
    error::ApiError,
    models::{CheckoutItem, Coupon, DiscountType, Product},
};

/// One priced cart line, frozen from the product row at checkout time.
#[derive(Debug, Clone, PartialEq)]
pub struct PricedLine {
    pub product_id: Uuid,
    pub product_name: String,
    pub unit_price: i64,
    pub quantity: i32,
}

impl PricedLine {
    /// `None` when the line does not fit in an `i64` of cents.
    pub fn line_total(&self) -> Option<i64> {
        self.unit_price.checked_mul(i64::from(self.quantity))
    }
}

/// Quote
///
/// Fully priced cart, ready to be written as an order.
#[derive(Debug, Clone, PartialEq)]
pub struct Quote {
    pub lines: Vec<PricedLine>,
    pub subtotal: i64,
    pub discount: i64,
    pub total: i64,
    pub coupon_code: Option<String>,
}

/// Sums the quantities of repeated product ids, keeping first-seen order.
pub fn merge_items(items: &[CheckoutItem]) -> Vec<(Uuid, i32)> {
    let mut merged: Vec<(Uuid, i32)> = Vec::with_capacity(items.len());
    for item in items {
        match merged.iter_mut().find(|(id, _)| *id == item.product_id) {
            Some((_, quantity)) => *quantity += item.quantity,
            None => merged.push((item.product_id, item.quantity)),
        }
    }
    merged
}

/// price_lines
///
/// Resolves every requested product against `catalog`. Fails with 404 for unknown
/// products, 400 for inactive ones and 409 when stock cannot cover the quantity.
pub fn price_lines(
    items: &[CheckoutItem],
    catalog: &HashMap<Uuid, Product>,
) -> Result<Vec<PricedLine>, ApiError> {
    merge_items(items)
        .into_iter()
        .map(|(product_id, quantity)| {
            let product = catalog
                .get(&product_id)
                .ok_or_else(|| ApiError::not_found(format!("Product {product_id} not found")).at("items"))?;

            if !product.is_active {
                return Err(
                    ApiError::bad_request(format!("{} is no longer available", product.name)).at("items"),
                );
            }
            if product.stock < quantity {
                return Err(ApiError::conflict(format!(
                    "Insufficient stock for {}: requested {}, available {}",
                    product.name, quantity, product.stock
                ))
                .at("items"));
            }

            Ok(PricedLine {
                product_id,
                product_name: product.name.clone(),
                unit_price: product.price,
                quantity,
            })
        })
        .collect()
}

/// coupon_discount
///
/// Checks that `coupon` can be used on a cart worth `subtotal` at `now` and returns the
/// discount in cents, never more than the subtotal.
pub fn coupon_discount(coupon: &Coupon, subtotal: i64, now: DateTime<Utc>) -> Result<i64, ApiError> {
    if !coupon.is_active {
        return Err(ApiError::bad_request("Coupon is not active").at("coupon_code"));
    }
    if coupon.expires_at.is_some_and(|expires_at| expires_at <= now) {
        return Err(ApiError::bad_request("Coupon has expired").at("coupon_code"));
    }
    if coupon
        .usage_limit
        .is_some_and(|limit| coupon.usage_count >= limit)
    {
        return Err(ApiError::bad_request("Coupon usage limit reached").at("coupon_code"));
    }
    if subtotal < coupon.min_order_amount {
        return Err(ApiError::bad_request(format!(
            "Order must be at least {} to use this coupon",
            coupon.min_order_amount
        ))
        .at("coupon_code"));
    }

    let raw = match coupon.discount_type {
        // Widened so large subtotals cannot overflow; the result never exceeds `subtotal`.
        DiscountType::Percentage => {
            let percent = i128::from(coupon.discount_value.clamp(0, 100));
            i64::try_from(i128::from(subtotal) * percent / 100).unwrap_or(subtotal)
        }
        DiscountType::FixedAmount => coupon.discount_value,
    };
    Ok(raw.clamp(0, subtotal))
}

/// Prices `lines` and applies the optional coupon.
pub fn build_quote(
    lines: Vec<PricedLine>,
    coupon: Option<&Coupon>,
    now: DateTime<Utc>,
) -> Result<Quote, ApiError> {
    let subtotal = lines
        .iter()
        .try_fold(0i64, |sum, line| line.line_total().and_then(|total| sum.checked_add(total)))
        .ok_or_else(|| ApiError::invalid("items", "Order total is too large"))?;
    let discount = match coupon {
        Some(coupon) => coupon_discount(coupon, subtotal, now)?,
        None => 0,
    };

    Ok(Quote {
        lines,
        subtotal,
        discount,
        total: subtotal - discount,
        coupon_code: coupon.map(|c| c.code.clone()),
    })
}

/// Coupon codes are stored upper-cased and matched case-insensitively.
pub fn normalize_code(code: &str) -> String {
    code.trim().to_uppercase()
}
