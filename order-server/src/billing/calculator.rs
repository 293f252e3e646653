//! Money/breakdown calculator using rust_decimal for precision
//!
//! All arithmetic is done in `Decimal`; values cross the boundary as `f64`.
//!
//! ```text
//! subtotal = Σ price × quantity
//! taxes    = round_half_up((subtotal + delivery_fee) × tax_rate_percent / 100)
//! total    = subtotal + delivery_fee + platform_fee + taxes
//! ```
//!
//! The platform fee is not taxed.

use crate::orders::error::{OrderError, OrderResult};
use rust_decimal::prelude::*;
use shared::error::ErrorCode;
use shared::order::{BillLine, Breakdown, OrderItem};

/// Rounding for money values (2 decimal places, half-up)
const DECIMAL_PLACES: u32 = 2;

/// Maximum allowed price per item
const MAX_PRICE: f64 = 1_000_000.0;
/// Maximum allowed quantity per item
const MAX_QUANTITY: i32 = 9999;
/// Maximum allowed tax rate
const MAX_TAX_RATE_PERCENT: f64 = 100.0;

/// Fees applied on top of the item subtotal
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FeeSchedule {
    pub delivery_fee: f64,
    pub platform_fee: f64,
    pub tax_rate_percent: f64,
}

impl Default for FeeSchedule {
    fn default() -> Self {
        Self {
            delivery_fee: 40.0,
            platform_fee: 5.0,
            tax_rate_percent: 5.0,
        }
    }
}

impl FeeSchedule {
    /// No fees, no tax: total equals subtotal
    pub const ZERO: FeeSchedule = FeeSchedule {
        delivery_fee: 0.0,
        platform_fee: 0.0,
        tax_rate_percent: 0.0,
    };

    pub fn validate(&self) -> OrderResult<()> {
        for (value, field) in [
            (self.delivery_fee, "delivery fee"),
            (self.platform_fee, "platform fee"),
            (self.tax_rate_percent, "tax rate"),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(OrderError::invalid_with(
                    ErrorCode::InvalidFeeSchedule,
                    format!("{} must be a non-negative number, got {}", field, value),
                ));
            }
        }
        if self.tax_rate_percent > MAX_TAX_RATE_PERCENT {
            return Err(OrderError::invalid_with(
                ErrorCode::InvalidFeeSchedule,
                format!(
                    "tax rate must not exceed {}%, got {}",
                    MAX_TAX_RATE_PERCENT, self.tax_rate_percent
                ),
            ));
        }
        Ok(())
    }
}

/// Convert f64 to Decimal for calculation
#[inline]
pub fn to_decimal(value: f64) -> Decimal {
    Decimal::from_f64(value).unwrap_or_default()
}

/// Convert Decimal back to f64, rounded to 2 decimal places
#[inline]
pub fn to_f64(value: Decimal) -> f64 {
    value
        .round_dp_with_strategy(DECIMAL_PLACES, RoundingStrategy::MidpointAwayFromZero)
        .to_f64()
        .unwrap_or_default()
}

/// Validate a single price/quantity line
pub fn validate_line(line: &BillLine) -> OrderResult<()> {
    if !line.price.is_finite() || line.price < 0.0 {
        return Err(OrderError::invalid_with(
            ErrorCode::InvalidPrice,
            format!("price must be a non-negative number, got {}", line.price),
        ));
    }
    if line.price > MAX_PRICE {
        return Err(OrderError::invalid_with(
            ErrorCode::InvalidPrice,
            format!(
                "price exceeds maximum allowed ({}), got {}",
                MAX_PRICE, line.price
            ),
        ));
    }
    if line.quantity < 1 {
        return Err(OrderError::invalid_with(
            ErrorCode::InvalidQuantity,
            format!("quantity must be at least 1, got {}", line.quantity),
        ));
    }
    if line.quantity > MAX_QUANTITY {
        return Err(OrderError::invalid_with(
            ErrorCode::InvalidQuantity,
            format!(
                "quantity exceeds maximum allowed ({}), got {}",
                MAX_QUANTITY, line.quantity
            ),
        ));
    }
    Ok(())
}

/// Pure bill calculator bound to one fee schedule
#[derive(Debug, Clone, Copy)]
pub struct BillingCalculator {
    fees: FeeSchedule,
}

impl Default for BillingCalculator {
    fn default() -> Self {
        Self {
            fees: FeeSchedule::default(),
        }
    }
}

impl BillingCalculator {
    pub fn new(fees: FeeSchedule) -> OrderResult<Self> {
        fees.validate()?;
        Ok(Self { fees })
    }

    pub fn fees(&self) -> &FeeSchedule {
        &self.fees
    }

    /// Compute the breakdown for a cart
    ///
    /// An empty list yields a zero subtotal with the fixed fees still applied.
    pub fn compute(&self, lines: &[BillLine]) -> OrderResult<Breakdown> {
        let mut subtotal = Decimal::ZERO;
        for line in lines {
            validate_line(line)?;
            subtotal += to_decimal(line.price) * Decimal::from(line.quantity);
        }

        let delivery_fee = to_decimal(self.fees.delivery_fee);
        let platform_fee = to_decimal(self.fees.platform_fee);
        let rate = to_decimal(self.fees.tax_rate_percent);

        let taxes = ((subtotal + delivery_fee) * rate / Decimal::ONE_HUNDRED)
            .round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero);
        let total = subtotal + delivery_fee + platform_fee + taxes;

        Ok(Breakdown {
            subtotal: to_f64(subtotal),
            delivery_fee: to_f64(delivery_fee),
            platform_fee: to_f64(platform_fee),
            taxes: to_f64(taxes),
            total: to_f64(total),
        })
    }

    /// Like [`compute`](Self::compute) but rejects an empty line list
    pub fn compute_bill(&self, lines: &[BillLine]) -> OrderResult<Breakdown> {
        if lines.is_empty() {
            return Err(OrderError::invalid_with(
                ErrorCode::OrderEmpty,
                "at least one line item is required",
            ));
        }
        self.compute(lines)
    }

    /// Bill for a persisted (or about to be persisted) item snapshot
    pub fn compute_for_order(&self, items: &[OrderItem]) -> OrderResult<Breakdown> {
        let lines: Vec<BillLine> = items.iter().map(BillLine::from).collect();
        self.compute_bill(&lines)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn line(price: f64, quantity: i32) -> BillLine {
        BillLine { price, quantity }
    }

    fn code_of(err: OrderError) -> ErrorCode {
        match err {
            OrderError::InvalidInput(code, _) => code,
            other => panic!("expected InvalidInput, got {:?}", other),
        }
    }

    #[test]
    fn test_tax_base_excludes_platform_fee() {
        let calc = BillingCalculator::default();
        let b = calc.compute(&[line(100.0, 1)]).unwrap();
        assert_eq!(b.subtotal, 100.0);
        assert_eq!(b.delivery_fee, 40.0);
        assert_eq!(b.platform_fee, 5.0);
        assert_eq!(b.taxes, 7.0);
        assert_eq!(b.total, 152.0);
    }

    #[test]
    fn test_deterministic() {
        let calc = BillingCalculator::default();
        let lines = [line(129.5, 3), line(0.1, 7), line(45.0, 1)];
        let first = calc.compute(&lines).unwrap();
        for _ in 0..10 {
            assert_eq!(calc.compute(&lines).unwrap(), first);
        }
    }

    #[test]
    fn test_no_float_drift_in_subtotal() {
        let calc = BillingCalculator::new(FeeSchedule::ZERO).unwrap();
        // 0.1 * 3 + 0.2 drifts in f64
        let b = calc.compute(&[line(0.1, 3), line(0.2, 1)]).unwrap();
        assert_eq!(b.subtotal, 0.5);
        assert_eq!(b.total, 0.5);
    }

    #[test]
    fn test_tax_rounds_half_up() {
        // (150 + 40) * 5% = 9.5 -> 10
        let calc = BillingCalculator::default();
        let b = calc.compute(&[line(150.0, 1)]).unwrap();
        assert_eq!(b.taxes, 10.0);
        assert_eq!(b.total, 150.0 + 40.0 + 5.0 + 10.0);

        // (109 + 40) * 5% = 7.45 -> 7
        let b = calc.compute(&[line(109.0, 1)]).unwrap();
        assert_eq!(b.taxes, 7.0);
    }

    #[test]
    fn test_empty_cart_preview() {
        let calc = BillingCalculator::default();
        let b = calc.compute(&[]).unwrap();
        assert_eq!(b.subtotal, 0.0);
        assert_eq!(b.taxes, 2.0);
        assert_eq!(b.total, 47.0);
    }

    #[test]
    fn test_bill_requires_items() {
        let calc = BillingCalculator::default();
        let err = calc.compute_bill(&[]).unwrap_err();
        assert_eq!(code_of(err), ErrorCode::OrderEmpty);
        assert!(calc.compute_for_order(&[]).is_err());
    }

    #[test]
    fn test_invalid_lines_rejected() {
        let calc = BillingCalculator::default();
        assert_eq!(
            code_of(calc.compute(&[line(-1.0, 1)]).unwrap_err()),
            ErrorCode::InvalidPrice
        );
        assert_eq!(
            code_of(calc.compute(&[line(f64::NAN, 1)]).unwrap_err()),
            ErrorCode::InvalidPrice
        );
        assert_eq!(
            code_of(calc.compute(&[line(10.0, 0)]).unwrap_err()),
            ErrorCode::InvalidQuantity
        );
        assert_eq!(
            code_of(calc.compute(&[line(10.0, MAX_QUANTITY + 1)]).unwrap_err()),
            ErrorCode::InvalidQuantity
        );
    }

    #[test]
    fn test_zero_price_allowed() {
        let calc = BillingCalculator::new(FeeSchedule::ZERO).unwrap();
        let b = calc.compute_bill(&[line(0.0, 2)]).unwrap();
        assert_eq!(b.total, 0.0);
    }

    #[test]
    fn test_invalid_fee_schedule() {
        let fees = FeeSchedule {
            delivery_fee: -1.0,
            ..FeeSchedule::default()
        };
        assert_eq!(
            code_of(BillingCalculator::new(fees).unwrap_err()),
            ErrorCode::InvalidFeeSchedule
        );
        let fees = FeeSchedule {
            tax_rate_percent: 120.0,
            ..FeeSchedule::default()
        };
        assert!(BillingCalculator::new(fees).is_err());
    }

    #[test]
    fn test_order_items_and_cart_lines_agree() {
        let calc = BillingCalculator::default();
        let items = vec![
            OrderItem::new("i1", "Masala Dosa", 80.0, 2),
            OrderItem::new("i2", "Filter Coffee", 35.5, 1),
        ];
        let from_items = calc.compute_for_order(&items).unwrap();
        let from_lines = calc.compute(&[line(80.0, 2), line(35.5, 1)]).unwrap();
        assert_eq!(from_items, from_lines);
        assert!(from_items.matches_total(from_lines.total));
    }
}
