//! Monthly-to-per-second rate conversion.
//!
//! Streamed tokens quote rates per 30-day month in whole tokens; the
//! ledger works in smallest units per second:
//!
//! ```text
//! seconds_rate(m) = round(m * 10^18 / 2_592_000)
//! ```

use flowvalve_types::{FlowRate, RATE_SCALE, SECONDS_PER_MONTH};

use crate::{AccrualError, Result};

/// Convert a whole-token monthly rate to smallest-units per second,
/// rounding half up.
///
/// # Errors
///
/// - [`AccrualError::Overflow`] on arithmetic overflow
///
/// # Examples
///
/// ```
/// use flowvalve_accrual::rate::monthly_to_second_rate;
///
/// // 150 tokens per month
/// assert_eq!(monthly_to_second_rate(150).unwrap(), 57_870_370_370_370);
/// ```
pub fn monthly_to_second_rate(monthly_tokens: u64) -> Result<FlowRate> {
    let scaled = (monthly_tokens as u128)
        .checked_mul(RATE_SCALE)
        .ok_or(AccrualError::Overflow)?;
    let month = SECONDS_PER_MONTH as u128;
    let rounded = scaled
        .checked_add(month / 2)
        .ok_or(AccrualError::Overflow)?
        / month;
    FlowRate::try_from(rounded).map_err(|_| AccrualError::Overflow)
}
