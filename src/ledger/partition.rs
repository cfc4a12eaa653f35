use rust_decimal::{Decimal, RoundingStrategy};

use super::error::{LedgerError, LedgerResult};

/// Splits `total` into `count` amounts at the total's own decimal scale.
///
/// Every amount but the last is `total / count` truncated to that scale; the
/// last absorbs the remainder, so the parts always sum to `total` exactly.
pub fn split_total(total: Decimal, count: u32) -> LedgerResult<Vec<Decimal>> {
    if count == 0 {
        return Err(LedgerError::Validation(
            "an invoice needs at least one installment".to_string(),
        ));
    }
    if total <= Decimal::ZERO {
        return Err(LedgerError::Validation(
            "invoice total must be positive".to_string(),
        ));
    }

    let scale = total.scale();
    let divisor = Decimal::from(count);
    let share = total
        .checked_div(divisor)
        .ok_or_else(|| LedgerError::Validation("invoice total is out of range".to_string()))?
        .round_dp_with_strategy(scale, RoundingStrategy::ToZero);

    if share.is_zero() {
        return Err(LedgerError::Validation(format!(
            "total {total} is too small to split into {count} installments"
        )));
    }

    let head = share * Decimal::from(count - 1);
    let mut parts = vec![share; count as usize - 1];
    parts.push(total - head);
    Ok(parts)
}

/// Sum of `amounts`, checked against `total`.
pub fn ensure_sum(total: Decimal, amounts: impl IntoIterator<Item = Decimal>) -> Result<(), Decimal> {
    let allocated: Decimal = amounts.into_iter().sum();
    if allocated == total {
        Ok(())
    } else {
        Err(allocated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn even_split() {
        let parts = split_total(Decimal::from(300), 3).unwrap();
        assert_eq!(parts, vec![Decimal::from(100); 3]);
    }

    #[test]
    fn remainder_lands_on_last_installment() {
        let parts = split_total(Decimal::from(100), 3).unwrap();
        assert_eq!(
            parts,
            vec![Decimal::from(33), Decimal::from(33), Decimal::from(34)]
        );
    }

    #[test]
    fn split_keeps_cents_precision() {
        let total = Decimal::new(10000, 2);
        let parts = split_total(total, 3).unwrap();
        assert_eq!(
            parts,
            vec![Decimal::new(3333, 2), Decimal::new(3333, 2), Decimal::new(3334, 2)]
        );
    }

    #[test]
    fn single_installment_carries_the_whole_total() {
        let total = Decimal::new(4999, 2);
        assert_eq!(split_total(total, 1).unwrap(), vec![total]);
    }

    #[test]
    fn rejects_degenerate_plans() {
        assert!(split_total(Decimal::from(100), 0).is_err());
        assert!(split_total(Decimal::ZERO, 2).is_err());
        assert!(split_total(Decimal::from(-5), 2).is_err());
        assert!(split_total(Decimal::from(2), 3).is_err());
    }

    #[test]
    fn ensure_sum_reports_the_allocated_amount() {
        let amounts = [Decimal::from(33), Decimal::from(33)];
        assert_eq!(ensure_sum(Decimal::from(100), amounts), Err(Decimal::from(66)));
        assert!(ensure_sum(Decimal::from(66), amounts).is_ok());
    }

    proptest! {
        #[test]
        fn parts_always_sum_to_total(cents in 1_000i64..100_000_000, count in 1u32..=24) {
            let total = Decimal::new(cents, 2);
            let parts = split_total(total, count).unwrap();

            prop_assert_eq!(parts.len(), count as usize);
            prop_assert_eq!(parts.iter().copied().sum::<Decimal>(), total);
            let first = parts[0];
            prop_assert!(parts[..parts.len() - 1].iter().all(|p| *p == first));
            prop_assert!(*parts.last().unwrap() >= first);
        }
    }
}
