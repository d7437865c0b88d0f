//! Quadratic voting math.
//!
//! Voting power = isqrt(tokens). Power is split across options by percentage
//! weights with floor division per option; the truncation remainder is lost.

use civitas_types::Amount;

use crate::error::{GovernanceError, Result};

/// Option weights must add up to exactly this value.
pub const WEIGHT_TOTAL: u64 = 100;

/// Integer square root using the Babylonian method.
/// Returns floor(sqrt(n)).
pub fn integer_sqrt(n: Amount) -> Amount {
    if n <= 1 {
        return n;
    }

    let mut x = n;
    // (n + 1) / 2 without overflowing at u128::MAX
    let mut y = n / 2 + (n & 1);

    while y < x {
        x = y;
        y = (x + n / x) / 2;
    }

    x
}

/// Quadratic voting power for `tokens`.
pub fn voting_power(tokens: Amount) -> Amount {
    integer_sqrt(tokens)
}

/// Tokens needed to reach `power` votes.
pub fn quadratic_cost(power: Amount) -> Amount {
    power.saturating_mul(power)
}

/// Check that `weights` matches `option_count` entries and sums to 100.
pub fn validate_weights(weights: &[u8], option_count: usize) -> Result<()> {
    if weights.len() != option_count {
        return Err(GovernanceError::InvalidWeightCount {
            expected: option_count,
            actual: weights.len(),
        });
    }
    let sum: u64 = weights.iter().map(|w| u64::from(*w)).sum();
    if sum != WEIGHT_TOTAL {
        return Err(GovernanceError::InvalidWeightSum(sum));
    }
    Ok(())
}

/// Split `power` across options: each gets `power * weight / 100`, rounded
/// down. The remainder is not redistributed.
pub fn distribute_power(power: Amount, weights: &[u8]) -> Vec<Amount> {
    weights
        .iter()
        .map(|weight| power * Amount::from(*weight) / Amount::from(WEIGHT_TOTAL))
        .collect()
}

/// Index and power of the leading option.
///
/// Uses strict `>` so ties go to the lowest index.
pub fn leading_option(tally: &[Amount]) -> (usize, Amount) {
    let mut best = (0, tally.first().copied().unwrap_or(0));
    for (idx, power) in tally.iter().enumerate().skip(1) {
        if *power > best.1 {
            best = (idx, *power);
        }
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_integer_sqrt() {
        assert_eq!(integer_sqrt(0), 0);
        assert_eq!(integer_sqrt(1), 1);
        assert_eq!(integer_sqrt(2), 1);
        assert_eq!(integer_sqrt(4), 2);
        assert_eq!(integer_sqrt(15), 3); // floor(sqrt(15)) = 3
        assert_eq!(integer_sqrt(16), 4);
        assert_eq!(integer_sqrt(400), 20);
        assert_eq!(integer_sqrt(u128::MAX), u64::MAX as u128);
    }

    #[test]
    fn test_quadratic_cost() {
        assert_eq!(quadratic_cost(10), 100);
        assert_eq!(integer_sqrt(quadratic_cost(7) + 1), 7);
        assert_eq!(quadratic_cost(u128::MAX), u128::MAX);
    }

    #[test]
    fn test_distribution_drops_remainder() {
        assert_eq!(distribute_power(20, &[70, 30]), vec![14, 6]);
        // 7 * 33 / 100 = 2 three times, one unit lost
        assert_eq!(distribute_power(7, &[33, 33, 34]), vec![2, 2, 2]);
        assert_eq!(distribute_power(3, &[50, 50]), vec![1, 1]);
    }

    #[test]
    fn test_validate_weights() {
        assert!(validate_weights(&[70, 30], 2).is_ok());
        assert_eq!(
            validate_weights(&[70, 31], 2),
            Err(GovernanceError::InvalidWeightSum(101))
        );
        assert_eq!(
            validate_weights(&[100], 2),
            Err(GovernanceError::InvalidWeightCount { expected: 2, actual: 1 })
        );
        // u8 entries must not wrap when summed
        assert_eq!(
            validate_weights(&[200, 200], 2),
            Err(GovernanceError::InvalidWeightSum(400))
        );
    }

    #[test]
    fn test_leading_option_ties_to_lowest_index() {
        assert_eq!(leading_option(&[5, 9, 9]), (1, 9));
        assert_eq!(leading_option(&[0, 0]), (0, 0));
        assert_eq!(leading_option(&[3, 1]), (0, 3));
    }

    proptest! {
        #[test]
        fn prop_isqrt_bounds(n in any::<u128>()) {
            let r = integer_sqrt(n);
            prop_assert!(r.checked_mul(r).map_or(false, |sq| sq <= n));
            let next = r + 1;
            prop_assert!(next.checked_mul(next).map_or(true, |sq| sq > n));
        }

        #[test]
        fn prop_isqrt_monotonic(a in any::<u64>(), b in any::<u64>()) {
            let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
            prop_assert!(integer_sqrt(lo as u128) <= integer_sqrt(hi as u128));
        }

        #[test]
        fn prop_distribution_never_exceeds_power(
            power in 0u128..1_000_000_000,
            first in 0u8..=100,
        ) {
            let weights = [first, 100 - first];
            let parts = distribute_power(power, &weights);
            let total: u128 = parts.iter().sum();
            prop_assert!(total <= power);
            prop_assert!(power - total < weights.len() as u128);
        }
    }
}
