//! Proportional distribution of a currency amount over weighted shares.

use rust_decimal::{Decimal, RoundingStrategy};

/// Decimal places of the billing currency.
pub const CURRENCY_SCALE: u32 = 2;

/// A recipient and its proportional weight.
#[derive(Debug, Clone, PartialEq)]
pub struct Share<K> {
    pub key: K,
    pub weight: Decimal,
}

impl<K> Share<K> {
    pub fn new(key: K, weight: Decimal) -> Self {
        Self { key, weight }
    }
}

/// A recipient and the amount it receives.
#[derive(Debug, Clone, PartialEq)]
pub struct Allocation<K> {
    pub key: K,
    pub amount: Decimal,
}

/// Round half away from zero to currency precision.
pub fn round_currency(amount: Decimal) -> Decimal {
    amount.round_dp_with_strategy(CURRENCY_SCALE, RoundingStrategy::MidpointAwayFromZero)
}

/// Split `total` across `shares` proportionally to their weights.
///
/// Amounts are rounded to cents and the rounding residual is added to the
/// first share holding the largest rounded amount, so the result sums to
/// `round_currency(total)` exactly. A negative residual larger than that
/// share is taken a cent at a time from shares in descending amount order,
/// so no share drops below zero. A zero total weight (including no shares)
/// yields an empty result. Negative inputs are not validated.
pub fn distribute<K: Clone>(total: Decimal, shares: &[Share<K>]) -> Vec<Allocation<K>> {
    let total_weight: Decimal = shares.iter().map(|s| s.weight).sum();
    if total_weight.is_zero() {
        return Vec::new();
    }

    let mut allocations: Vec<Allocation<K>> = shares
        .iter()
        .map(|share| Allocation {
            key: share.key.clone(),
            amount: round_currency(total * share.weight / total_weight),
        })
        .collect();

    let allocated: Decimal = allocations.iter().map(|a| a.amount).sum();
    let residual = round_currency(round_currency(total) - allocated);

    if residual.is_zero() {
        return allocations;
    }

    if let Some(largest) = index_of_largest(&allocations) {
        if allocations[largest].amount + residual >= Decimal::ZERO {
            allocations[largest].amount += residual;
        } else {
            spread_shortfall(&mut allocations, residual);
        }
    }

    allocations
}

/// Take a negative `residual` back one cent at a time, largest amounts first
/// (iteration order on ties), never below zero.
fn spread_shortfall<K>(allocations: &mut [Allocation<K>], residual: Decimal) {
    let cent = Decimal::new(1, CURRENCY_SCALE);
    let mut order: Vec<usize> = (0..allocations.len()).collect();
    order.sort_by(|a, b| allocations[*b].amount.cmp(&allocations[*a].amount));

    let mut remaining = -residual;
    while remaining > Decimal::ZERO {
        let mut taken = false;
        for &index in &order {
            if remaining <= Decimal::ZERO {
                break;
            }
            if allocations[index].amount >= cent {
                allocations[index].amount -= cent;
                remaining -= cent;
                taken = true;
            }
        }
        if !taken {
            break;
        }
    }
}

fn index_of_largest<K>(allocations: &[Allocation<K>]) -> Option<usize> {
    let mut largest: Option<usize> = None;
    for (index, allocation) in allocations.iter().enumerate() {
        match largest {
            Some(current) if allocation.amount <= allocations[current].amount => {}
            _ => largest = Some(index),
        }
    }
    largest
}
