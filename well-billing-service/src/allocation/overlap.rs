//! Interval overlap aggregation of usage events against a billing window.

use std::collections::BTreeMap;

use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use uuid::Uuid;

use crate::models::UsageEvent;

const SECONDS_PER_MINUTE: i64 = 60;

/// Half-open billing window `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BillingWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl BillingWindow {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self { start, end }
    }
}

/// Accumulated basis of one field over a billing window.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FieldWeight {
    /// Overlapping minutes weighted by the field's share of each event.
    pub weight_minutes: Decimal,
    pub duration_minutes: Decimal,
    /// Irrigated area, summed un-weighted across events.
    pub area: Decimal,
}

/// Minutes of `[event_start, event_start + duration)` falling inside `window`.
///
/// Never negative; a non-positive overlap (including negative durations)
/// yields zero.
pub fn overlap_minutes(
    window: &BillingWindow,
    event_start: DateTime<Utc>,
    duration_minutes: i32,
) -> Decimal {
    let event_end = event_start + Duration::minutes(i64::from(duration_minutes));
    let start = event_start.max(window.start);
    let end = event_end.min(window.end);

    if end <= start {
        return Decimal::ZERO;
    }

    Decimal::from((end - start).num_seconds()) / Decimal::from(SECONDS_PER_MINUTE)
}

/// Aggregate per-field weights for every usage event overlapping `window`.
///
/// Events without overlap and shares with a non-positive percentage
/// contribute nothing, so their fields never appear unless some other event
/// gives them weight. Keys iterate in ascending field id.
pub fn compute_field_weights(
    window: &BillingWindow,
    events: &[UsageEvent],
) -> BTreeMap<Uuid, FieldWeight> {
    let mut weights: BTreeMap<Uuid, FieldWeight> = BTreeMap::new();

    for event in events {
        let overlap = overlap_minutes(window, event.start_utc, event.duration_minutes);
        if overlap <= Decimal::ZERO {
            continue;
        }

        for share in &event.shares {
            if share.percentage <= Decimal::ZERO {
                continue;
            }

            let weighted = overlap * share.percentage / Decimal::ONE_HUNDRED;
            let entry = weights.entry(share.field_id).or_default();
            entry.weight_minutes += weighted;
            entry.duration_minutes += weighted;
            entry.area += share.actual_area.unwrap_or(Decimal::ZERO);
        }
    }

    weights
}

/// Sum of all field weights.
pub fn total_weight(weights: &BTreeMap<Uuid, FieldWeight>) -> Decimal {
    weights.values().map(|w| w.weight_minutes).sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::FieldShare;
    use chrono::TimeZone;
    use rust_decimal_macros::dec;

    fn at(y: i32, m: u32, d: u32, h: u32, min: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, h, min, 0).unwrap()
    }

    fn january_week() -> BillingWindow {
        BillingWindow::new(at(2024, 1, 1, 0, 0), at(2024, 1, 8, 0, 0))
    }

    fn event(start: DateTime<Utc>, minutes: i32, shares: &[(Uuid, Decimal)]) -> UsageEvent {
        let event_id = Uuid::new_v4();
        UsageEvent {
            event_id,
            well_id: Uuid::nil(),
            start_utc: start,
            duration_minutes: minutes,
            shares: shares
                .iter()
                .map(|(field_id, percentage)| FieldShare {
                    event_id,
                    field_id: *field_id,
                    percentage: *percentage,
                    actual_area: None,
                })
                .collect(),
        }
    }

    #[test]
    fn event_inside_window_counts_fully() {
        let field = Uuid::new_v4();
        let events = vec![event(at(2024, 1, 5, 12, 0), 180, &[(field, dec!(100))])];

        let weights = compute_field_weights(&january_week(), &events);

        assert_eq!(weights.len(), 1);
        assert_eq!(weights[&field].weight_minutes, dec!(180));
        assert_eq!(weights[&field].duration_minutes, dec!(180));
    }

    #[test]
    fn event_starting_before_window_counts_only_overlap() {
        let overlap = overlap_minutes(&january_week(), at(2023, 12, 31, 23, 0), 120);
        assert_eq!(overlap, dec!(60));
    }

    #[test]
    fn event_ending_after_window_is_clipped() {
        let overlap = overlap_minutes(&january_week(), at(2024, 1, 7, 23, 30), 90);
        assert_eq!(overlap, dec!(30));
    }

    #[test]
    fn event_outside_window_is_dropped() {
        let field = Uuid::new_v4();
        let events = vec![
            event(at(2023, 12, 20, 8, 0), 120, &[(field, dec!(100))]),
            event(at(2024, 1, 8, 0, 0), 60, &[(field, dec!(100))]),
        ];

        let weights = compute_field_weights(&january_week(), &events);

        assert!(weights.is_empty());
    }

    #[test]
    fn negative_duration_yields_zero_overlap() {
        assert_eq!(
            overlap_minutes(&january_week(), at(2024, 1, 3, 10, 0), -45),
            Decimal::ZERO
        );
    }

    #[test]
    fn shares_are_weighted_by_percentage() {
        let north = Uuid::new_v4();
        let south = Uuid::new_v4();
        let events = vec![
            event(
                at(2024, 1, 2, 6, 0),
                200,
                &[(north, dec!(75)), (south, dec!(25))],
            ),
            event(at(2024, 1, 3, 6, 0), 40, &[(south, dec!(100))]),
        ];

        let weights = compute_field_weights(&january_week(), &events);

        assert_eq!(weights[&north].weight_minutes, dec!(150));
        assert_eq!(weights[&south].weight_minutes, dec!(90));
        assert_eq!(total_weight(&weights), dec!(240));
    }

    #[test]
    fn zero_percentage_share_does_not_create_field() {
        let watered = Uuid::new_v4();
        let idle = Uuid::new_v4();
        let events = vec![event(
            at(2024, 1, 2, 6, 0),
            60,
            &[(watered, dec!(100)), (idle, dec!(0))],
        )];

        let weights = compute_field_weights(&january_week(), &events);

        assert!(weights.contains_key(&watered));
        assert!(!weights.contains_key(&idle));
    }

    #[test]
    fn area_accumulates_unweighted() {
        let field = Uuid::new_v4();
        let mut first = event(at(2024, 1, 2, 6, 0), 60, &[(field, dec!(50))]);
        first.shares[0].actual_area = Some(dec!(12.5));
        let mut second = event(at(2024, 1, 4, 6, 0), 60, &[(field, dec!(50))]);
        second.shares[0].actual_area = Some(dec!(7.5));
        let third = event(at(2024, 1, 5, 6, 0), 60, &[(field, dec!(50))]);

        let weights = compute_field_weights(&january_week(), &[first, second, third]);

        assert_eq!(weights[&field].area, dec!(20));
        assert_eq!(weights[&field].weight_minutes, dec!(90));
    }

    #[test]
    fn widening_the_window_never_shrinks_overlap() {
        let start = at(2024, 1, 7, 22, 0);
        let narrow = overlap_minutes(&january_week(), start, 240);
        let wide = overlap_minutes(
            &BillingWindow::new(at(2024, 1, 1, 0, 0), at(2024, 1, 15, 0, 0)),
            start,
            240,
        );
        let disjoint = overlap_minutes(
            &BillingWindow::new(at(2024, 2, 1, 0, 0), at(2024, 2, 8, 0, 0)),
            start,
            240,
        );

        assert_eq!(narrow, dec!(120));
        assert_eq!(wide, dec!(240));
        assert!(wide >= narrow);
        assert_eq!(disjoint, Decimal::ZERO);
    }

    #[test]
    fn empty_input_yields_empty_map() {
        assert!(compute_field_weights(&january_week(), &[]).is_empty());
    }
}
