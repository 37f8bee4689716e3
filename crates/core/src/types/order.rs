//! Order lifecycle rules: status transitions, stock effects and numbering.

use crate::types::status::OrderStatus;

/// Sequence number given to the first order of each year.
pub const FIRST_ORDER_SEQUENCE: u32 = 1000;

/// What a status change does to the stock reserved for an order's items.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StockEffect {
    /// Nothing to do.
    None,
    /// Items leave the warehouse: reserved and on-hand quantities both drop.
    Deduct,
    /// The reservation is given back.
    Release,
    /// A previously released reservation is taken again.
    Reserve,
}

impl OrderStatus {
    /// Statuses this status may move to.
    ///
    /// Moving to the same status is not listed; callers treat it as a no-op.
    #[must_use]
    pub const fn allowed_transitions(self) -> &'static [Self] {
        match self {
            Self::New => &[Self::Design, Self::Production, Self::Cancelled],
            Self::Design => &[Self::New, Self::Production, Self::Cancelled],
            Self::Production => &[Self::Done, Self::Cancelled],
            Self::Done => &[Self::Shipped, Self::Cancelled],
            Self::Shipped => &[Self::Cancelled],
            Self::Cancelled => &[Self::New, Self::Design, Self::Production],
        }
    }

    /// Whether `self -> to` is a legal move.
    #[must_use]
    pub fn can_transition_to(self, to: Self) -> bool {
        self.allowed_transitions().contains(&to)
    }

    /// Stock has physically left the warehouse in this status.
    #[must_use]
    pub const fn is_deducted(self) -> bool {
        matches!(self, Self::Done | Self::Shipped)
    }

    /// Linked inventory is held in `reserved_quantity` in this status.
    #[must_use]
    pub const fn holds_reservation(self) -> bool {
        matches!(self, Self::New | Self::Design | Self::Production)
    }

    /// Stock effect of moving from `self` to `to`.
    #[must_use]
    pub const fn stock_effect(self, to: Self) -> StockEffect {
        if to.is_deducted() && !self.is_deducted() {
            if matches!(self, Self::Cancelled) {
                // Nothing is reserved for a cancelled order and it cannot reach done/shipped directly.
                return StockEffect::None;
            }
            return StockEffect::Deduct;
        }
        if matches!(to, Self::Cancelled) && self.holds_reservation() {
            return StockEffect::Release;
        }
        if matches!(self, Self::Cancelled) && to.holds_reservation() {
            return StockEffect::Reserve;
        }
        StockEffect::None
    }
}

/// Format an order number: `ORD-{yy}-{sequence}`.
#[must_use]
pub fn format_order_number(year: i32, sequence: u32) -> String {
    format!("ORD-{:02}-{sequence}", year.rem_euclid(100))
}

/// Year prefix shared by every order number of `year`, e.g. `ORD-26-`.
#[must_use]
pub fn order_number_prefix(year: i32) -> String {
    format!("ORD-{:02}-", year.rem_euclid(100))
}

/// Next order number given the most recent number issued this year.
///
/// The first order of a year, or a most-recent number whose suffix is not
/// numeric, starts the sequence at [`FIRST_ORDER_SEQUENCE`].
#[must_use]
pub fn next_order_number(year: i32, last: Option<&str>) -> String {
    let next = last
        .and_then(|n| n.rsplit('-').next())
        .and_then(|suffix| suffix.parse::<u32>().ok())
        .map_or(FIRST_ORDER_SEQUENCE, |n| n.saturating_add(1).max(FIRST_ORDER_SEQUENCE));
    format_order_number(year, next)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transition_table() {
        use OrderStatus::*;

        assert!(New.can_transition_to(Design));
        assert!(New.can_transition_to(Production));
        assert!(New.can_transition_to(Cancelled));
        assert!(!New.can_transition_to(Done));
        assert!(!New.can_transition_to(Shipped));

        assert!(Design.can_transition_to(New));
        assert!(!Design.can_transition_to(Done));

        assert!(Production.can_transition_to(Done));
        assert!(!Production.can_transition_to(New));
        assert!(!Production.can_transition_to(Shipped));

        assert!(Done.can_transition_to(Shipped));
        assert!(!Done.can_transition_to(Production));

        assert!(Shipped.can_transition_to(Cancelled));
        assert!(!Shipped.can_transition_to(Done));

        assert!(Cancelled.can_transition_to(New));
        assert!(Cancelled.can_transition_to(Production));
        assert!(!Cancelled.can_transition_to(Done));
    }

    #[test]
    fn test_no_status_lists_itself() {
        for status in OrderStatus::ALL {
            assert!(!status.can_transition_to(*status), "{status} lists itself");
        }
    }

    #[test]
    fn test_stock_effects() {
        use OrderStatus::*;

        assert_eq!(Production.stock_effect(Done), StockEffect::Deduct);
        assert_eq!(Done.stock_effect(Shipped), StockEffect::None);
        assert_eq!(New.stock_effect(Cancelled), StockEffect::Release);
        assert_eq!(Design.stock_effect(Cancelled), StockEffect::Release);
        assert_eq!(Done.stock_effect(Cancelled), StockEffect::None);
        assert_eq!(Shipped.stock_effect(Cancelled), StockEffect::None);
        assert_eq!(Cancelled.stock_effect(New), StockEffect::Reserve);
        assert_eq!(Cancelled.stock_effect(Production), StockEffect::Reserve);
        assert_eq!(New.stock_effect(Design), StockEffect::None);
    }

    #[test]
    fn test_order_numbers() {
        assert_eq!(format_order_number(2026, 1000), "ORD-26-1000");
        assert_eq!(format_order_number(2105, 7), "ORD-05-7");
        assert_eq!(order_number_prefix(2026), "ORD-26-");

        assert_eq!(next_order_number(2026, None), "ORD-26-1000");
        assert_eq!(next_order_number(2026, Some("ORD-26-1041")), "ORD-26-1042");
        assert_eq!(next_order_number(2026, Some("ORD-26-abc")), "ORD-26-1000");
        assert_eq!(next_order_number(2026, Some("ORD-26-12")), "ORD-26-1000");
    }
}
