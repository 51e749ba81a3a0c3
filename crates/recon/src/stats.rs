//! Read-only ranking views over the roster.
//!
//! All views rank one [`RosterStats`] snapshot, so a page built from several
//! views is consistent even if an import lands in between. Ties are broken
//! by key ascending.

use serde::Serialize;

use crate::error::StoreError;
use crate::model::{signed, MemberKey, MemberRecord};
use crate::store::RosterRead;

pub const DEFAULT_TOP_N: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Order {
    Ascending,
    Descending,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatEntry {
    pub key: MemberKey,
    pub display_name: String,
    pub value: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RosterSummary {
    pub members: usize,
    pub total_power: u64,
}

pub struct RosterStats {
    records: Vec<MemberRecord>,
}

impl RosterStats {
    pub fn load<R: RosterRead + ?Sized>(store: &R) -> Result<Self, StoreError> {
        Ok(Self::from_records(store.list_all()?))
    }

    pub fn from_records(records: Vec<MemberRecord>) -> Self {
        Self { records }
    }

    /// Highest `power_current` first.
    pub fn top_power(&self, n: usize) -> Vec<StatEntry> {
        self.ranked(n, Order::Descending, |r| signed(r.power_current()))
    }

    /// Lowest `power_current` first.
    pub fn lowest_power(&self, n: usize) -> Vec<StatEntry> {
        self.ranked(n, Order::Ascending, |r| signed(r.power_current()))
    }

    /// `power_current - power_start`. Descending = biggest gain, ascending = least.
    pub fn power_gain(&self, n: usize, order: Order) -> Vec<StatEntry> {
        self.ranked(n, order, MemberRecord::power_delta)
    }

    /// `level_current - level_start`, least progress first.
    pub fn least_level_progress(&self, n: usize) -> Vec<StatEntry> {
        self.ranked(n, Order::Ascending, MemberRecord::level_delta)
    }

    pub fn summary(&self) -> RosterSummary {
        RosterSummary {
            members: self.records.len(),
            total_power: self
                .records
                .iter()
                .fold(0u64, |acc, r| acc.saturating_add(r.power_current())),
        }
    }

    fn ranked(&self, n: usize, order: Order, value: impl Fn(&MemberRecord) -> i64) -> Vec<StatEntry> {
        let mut scored: Vec<(i64, &MemberRecord)> = self.records.iter().map(|r| (value(r), r)).collect();
        scored.sort_by(|(va, a), (vb, b)| {
            let by_value = match order {
                Order::Ascending => va.cmp(vb),
                Order::Descending => vb.cmp(va),
            };
            by_value.then_with(|| a.key().cmp(b.key()))
        });
        scored
            .into_iter()
            .take(n)
            .map(|(value, r)| StatEntry {
                key: r.key().clone(),
                display_name: r.display_name().to_string(),
                value,
            })
            .collect()
    }
}
