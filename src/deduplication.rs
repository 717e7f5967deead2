// 🔍 Deduplication - distinct reference codes and representative-holding selection
//
// Several holdings can share one CPH (one per facility activity / species).
// A Site is seeded from a single representative, but its species and
// activities are the union over every live holding under the key.

use crate::silver::SilverHolding;
use std::collections::BTreeSet;

// ============================================================================
// DISTINCT CODES
// ============================================================================

/// Upper-cased distinct codes over live holdings; blanks excluded. Sorted, so
/// the resulting Site children come out in a stable order.
pub fn distinct_codes<'a, F>(holdings: &'a [SilverHolding], code: F) -> Vec<String>
where
    F: Fn(&'a SilverHolding) -> Option<&'a str>,
{
    holdings
        .iter()
        .filter(|h| !h.is_deleted)
        .filter_map(|h| code(h))
        .map(str::trim)
        .filter(|c| !c.is_empty())
        .map(str::to_uppercase)
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

pub fn distinct_species_codes(holdings: &[SilverHolding]) -> Vec<String> {
    distinct_codes(holdings, |h| h.species_code.as_deref())
}

pub fn distinct_activity_codes(holdings: &[SilverHolding]) -> Vec<String> {
    distinct_codes(holdings, |h| h.activity_code())
}

// ============================================================================
// REPRESENTATIVE SELECTION
// ============================================================================

/// Active holding with the latest update wins; with none active, the latest
/// overall. Deleted holdings only count when every holding is deleted.
///
/// Ties keep the first holding in input order.
pub fn select_representative(holdings: &[SilverHolding]) -> Option<&SilverHolding> {
    let live: Vec<&SilverHolding> = holdings.iter().filter(|h| !h.is_deleted).collect();
    let candidates: Vec<&SilverHolding> = if live.is_empty() {
        holdings.iter().collect()
    } else {
        live
    };

    let active: Vec<&SilverHolding> = candidates.iter().copied().filter(|h| h.is_active).collect();
    let pool = if active.is_empty() { candidates } else { active };

    pool.into_iter().fold(None, |best, h| match best {
        Some(b) if b.source_updated_at >= h.source_updated_at => Some(b),
        _ => Some(h),
    })
}
