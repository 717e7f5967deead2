// Premises activity at a site (deduplicated by activity code)

use super::reference::ReferenceSummary;
use crate::temporal::{assign, ChangeTracked};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SiteActivity {
    pub id: String,
    pub activity: ReferenceSummary,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub last_updated_date: DateTime<Utc>,
}

impl PartialEq for SiteActivity {
    fn eq(&self, other: &Self) -> bool {
        self.activity == other.activity
            && self.start_date == other.start_date
            && self.end_date == other.end_date
    }
}

impl SiteActivity {
    pub fn new(
        at: DateTime<Utc>,
        activity: ReferenceSummary,
        start_date: Option<NaiveDate>,
        end_date: Option<NaiveDate>,
    ) -> Self {
        SiteActivity {
            id: super::new_id(),
            activity,
            start_date,
            end_date,
            last_updated_date: at,
        }
    }

    pub fn code(&self) -> &str {
        &self.activity.code
    }

    pub fn apply_changes(
        &mut self,
        at: DateTime<Utc>,
        activity: ReferenceSummary,
        start_date: Option<NaiveDate>,
        end_date: Option<NaiveDate>,
    ) -> bool {
        let mut changed = assign(&mut self.activity, activity);
        changed |= assign(&mut self.start_date, start_date);
        changed |= assign(&mut self.end_date, end_date);
        if changed {
            self.last_updated_date = at;
        }
        changed
    }
}

impl ChangeTracked for SiteActivity {
    fn key(&self) -> String {
        self.activity.code.to_uppercase()
    }

    fn last_updated_date(&self) -> DateTime<Utc> {
        self.last_updated_date
    }

    fn apply_from(&mut self, incoming: &Self, at: DateTime<Utc>) -> bool {
        self.apply_changes(at, incoming.activity.clone(), incoming.start_date, incoming.end_date)
    }

    fn touch(&mut self, at: DateTime<Utc>) {
        self.last_updated_date = at;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::temporal::sync_collection;
    use chrono::TimeZone;

    fn activity(code: &str, start: Option<NaiveDate>) -> SiteActivity {
        let t0 = Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).unwrap();
        SiteActivity::new(t0, ReferenceSummary::resolved(code, None), start, None)
    }

    #[test]
    fn test_window_change_restamps_only_that_activity() {
        let t1 = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();
        let d1 = NaiveDate::from_ymd_opt(2020, 1, 1);
        let d2 = NaiveDate::from_ymd_opt(2021, 1, 1);
        let mut items = vec![activity("ABP", d1), activity("MKT", d1)];

        let changes = sync_collection(&mut items, vec![activity("abp", d2), activity("MKT", d1)], t1);

        assert_eq!(changes.updated, 1);
        assert_eq!(changes.added + changes.removed, 0);
        assert_eq!(items[0].start_date, d2);
        assert_eq!(items[0].last_updated_date, t1);
        assert!(items[1].last_updated_date < t1);
    }
}
