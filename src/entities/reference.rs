// Denormalized reference-data summary carried on aggregates

use crate::lookup::ReferenceItem;
use serde::{Deserialize, Serialize};

/// (id, code, name) of a reference value; id and name stay None on a lookup miss
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReferenceSummary {
    pub id: Option<String>,
    pub code: String,
    pub name: Option<String>,
}

impl ReferenceSummary {
    /// Summary from a raw code and whatever the lookup returned
    pub fn resolved(code: &str, item: Option<&ReferenceItem>) -> Self {
        match item {
            Some(item) => ReferenceSummary {
                id: Some(item.id.clone()),
                code: item.code.clone(),
                name: Some(item.name.clone()),
            },
            None => ReferenceSummary {
                id: None,
                code: code.to_string(),
                name: None,
            },
        }
    }

    pub fn is_resolved(&self) -> bool {
        self.id.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_miss_keeps_raw_code() {
        let summary = ReferenceSummary::resolved("ZZZ", None);
        assert_eq!(summary.code, "ZZZ");
        assert!(!summary.is_resolved());

        let item = ReferenceItem::new("s-ctt", "CTT", "Cattle");
        let summary = ReferenceSummary::resolved("ctt", Some(&item));
        assert_eq!(summary.id.as_deref(), Some("s-ctt"));
        assert_eq!(summary.code, "CTT");
    }
}
