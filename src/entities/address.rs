// 🏠 Address value object

use crate::temporal::{assign_text, same_text};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Business content of an address (no identity, no timestamp)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AddressFields {
    pub uprn: Option<String>,
    pub address_line1: Option<String>,
    pub address_line2: Option<String>,
    pub locality: Option<String>,
    pub post_town: Option<String>,
    pub postcode: Option<String>,
    pub country_id: Option<String>,
    pub country_code: Option<String>,
    pub country_name: Option<String>,
}

/// Null and empty string compare equal in every address field
impl PartialEq for AddressFields {
    fn eq(&self, other: &Self) -> bool {
        same_text(&self.uprn, &other.uprn)
            && same_text(&self.address_line1, &other.address_line1)
            && same_text(&self.address_line2, &other.address_line2)
            && same_text(&self.locality, &other.locality)
            && same_text(&self.post_town, &other.post_town)
            && same_text(&self.postcode, &other.postcode)
            && same_text(&self.country_id, &other.country_id)
            && same_text(&self.country_code, &other.country_code)
            && same_text(&self.country_name, &other.country_name)
    }
}

impl AddressFields {
    pub fn is_empty(&self) -> bool {
        *self == AddressFields::default()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Address {
    pub id: String,
    #[serde(flatten)]
    pub fields: AddressFields,
    pub last_updated_date: DateTime<Utc>,
}

impl PartialEq for Address {
    fn eq(&self, other: &Self) -> bool {
        self.fields == other.fields
    }
}

impl Address {
    pub fn create(at: DateTime<Utc>, fields: AddressFields) -> Self {
        Address {
            id: super::new_id(),
            fields,
            last_updated_date: at,
        }
    }

    /// Mutate and re-stamp only when the proposed content differs
    pub fn apply_changes(&mut self, at: DateTime<Utc>, fields: AddressFields) -> bool {
        if self.fields == fields {
            return false;
        }

        let f = &mut self.fields;
        assign_text(&mut f.uprn, fields.uprn);
        assign_text(&mut f.address_line1, fields.address_line1);
        assign_text(&mut f.address_line2, fields.address_line2);
        assign_text(&mut f.locality, fields.locality);
        assign_text(&mut f.post_town, fields.post_town);
        assign_text(&mut f.postcode, fields.postcode);
        assign_text(&mut f.country_id, fields.country_id);
        assign_text(&mut f.country_code, fields.country_code);
        assign_text(&mut f.country_name, fields.country_name);
        self.last_updated_date = at;
        true
    }

    /// Replace an optional address slot: create, update or clear
    pub fn apply_to_slot(slot: &mut Option<Address>, at: DateTime<Utc>, fields: Option<AddressFields>) -> bool {
        match (slot.as_mut(), fields) {
            (Some(existing), Some(fields)) => existing.apply_changes(at, fields),
            (None, Some(fields)) => {
                *slot = Some(Address::create(at, fields));
                true
            }
            (Some(_), None) => {
                *slot = None;
                true
            }
            (None, None) => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn fields(line1: Option<&str>, postcode: &str) -> AddressFields {
        AddressFields {
            address_line1: line1.map(str::to_string),
            post_town: Some("Exeter".to_string()),
            postcode: Some(postcode.to_string()),
            ..AddressFields::default()
        }
    }

    #[test]
    fn test_equality_ignores_identity_and_time() {
        let a = Address::create(Utc::now(), fields(Some("Rose Farm"), "EX1 1AA"));
        let b = Address::create(Utc.with_ymd_and_hms(2001, 1, 1, 0, 0, 0).unwrap(), fields(Some("Rose Farm"), "EX1 1AA"));
        assert_ne!(a.id, b.id);
        assert_eq!(a, b);
    }

    #[test]
    fn test_null_equals_empty() {
        assert_eq!(fields(None, "EX1 1AA"), fields(Some(""), "EX1 1AA"));
        assert!(AddressFields {
            uprn: Some(String::new()),
            ..AddressFields::default()
        }
        .is_empty());
    }

    #[test]
    fn test_apply_changes_only_when_different() {
        let created = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let later = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();
        let mut address = Address::create(created, fields(Some("Rose Farm"), "EX1 1AA"));

        assert!(!address.apply_changes(later, fields(Some("Rose Farm"), "EX1 1AA")));
        assert_eq!(address.last_updated_date, created);

        assert!(address.apply_changes(later, fields(Some("Rose Farm"), "EX2 2BB")));
        assert_eq!(address.fields.postcode.as_deref(), Some("EX2 2BB"));
        assert_eq!(address.last_updated_date, later);
    }

    #[test]
    fn test_slot_lifecycle() {
        let at = Utc::now();
        let mut slot = None;
        assert!(Address::apply_to_slot(&mut slot, at, Some(fields(None, "EX1 1AA"))));
        assert!(!Address::apply_to_slot(&mut slot, at, Some(fields(None, "EX1 1AA"))));
        assert!(Address::apply_to_slot(&mut slot, at, None));
        assert!(slot.is_none());
        assert!(!Address::apply_to_slot(&mut slot, at, None));
    }
}
