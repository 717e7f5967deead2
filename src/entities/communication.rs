// Communication value object (email / phones)

use crate::temporal::{assign, assign_text, same_text};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CommunicationFields {
    pub email: Option<String>,
    pub mobile: Option<String>,
    pub landline: Option<String>,
    pub primary_contact_flag: bool,
}

impl PartialEq for CommunicationFields {
    fn eq(&self, other: &Self) -> bool {
        same_text(&self.email, &other.email)
            && same_text(&self.mobile, &other.mobile)
            && same_text(&self.landline, &other.landline)
            && self.primary_contact_flag == other.primary_contact_flag
    }
}

impl CommunicationFields {
    /// No channel at all; such a record is not worth storing
    pub fn has_no_channel(&self) -> bool {
        same_text(&self.email, &None) && same_text(&self.mobile, &None) && same_text(&self.landline, &None)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Communication {
    pub id: String,
    #[serde(flatten)]
    pub fields: CommunicationFields,
    pub last_updated_date: DateTime<Utc>,
}

impl PartialEq for Communication {
    fn eq(&self, other: &Self) -> bool {
        self.fields == other.fields
    }
}

impl Communication {
    pub fn create(at: DateTime<Utc>, fields: CommunicationFields) -> Self {
        Communication {
            id: super::new_id(),
            fields,
            last_updated_date: at,
        }
    }

    pub fn apply_changes(&mut self, at: DateTime<Utc>, fields: CommunicationFields) -> bool {
        if self.fields == fields {
            return false;
        }

        let f = &mut self.fields;
        assign_text(&mut f.email, fields.email);
        assign_text(&mut f.mobile, fields.mobile);
        assign_text(&mut f.landline, fields.landline);
        assign(&mut f.primary_contact_flag, fields.primary_contact_flag);
        self.last_updated_date = at;
        true
    }

    pub fn apply_to_slot(
        slot: &mut Option<Communication>,
        at: DateTime<Utc>,
        fields: Option<CommunicationFields>,
    ) -> bool {
        let fields = fields.filter(|f| !f.has_no_channel());
        match (slot.as_mut(), fields) {
            (Some(existing), Some(fields)) => existing.apply_changes(at, fields),
            (None, Some(fields)) => {
                *slot = Some(Communication::create(at, fields));
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

    fn email(value: &str) -> CommunicationFields {
        CommunicationFields {
            email: Some(value.to_string()),
            primary_contact_flag: true,
            ..CommunicationFields::default()
        }
    }

    #[test]
    fn test_apply_changes() {
        let t0 = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let t1 = Utc.with_ymd_and_hms(2024, 2, 1, 0, 0, 0).unwrap();
        let mut comm = Communication::create(t0, email("a@farm.test"));

        assert!(!comm.apply_changes(t1, email("a@farm.test")));
        assert_eq!(comm.last_updated_date, t0);

        assert!(comm.apply_changes(t1, email("b@farm.test")));
        assert_eq!(comm.last_updated_date, t1);
    }

    #[test]
    fn test_empty_channels_clear_slot() {
        let mut slot = Some(Communication::create(Utc::now(), email("a@farm.test")));
        let blank = CommunicationFields {
            email: Some(String::new()),
            ..CommunicationFields::default()
        };
        assert!(Communication::apply_to_slot(&mut slot, Utc::now(), Some(blank)));
        assert!(slot.is_none());
    }
}
