// 📍 Location value object - map reference, grid position and address

use super::address::{Address, AddressFields};
use crate::temporal::{assign, assign_text, same_text};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LocationFields {
    pub os_map_reference: Option<String>,
    pub easting: Option<i32>,
    pub northing: Option<i32>,
    pub address: Option<AddressFields>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Location {
    pub id: String,
    pub os_map_reference: Option<String>,
    pub easting: Option<i32>,
    pub northing: Option<i32>,
    pub address: Option<Address>,
    pub last_updated_date: DateTime<Utc>,
}

impl PartialEq for Location {
    fn eq(&self, other: &Self) -> bool {
        same_text(&self.os_map_reference, &other.os_map_reference)
            && self.easting == other.easting
            && self.northing == other.northing
            && self.address == other.address
    }
}

impl Location {
    pub fn create(at: DateTime<Utc>, fields: LocationFields) -> Self {
        Location {
            id: super::new_id(),
            os_map_reference: fields.os_map_reference,
            easting: fields.easting,
            northing: fields.northing,
            address: fields.address.map(|a| Address::create(at, a)),
            last_updated_date: at,
        }
    }

    /// Grid fields and the nested address are compared separately;
    /// either changing re-stamps the location.
    pub fn apply_changes(&mut self, at: DateTime<Utc>, fields: LocationFields) -> bool {
        let mut changed = false;

        if !same_text(&self.os_map_reference, &fields.os_map_reference) {
            assign_text(&mut self.os_map_reference, fields.os_map_reference);
            changed = true;
        }
        changed |= assign(&mut self.easting, fields.easting);
        changed |= assign(&mut self.northing, fields.northing);
        changed |= Address::apply_to_slot(&mut self.address, at, fields.address);

        if changed {
            self.last_updated_date = at;
        }
        changed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn fields(easting: i32, postcode: &str) -> LocationFields {
        LocationFields {
            os_map_reference: Some("SX912925".to_string()),
            easting: Some(easting),
            northing: Some(92500),
            address: Some(AddressFields {
                postcode: Some(postcode.to_string()),
                ..AddressFields::default()
            }),
        }
    }

    #[test]
    fn test_unchanged_location_keeps_stamp() {
        let t0 = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let t1 = Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap();
        let mut location = Location::create(t0, fields(291200, "EX1 1AA"));

        assert!(!location.apply_changes(t1, fields(291200, "EX1 1AA")));
        assert_eq!(location.last_updated_date, t0);
    }

    #[test]
    fn test_nested_address_change_restamps_location() {
        let t0 = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let t1 = Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap();
        let mut location = Location::create(t0, fields(291200, "EX1 1AA"));
        let address_id = location.address.as_ref().unwrap().id.clone();

        assert!(location.apply_changes(t1, fields(291200, "EX4 4QJ")));
        assert_eq!(location.last_updated_date, t1);

        let address = location.address.as_ref().unwrap();
        assert_eq!(address.id, address_id);
        assert_eq!(address.last_updated_date, t1);
    }

    #[test]
    fn test_grid_change_leaves_address_stamp() {
        let t0 = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let t1 = Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap();
        let mut location = Location::create(t0, fields(291200, "EX1 1AA"));

        assert!(location.apply_changes(t1, fields(291300, "EX1 1AA")));
        assert_eq!(location.address.as_ref().unwrap().last_updated_date, t0);
    }
}
