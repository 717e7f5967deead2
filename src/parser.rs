// 🏗️ Raw extract rows - SAM holdings, herds, parties and holders
//
// Column names follow the SAM extract headers. Every field is nullable:
// a row with a null key is skipped later by the normalizer, never here.

use anyhow::{bail, Context, Result};
use chrono::{DateTime, NaiveDate, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// CHANGE_TYPE value marking a row deleted at source
pub const CHANGE_TYPE_DELETE: &str = "D";

fn is_delete_marker(change_type: Option<&str>) -> bool {
    change_type.map_or(false, |c| c.trim().eq_ignore_ascii_case(CHANGE_TYPE_DELETE))
}

// ============================================================================
// EXTRACT KIND
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExtractKind {
    Holdings,
    Herds,
    Parties,
    Holders,
    ReferenceData,
}

impl ExtractKind {
    /// File name prefix the extract is recognised by
    pub fn prefix(&self) -> &'static str {
        match self {
            ExtractKind::Holdings => "holdings",
            ExtractKind::Herds => "herds",
            ExtractKind::Parties => "parties",
            ExtractKind::Holders => "holders",
            ExtractKind::ReferenceData => "reference_data",
        }
    }

    pub fn all() -> [ExtractKind; 5] {
        [
            ExtractKind::Holdings,
            ExtractKind::Herds,
            ExtractKind::Parties,
            ExtractKind::Holders,
            ExtractKind::ReferenceData,
        ]
    }
}

/// Detect which extract a CSV file holds from its file name
pub fn detect_extract(path: &Path) -> Result<ExtractKind> {
    let file_name = path
        .file_name()
        .and_then(|n| n.to_str())
        .map(|n| n.to_lowercase())
        .context("Extract path has no file name")?;

    if !file_name.ends_with(".csv") {
        bail!("Not a CSV extract: {}", file_name);
    }

    ExtractKind::all()
        .into_iter()
        .find(|kind| file_name.starts_with(kind.prefix()))
        .with_context(|| format!("Unrecognised extract file: {}", file_name))
}

// ============================================================================
// RAW ROWS
// ============================================================================

/// One row of the SAM CPH holdings extract
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawHolding {
    #[serde(rename = "CPH")]
    pub cph: Option<String>,
    #[serde(rename = "FEATURE_NAME")]
    pub feature_name: Option<String>,
    #[serde(rename = "CPH_TYPE")]
    pub cph_type: Option<String>,
    #[serde(rename = "FACILITY_BUSINSS_ACTVTY_CODE")]
    pub facility_business_activity_code: Option<String>,
    #[serde(rename = "ANIMAL_SPECIES_CODE")]
    pub animal_species_code: Option<String>,
    #[serde(rename = "ANIMAL_PRODUCTION_USAGE_CODE")]
    pub animal_production_usage_code: Option<String>,

    #[serde(rename = "SAON_START_NUMBER")]
    pub saon_start_number: Option<i32>,
    #[serde(rename = "SAON_START_NUMBER_SUFFIX")]
    pub saon_start_number_suffix: Option<String>,
    #[serde(rename = "SAON_END_NUMBER")]
    pub saon_end_number: Option<i32>,
    #[serde(rename = "SAON_END_NUMBER_SUFFIX")]
    pub saon_end_number_suffix: Option<String>,
    #[serde(rename = "SAON_DESCRIPTION")]
    pub saon_description: Option<String>,
    #[serde(rename = "PAON_START_NUMBER")]
    pub paon_start_number: Option<i32>,
    #[serde(rename = "PAON_START_NUMBER_SUFFIX")]
    pub paon_start_number_suffix: Option<String>,
    #[serde(rename = "PAON_END_NUMBER")]
    pub paon_end_number: Option<i32>,
    #[serde(rename = "PAON_END_NUMBER_SUFFIX")]
    pub paon_end_number_suffix: Option<String>,
    #[serde(rename = "PAON_DESCRIPTION")]
    pub paon_description: Option<String>,
    #[serde(rename = "STREET")]
    pub street: Option<String>,
    #[serde(rename = "LOCALITY")]
    pub locality: Option<String>,
    #[serde(rename = "TOWN")]
    pub town: Option<String>,
    #[serde(rename = "POSTCODE")]
    pub postcode: Option<String>,
    #[serde(rename = "COUNTRY_CODE")]
    pub country_code: Option<String>,
    #[serde(rename = "UK_INTERNAL_CODE")]
    pub uk_internal_code: Option<String>,
    #[serde(rename = "UDPRN")]
    pub udprn: Option<String>,

    #[serde(rename = "EASTING")]
    pub easting: Option<i32>,
    #[serde(rename = "NORTHING")]
    pub northing: Option<i32>,
    #[serde(rename = "OS_MAP_REFERENCE")]
    pub os_map_reference: Option<String>,

    #[serde(rename = "FEATURE_ADDRESS_FROM_DATE")]
    pub holding_start_date: Option<NaiveDate>,
    #[serde(rename = "FEATURE_ADDRESS_TO_DATE")]
    pub holding_end_date: Option<NaiveDate>,
    #[serde(rename = "FACILITY_TYPE_FROM_DATE")]
    pub activity_start_date: Option<NaiveDate>,
    #[serde(rename = "FACILITY_TYPE_TO_DATE")]
    pub activity_end_date: Option<NaiveDate>,

    #[serde(rename = "CHANGE_TYPE")]
    pub change_type: Option<String>,
    #[serde(rename = "UPDATED_AT")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl RawHolding {
    pub fn is_deleted(&self) -> bool {
        is_delete_marker(self.change_type.as_deref())
    }
}

/// One row of the SAM herds extract
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawHerd {
    #[serde(rename = "HERDMARK")]
    pub herdmark: Option<String>,
    #[serde(rename = "CPHH")]
    pub cphh: Option<String>,
    #[serde(rename = "ANIMAL_SPECIES_CODE")]
    pub animal_species_code: Option<String>,
    #[serde(rename = "ANIMAL_PURPOSE_CODE")]
    pub animal_purpose_code: Option<String>,
    #[serde(rename = "DISEASE_TYPE")]
    pub disease_type: Option<String>,
    #[serde(rename = "INTERVALS")]
    pub interval: Option<i32>,
    #[serde(rename = "INTERVAL_UNIT_OF_TIME")]
    pub interval_unit: Option<String>,
    #[serde(rename = "MOVEMENT_RSTRCTN_RGN_CODE")]
    pub movement_restriction_region: Option<String>,
    #[serde(rename = "ANIMAL_GROUP_ID_MCH_FRM_DAT")]
    pub start_date: Option<NaiveDate>,
    #[serde(rename = "ANIMAL_GROUP_ID_MCH_TO_DAT")]
    pub end_date: Option<NaiveDate>,
    #[serde(rename = "OWNER_PARTY_IDS")]
    pub owner_party_ids: Option<String>,
    #[serde(rename = "KEEPER_PARTY_IDS")]
    pub keeper_party_ids: Option<String>,
    #[serde(rename = "CHANGE_TYPE")]
    pub change_type: Option<String>,
    #[serde(rename = "UPDATED_AT")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl RawHerd {
    pub fn is_deleted(&self) -> bool {
        is_delete_marker(self.change_type.as_deref())
    }
}

/// One row of the SAM parties extract (general parties with role names)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawParty {
    #[serde(rename = "PARTY_ID")]
    pub party_id: Option<String>,
    #[serde(rename = "PERSON_TITLE")]
    pub title: Option<String>,
    #[serde(rename = "PERSON_GIVEN_NAME")]
    pub given_name: Option<String>,
    #[serde(rename = "PERSON_GIVEN_NAME2")]
    pub given_name2: Option<String>,
    #[serde(rename = "PERSON_FAMILY_NAME")]
    pub family_name: Option<String>,
    #[serde(rename = "ORGANISATION_NAME")]
    pub organisation_name: Option<String>,
    #[serde(rename = "TELEPHONE_NUMBER")]
    pub telephone_number: Option<String>,
    #[serde(rename = "MOBILE_NUMBER")]
    pub mobile_number: Option<String>,
    #[serde(rename = "INTERNET_EMAIL_ADDRESS")]
    pub email_address: Option<String>,

    #[serde(rename = "SAON_START_NUMBER")]
    pub saon_start_number: Option<i32>,
    #[serde(rename = "SAON_START_NUMBER_SUFFIX")]
    pub saon_start_number_suffix: Option<String>,
    #[serde(rename = "SAON_END_NUMBER")]
    pub saon_end_number: Option<i32>,
    #[serde(rename = "SAON_END_NUMBER_SUFFIX")]
    pub saon_end_number_suffix: Option<String>,
    #[serde(rename = "SAON_DESCRIPTION")]
    pub saon_description: Option<String>,
    #[serde(rename = "PAON_START_NUMBER")]
    pub paon_start_number: Option<i32>,
    #[serde(rename = "PAON_START_NUMBER_SUFFIX")]
    pub paon_start_number_suffix: Option<String>,
    #[serde(rename = "PAON_END_NUMBER")]
    pub paon_end_number: Option<i32>,
    #[serde(rename = "PAON_END_NUMBER_SUFFIX")]
    pub paon_end_number_suffix: Option<String>,
    #[serde(rename = "PAON_DESCRIPTION")]
    pub paon_description: Option<String>,
    #[serde(rename = "STREET")]
    pub street: Option<String>,
    #[serde(rename = "LOCALITY")]
    pub locality: Option<String>,
    #[serde(rename = "TOWN")]
    pub town: Option<String>,
    #[serde(rename = "POSTCODE")]
    pub postcode: Option<String>,
    #[serde(rename = "COUNTRY_CODE")]
    pub country_code: Option<String>,
    #[serde(rename = "UK_INTERNAL_CODE")]
    pub uk_internal_code: Option<String>,
    #[serde(rename = "UDPRN")]
    pub udprn: Option<String>,

    /// Comma-separated source role names ("Keeper,Owner")
    #[serde(rename = "ROLES")]
    pub roles: Option<String>,
    #[serde(rename = "PARTY_ROLE_FROM_DATE")]
    pub role_from_date: Option<NaiveDate>,
    #[serde(rename = "PARTY_ROLE_TO_DATE")]
    pub role_to_date: Option<NaiveDate>,

    #[serde(rename = "CHANGE_TYPE")]
    pub change_type: Option<String>,
    #[serde(rename = "UPDATED_AT")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl RawParty {
    pub fn is_deleted(&self) -> bool {
        is_delete_marker(self.change_type.as_deref())
    }
}

/// One row of the SAM CPH holders extract (same party id domain as RawParty)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawHolder {
    #[serde(rename = "PARTY_ID")]
    pub party_id: Option<String>,
    #[serde(rename = "PERSON_TITLE")]
    pub title: Option<String>,
    #[serde(rename = "PERSON_GIVEN_NAME")]
    pub given_name: Option<String>,
    #[serde(rename = "PERSON_GIVEN_NAME2")]
    pub given_name2: Option<String>,
    #[serde(rename = "PERSON_FAMILY_NAME")]
    pub family_name: Option<String>,
    #[serde(rename = "ORGANISATION_NAME")]
    pub organisation_name: Option<String>,
    #[serde(rename = "TELEPHONE_NUMBER")]
    pub telephone_number: Option<String>,
    #[serde(rename = "MOBILE_NUMBER")]
    pub mobile_number: Option<String>,
    #[serde(rename = "INTERNET_EMAIL_ADDRESS")]
    pub email_address: Option<String>,

    #[serde(rename = "SAON_START_NUMBER")]
    pub saon_start_number: Option<i32>,
    #[serde(rename = "SAON_START_NUMBER_SUFFIX")]
    pub saon_start_number_suffix: Option<String>,
    #[serde(rename = "SAON_END_NUMBER")]
    pub saon_end_number: Option<i32>,
    #[serde(rename = "SAON_END_NUMBER_SUFFIX")]
    pub saon_end_number_suffix: Option<String>,
    #[serde(rename = "SAON_DESCRIPTION")]
    pub saon_description: Option<String>,
    #[serde(rename = "PAON_START_NUMBER")]
    pub paon_start_number: Option<i32>,
    #[serde(rename = "PAON_START_NUMBER_SUFFIX")]
    pub paon_start_number_suffix: Option<String>,
    #[serde(rename = "PAON_END_NUMBER")]
    pub paon_end_number: Option<i32>,
    #[serde(rename = "PAON_END_NUMBER_SUFFIX")]
    pub paon_end_number_suffix: Option<String>,
    #[serde(rename = "PAON_DESCRIPTION")]
    pub paon_description: Option<String>,
    #[serde(rename = "STREET")]
    pub street: Option<String>,
    #[serde(rename = "LOCALITY")]
    pub locality: Option<String>,
    #[serde(rename = "TOWN")]
    pub town: Option<String>,
    #[serde(rename = "POSTCODE")]
    pub postcode: Option<String>,
    #[serde(rename = "COUNTRY_CODE")]
    pub country_code: Option<String>,
    #[serde(rename = "UK_INTERNAL_CODE")]
    pub uk_internal_code: Option<String>,
    #[serde(rename = "UDPRN")]
    pub udprn: Option<String>,

    /// Comma-separated CPHs this party is registered holder of
    #[serde(rename = "CPHS")]
    pub cphs: Option<String>,

    #[serde(rename = "CHANGE_TYPE")]
    pub change_type: Option<String>,
    #[serde(rename = "UPDATED_AT")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl RawHolder {
    pub fn is_deleted(&self) -> bool {
        is_delete_marker(self.change_type.as_deref())
    }
}

// ============================================================================
// CSV LOADING
// ============================================================================

/// All raw rows of one import run
#[derive(Debug, Clone, Default)]
pub struct RawExtracts {
    pub holdings: Vec<RawHolding>,
    pub herds: Vec<RawHerd>,
    pub parties: Vec<RawParty>,
    pub holders: Vec<RawHolder>,
    pub reference_data_files: Vec<PathBuf>,
}

impl RawExtracts {
    pub fn row_count(&self) -> usize {
        self.holdings.len() + self.herds.len() + self.parties.len() + self.holders.len()
    }
}

/// Deserialize every row of one CSV extract
pub fn load_extract<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>> {
    let mut rdr = csv::ReaderBuilder::new()
        .trim(csv::Trim::Fields)
        .from_path(path)
        .with_context(|| format!("Failed to open extract {}", path.display()))?;

    let mut rows = Vec::new();
    for (index, result) in rdr.deserialize().enumerate() {
        let row: T = result.with_context(|| {
            format!("Failed to deserialize row {} of {}", index + 1, path.display())
        })?;
        rows.push(row);
    }

    Ok(rows)
}

/// Load every recognised extract in a directory; unrecognised files are ignored
pub fn load_directory(dir: &Path) -> Result<RawExtracts> {
    let mut extracts = RawExtracts::default();

    let mut paths: Vec<PathBuf> = std::fs::read_dir(dir)
        .with_context(|| format!("Failed to read extract directory {}", dir.display()))?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| p.is_file())
        .collect();
    paths.sort();

    for path in paths {
        let kind = match detect_extract(&path) {
            Ok(kind) => kind,
            Err(e) => {
                tracing::debug!(path = %path.display(), error = %e, "Skipping file");
                continue;
            }
        };

        match kind {
            ExtractKind::Holdings => extracts.holdings.extend(load_extract(&path)?),
            ExtractKind::Herds => extracts.herds.extend(load_extract(&path)?),
            ExtractKind::Parties => extracts.parties.extend(load_extract(&path)?),
            ExtractKind::Holders => extracts.holders.extend(load_extract(&path)?),
            ExtractKind::ReferenceData => extracts.reference_data_files.push(path),
        }
    }

    Ok(extracts)
}
