// 🧹 Formatting helpers - pure string shaping used by the silver normalizer
//
// Every function here tolerates null/blank input: SAM extracts are nullable
// throughout and a missing segment is simply left out.

/// Separator between composite address segments
pub const ADDRESS_SEPARATOR: &str = ", ";

/// Separator inside a sub-unit / primary-unit number range ("12A-14")
pub const RANGE_SEPARATOR: &str = "-";

/// Separator inside composite reference codes ("AH-ABP", "CTT-BEEF")
pub const CODE_SEPARATOR: char = '-';

// ============================================================================
// NULL / BLANK HANDLING
// ============================================================================

pub fn is_blank(value: Option<&str>) -> bool {
    value.map_or(true, |v| v.trim().is_empty())
}

/// Trimmed value, or None when null/blank
pub fn non_blank(value: Option<&str>) -> Option<String> {
    match value {
        Some(v) if !v.trim().is_empty() => Some(v.trim().to_string()),
        _ => None,
    }
}

/// Split a comma-separated source list, dropping blanks and repeats (order kept)
pub fn split_list(value: Option<&str>) -> Vec<String> {
    let mut items: Vec<String> = Vec::new();
    if let Some(raw) = value {
        for item in raw.split(',') {
            let item = item.trim();
            if !item.is_empty() && !items.iter().any(|i| i == item) {
                items.push(item.to_string());
            }
        }
    }
    items
}

// ============================================================================
// IDENTIFIERS & CODES
// ============================================================================

/// Trim a CPHH ("12/345/6789/01") down to its CPH ("12/345/6789")
///
/// Inputs already in CPH form come back unchanged; null/blank becomes "".
pub fn cphh_to_cph(value: Option<&str>) -> String {
    let value = match value {
        Some(v) if !v.trim().is_empty() => v.trim(),
        _ => return String::new(),
    };

    let parts: Vec<&str> = value.split('/').collect();
    if parts.len() > 3 {
        parts[..3].join("/")
    } else {
        value.to_string()
    }
}

/// Business suffix of a composite code: "AH-ABP" → "ABP", "CTT-BEEF" → "BEEF"
///
/// Codes without a separator are used whole.
pub fn code_suffix(value: Option<&str>) -> Option<String> {
    let value = non_blank(value)?;
    let suffix = match value.rfind(CODE_SEPARATOR) {
        Some(pos) => value[pos + 1..].trim().to_string(),
        None => value,
    };

    if suffix.is_empty() {
        None
    } else {
        Some(suffix)
    }
}

/// Leading part of a composite code: "AH-ABP" → "AH"; None without a separator
pub fn code_prefix(value: Option<&str>) -> Option<String> {
    let value = non_blank(value)?;
    let pos = value.rfind(CODE_SEPARATOR)?;
    non_blank(Some(&value[..pos]))
}

// ============================================================================
// ADDRESSES
// ============================================================================

/// Sub-unit (SAON) and primary-unit (PAON) pieces of a BS7666-style address
#[derive(Debug, Clone, Default)]
pub struct AddressSegments<'a> {
    pub saon_start_number: Option<i32>,
    pub saon_start_suffix: Option<&'a str>,
    pub saon_end_number: Option<i32>,
    pub saon_end_suffix: Option<&'a str>,
    pub saon_description: Option<&'a str>,
    pub paon_start_number: Option<i32>,
    pub paon_start_suffix: Option<&'a str>,
    pub paon_end_number: Option<i32>,
    pub paon_end_suffix: Option<&'a str>,
    pub paon_description: Option<&'a str>,
}

/// "12A", "12-14", "12A-14B"; None when there is no start number
pub fn format_unit_range(
    start: Option<i32>,
    start_suffix: Option<&str>,
    end: Option<i32>,
    end_suffix: Option<&str>,
) -> Option<String> {
    let start = start?;
    let mut range = format!("{}{}", start, non_blank(start_suffix).unwrap_or_default());

    if let Some(end) = end {
        range.push_str(RANGE_SEPARATOR);
        range.push_str(&format!("{}{}", end, non_blank(end_suffix).unwrap_or_default()));
    }

    Some(range)
}

/// Composite first address line; empty segments are omitted
pub fn build_address_line(segments: &AddressSegments) -> Option<String> {
    let parts: Vec<String> = [
        format_unit_range(
            segments.saon_start_number,
            segments.saon_start_suffix,
            segments.saon_end_number,
            segments.saon_end_suffix,
        ),
        non_blank(segments.saon_description),
        format_unit_range(
            segments.paon_start_number,
            segments.paon_start_suffix,
            segments.paon_end_number,
            segments.paon_end_suffix,
        ),
        non_blank(segments.paon_description),
    ]
    .into_iter()
    .flatten()
    .collect();

    if parts.is_empty() {
        None
    } else {
        Some(parts.join(ADDRESS_SEPARATOR))
    }
}

// ============================================================================
// NAMES
// ============================================================================

/// Organisation name when present, else "Title Given Given2 Family"
pub fn party_display_name(
    title: Option<&str>,
    given_name: Option<&str>,
    given_name2: Option<&str>,
    family_name: Option<&str>,
    organisation_name: Option<&str>,
) -> Option<String> {
    if let Some(org) = non_blank(organisation_name) {
        return Some(org);
    }

    let parts: Vec<String> = [title, given_name, given_name2, family_name]
        .into_iter()
        .filter_map(non_blank)
        .collect();

    if parts.is_empty() {
        None
    } else {
        Some(parts.join(" "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cphh_to_cph() {
        assert_eq!(cphh_to_cph(Some("12/345/6789/01")), "12/345/6789");
        assert_eq!(cphh_to_cph(Some("12/345/6789")), "12/345/6789");
        assert_eq!(cphh_to_cph(Some(" 12/345/6789/01 ")), "12/345/6789");
        assert_eq!(cphh_to_cph(Some("   ")), "");
        assert_eq!(cphh_to_cph(None), "");
    }

    #[test]
    fn test_code_suffix() {
        assert_eq!(code_suffix(Some("AH-ABP")), Some("ABP".to_string()));
        assert_eq!(code_suffix(Some("CTT-BEEF")), Some("BEEF".to_string()));
        assert_eq!(code_suffix(Some("A-B-DAIRY")), Some("DAIRY".to_string()));
        assert_eq!(code_suffix(Some("MRK")), Some("MRK".to_string()));
        assert_eq!(code_suffix(Some("AH-")), None);
        assert_eq!(code_suffix(Some("")), None);
        assert_eq!(code_suffix(None), None);

        assert_eq!(code_prefix(Some("AH-ABP")), Some("AH".to_string()));
        assert_eq!(code_prefix(Some("MRK")), None);
        assert_eq!(code_prefix(Some("-ABP")), None);
    }

    #[test]
    fn test_split_list() {
        assert_eq!(
            split_list(Some("C100, C200,,C100 ,C300")),
            vec!["C100", "C200", "C300"]
        );
        assert!(split_list(Some(" , ")).is_empty());
        assert!(split_list(None).is_empty());
    }

    #[test]
    fn test_unit_range() {
        assert_eq!(format_unit_range(Some(12), Some("A"), None, None), Some("12A".to_string()));
        assert_eq!(format_unit_range(Some(12), None, Some(14), Some("B")), Some("12-14B".to_string()));
        assert_eq!(format_unit_range(None, Some("A"), Some(14), None), None);
    }

    #[test]
    fn test_address_line_omits_empty_segments() {
        let segments = AddressSegments {
            saon_start_number: Some(2),
            saon_start_suffix: Some("a"),
            saon_description: Some("  "),
            paon_start_number: Some(10),
            paon_end_number: Some(12),
            paon_description: Some("Rose Farm"),
            ..AddressSegments::default()
        };

        assert_eq!(
            build_address_line(&segments),
            Some("2a, 10-12, Rose Farm".to_string())
        );
        assert_eq!(build_address_line(&AddressSegments::default()), None);
    }

    #[test]
    fn test_party_display_name() {
        assert_eq!(
            party_display_name(Some("Mr"), Some("John"), None, Some("Smith"), None),
            Some("Mr John Smith".to_string())
        );
        assert_eq!(
            party_display_name(Some("Mr"), Some("John"), None, Some("Smith"), Some("Smith Farms Ltd")),
            Some("Smith Farms Ltd".to_string())
        );
        assert_eq!(party_display_name(None, Some(" "), None, None, Some("")), None);
    }
}
