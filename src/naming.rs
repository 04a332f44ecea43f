//! Deterministic local filenames for upstream documents.
//!
//! Two schemes exist in the wild: the rich `agency_title_date_id.pdf` form and
//! the minimal `agency_id.pdf` form. Both end in the document id, which is what
//! [`infer_document_id`] relies on when rebuilding a ledger from disk.

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::ValidationError;
use crate::models::DocumentRecord;

static UNSAFE_CHARS: LazyLock<Regex> = LazyLock::new(|| Regex::new(r#"[<>:"/\\|?*]"#).unwrap());
static WHITESPACE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").unwrap());
static DATE_PREFIX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\d{4})[-/](\d{2})[-/](\d{2})").unwrap());
static TRAILING_ID: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"_([A-Za-z0-9]{15,18})$").unwrap());

const DEFAULT_EXTENSION: &str = "pdf";
const UNKNOWN_AGENCY: &str = "unknown";

/// Filename scheme for downloaded documents.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum FilenamePolicy {
    /// `agency_title_date_id.pdf`
    #[default]
    Rich,
    /// `agency_id.pdf`, agency lower-cased
    Minimal,
}

impl FilenamePolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Rich => "rich",
            Self::Minimal => "minimal",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "rich" => Some(Self::Rich),
            "minimal" => Some(Self::Minimal),
            _ => None,
        }
    }
}

/// Make a string safe for use as a filename component.
pub fn clean_component(value: &str) -> String {
    let replaced = UNSAFE_CHARS.replace_all(value, "_");
    let collapsed = WHITESPACE.replace_all(&replaced, "_");
    collapsed.trim_matches('_').to_string()
}

/// Agency component for the minimal scheme.
fn minimal_agency(agency: Option<&str>) -> String {
    let cleaned: String = clean_component(agency.unwrap_or_default())
        .to_lowercase()
        .chars()
        .filter(|c| !matches!(c, '\'' | '"' | '\u{2018}' | '\u{2019}' | '\u{201c}' | '\u{201d}'))
        .collect();
    let cleaned = cleaned.trim_matches('_');
    if cleaned.is_empty() {
        UNKNOWN_AGENCY.to_string()
    } else {
        cleaned.to_string()
    }
}

/// Render the leading date of `value` as `YYYY-MM-DD`.
///
/// Anything may follow the date (e.g. a time component).
pub fn normalize_date(value: &str) -> Result<String, ValidationError> {
    let value = value.trim();
    let caps = DATE_PREFIX
        .captures(value)
        .ok_or_else(|| ValidationError::InvalidDateFormat(value.to_string()))?;

    let month: u32 = caps[2]
        .parse()
        .map_err(|_| ValidationError::InvalidDateFormat(value.to_string()))?;
    if month > 12 {
        return Err(ValidationError::InvalidMonth {
            date: value.to_string(),
            month,
        });
    }

    Ok(format!("{}-{}-{}", &caps[1], &caps[2], &caps[3]))
}

/// Build the local filename for a document.
pub fn generate_filename(
    policy: FilenamePolicy,
    document_id: &str,
    agency: Option<&str>,
    title: Option<&str>,
    date: Option<&str>,
    extension: Option<&str>,
) -> Result<String, ValidationError> {
    let id = clean_component(document_id);
    if id.is_empty() {
        return Err(ValidationError::EmptyDocumentId);
    }

    let extension = extension
        .map(|e| e.trim().trim_start_matches('.'))
        .filter(|e| !e.is_empty())
        .unwrap_or(DEFAULT_EXTENSION);

    let stem = match policy {
        FilenamePolicy::Rich => {
            let mut parts = Vec::with_capacity(4);
            for part in [agency, title].into_iter().flatten() {
                let cleaned = clean_component(part);
                if !cleaned.is_empty() {
                    parts.push(cleaned);
                }
            }
            if let Some(date) = date.filter(|d| !d.trim().is_empty()) {
                parts.push(normalize_date(date)?);
            }
            parts.push(id);
            parts.join("_")
        }
        FilenamePolicy::Minimal => format!("{}_{}", minimal_agency(agency), id),
    };

    let suffix = format!(".{}", extension);
    if stem.to_lowercase().ends_with(&suffix.to_lowercase()) {
        Ok(stem)
    } else {
        Ok(format!("{}{}", stem, suffix))
    }
}

/// Build the filename for a ledger or listing record.
pub fn filename_for_record(
    policy: FilenamePolicy,
    record: &DocumentRecord,
) -> Result<String, ValidationError> {
    generate_filename(
        policy,
        record.document_id.as_deref().unwrap_or_default(),
        record.agency_name.as_deref(),
        record.title.as_deref(),
        record.created_date.as_deref(),
        None,
    )
}

/// Recover the document id embedded at the end of a `.pdf` filename.
pub fn infer_document_id(filename: &str) -> Option<String> {
    let (stem, ext) = filename.rsplit_once('.')?;
    if !ext.eq_ignore_ascii_case("pdf") {
        return None;
    }
    TRAILING_ID
        .captures(stem)
        .map(|caps| caps[1].to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    const ID: &str = "069cs0000104BR0AAM";

    #[test]
    fn test_rich_filename_contains_date_verbatim() {
        let name = generate_filename(
            FilenamePolicy::Rich,
            ID,
            Some("Glen's House"),
            Some("Special Investigation"),
            Some("2025-07-18T14:03:00.000Z"),
            None,
        )
        .unwrap();
        assert_eq!(
            name,
            "Glen's_House_Special_Investigation_2025-07-18_069cs0000104BR0AAM.pdf"
        );
        assert!(name.contains("2025-07-18"));
    }

    #[test]
    fn test_rich_filename_is_deterministic() {
        let make = || {
            generate_filename(
                FilenamePolicy::Rich,
                ID,
                Some("A/B: C"),
                Some("Title?"),
                Some("2025/01/02"),
                None,
            )
        };
        assert_eq!(make(), make());
        assert_eq!(make().unwrap(), "A_B__C_Title_2025-01-02_069cs0000104BR0AAM.pdf");
    }

    #[test]
    fn test_rich_filename_omits_missing_parts() {
        let name = generate_filename(FilenamePolicy::Rich, ID, None, Some("  "), None, None).unwrap();
        assert_eq!(name, "069cs0000104BR0AAM.pdf");
    }

    #[test]
    fn test_month_out_of_range_is_rejected() {
        let err = generate_filename(
            FilenamePolicy::Rich,
            ID,
            Some("Agency"),
            None,
            Some("2025-13-01"),
            None,
        )
        .unwrap_err();
        assert_eq!(
            err,
            ValidationError::InvalidMonth {
                date: "2025-13-01".to_string(),
                month: 13
            }
        );
    }

    #[test]
    fn test_non_conforming_date_is_rejected() {
        assert!(matches!(
            normalize_date("July 18, 2025"),
            Err(ValidationError::InvalidDateFormat(_))
        ));
        assert!(matches!(
            normalize_date("18-07-2025"),
            Err(ValidationError::InvalidDateFormat(_))
        ));
    }

    #[test]
    fn test_empty_id_is_rejected() {
        assert_eq!(
            generate_filename(FilenamePolicy::Minimal, "  ", None, None, None, None),
            Err(ValidationError::EmptyDocumentId)
        );
    }

    #[test]
    fn test_minimal_filename() {
        let name = generate_filename(
            FilenamePolicy::Minimal,
            ID,
            Some("Glen's House"),
            Some("ignored"),
            Some("not a date"),
            None,
        )
        .unwrap();
        assert_eq!(name, "glens_house_069cs0000104BR0AAM.pdf");

        let unknown = generate_filename(FilenamePolicy::Minimal, ID, None, None, None, None).unwrap();
        assert_eq!(unknown, "unknown_069cs0000104BR0AAM.pdf");
    }

    #[test]
    fn test_extension_is_not_doubled() {
        let name =
            generate_filename(FilenamePolicy::Rich, "abc.pdf", None, None, None, Some(".PDF")).unwrap();
        assert_eq!(name, "abc.pdf");
    }

    #[test]
    fn test_infer_document_id() {
        assert_eq!(
            infer_document_id("AGENCY_TITLE_2025-07-18_069cs0000104BR0AAM.pdf").as_deref(),
            Some(ID)
        );
        assert_eq!(
            infer_document_id("glens_house_069cs0000104BR0AAM.PDF").as_deref(),
            Some(ID)
        );
        assert_eq!(infer_document_id("report_short.pdf"), None);
        assert_eq!(infer_document_id("AGENCY_069cs0000104BR0AAM.txt"), None);
        assert_eq!(infer_document_id("069cs0000104BR0AAM.pdf"), None);
    }

    #[test]
    fn test_generated_names_round_trip_through_inference() {
        for policy in [FilenamePolicy::Rich, FilenamePolicy::Minimal] {
            let name = generate_filename(
                policy,
                ID,
                Some("Agency"),
                Some("Title"),
                Some("2024-02-03"),
                None,
            )
            .unwrap();
            assert_eq!(infer_document_id(&name).as_deref(), Some(ID));
        }
    }

    #[test]
    fn test_policy_parsing() {
        assert_eq!(FilenamePolicy::from_str("MINIMAL"), Some(FilenamePolicy::Minimal));
        assert_eq!(FilenamePolicy::from_str("other"), None);
        assert_eq!(FilenamePolicy::Rich.as_str(), "rich");
    }
}
