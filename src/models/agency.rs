//! Discovery listing rows: agencies and their document listings.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::document::{columns, DocumentRecord};

/// Agency CSV columns, in output order.
pub const AGENCY_COLUMNS: [&str; 13] = [
    "Address",
    "agencyId",
    "AgencyName",
    "AgencyType",
    "City",
    "County",
    "LicenseEffectiveDate",
    "LicenseeGroupOrganizationName",
    "LicenseExpirationDate",
    "LicenseNumber",
    "LicenseStatus",
    "Phone",
    "ZipCode",
];

/// One agency as returned by the upstream agency listing.
///
/// The raw JSON object is kept as-is so that the pretty-printed dump and the
/// CSV both reflect exactly what the upstream sent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Agency {
    raw: Value,
}

impl Agency {
    pub fn from_json(raw: Value) -> Self {
        Self { raw }
    }

    pub fn raw(&self) -> &Value {
        &self.raw
    }

    /// Field as text; `null` and missing fields are empty.
    pub fn field(&self, name: &str) -> String {
        self.raw.get(name).map(json_text).unwrap_or_default()
    }

    /// Agency id, if present and non-blank.
    pub fn agency_id(&self) -> Option<String> {
        let id = self.field("agencyId");
        let id = id.trim();
        (!id.is_empty()).then(|| id.to_string())
    }

    pub fn name(&self) -> String {
        self.field("AgencyName")
    }

    /// Values for [`AGENCY_COLUMNS`], in order.
    pub fn csv_row(&self) -> Vec<String> {
        AGENCY_COLUMNS.iter().map(|c| self.field(c)).collect()
    }
}

/// Combined listing CSV columns, in output order.
pub const LISTING_COLUMNS: [&str; 9] = [
    "agency_name",
    "agency_id",
    "FileExtension",
    "CreatedDate",
    "Title",
    "ContentBodyId",
    "Id",
    "ContentDocumentId",
    "generated_filename",
];

/// One document row from an agency's content listing.
///
/// Deserializes from both the combined CSV and the per-agency CSV, which
/// lacks the `agency_name` and `generated_filename` columns.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DocumentListing {
    pub agency_name: String,
    pub agency_id: String,
    #[serde(rename = "FileExtension")]
    pub file_extension: String,
    #[serde(rename = "CreatedDate")]
    pub created_date: String,
    #[serde(rename = "Title")]
    pub title: String,
    #[serde(rename = "ContentBodyId")]
    pub content_body_id: String,
    #[serde(rename = "Id")]
    pub id: String,
    #[serde(rename = "ContentDocumentId")]
    pub content_document_id: String,
    pub generated_filename: String,
}

impl DocumentListing {
    /// Build a listing from one `contentVersionRes` entry.
    pub fn from_json(agency_id: &str, agency_name: &str, entry: &Value) -> Self {
        let text = |key: &str| entry.get(key).map(json_text).unwrap_or_default();
        Self {
            agency_name: agency_name.to_string(),
            agency_id: agency_id.to_string(),
            file_extension: text("FileExtension"),
            created_date: text("CreatedDate"),
            title: text("Title"),
            content_body_id: text("ContentBodyId"),
            id: text("Id"),
            content_document_id: text("ContentDocumentId"),
            generated_filename: String::new(),
        }
    }

    /// Values for [`LISTING_COLUMNS`], in order.
    pub fn csv_row(&self) -> Vec<String> {
        vec![
            self.agency_name.clone(),
            self.agency_id.clone(),
            self.file_extension.clone(),
            self.created_date.clone(),
            self.title.clone(),
            self.content_body_id.clone(),
            self.id.clone(),
            self.content_document_id.clone(),
            self.generated_filename.clone(),
        ]
    }

    /// Convert to a ledger record, keeping `Id` and `ContentBodyId` as extra columns.
    pub fn to_record(&self) -> DocumentRecord {
        DocumentRecord::from_fields([
            (columns::AGENCY_NAME, self.agency_name.as_str()),
            (columns::AGENCY_ID, self.agency_id.as_str()),
            (columns::FILE_EXTENSION, self.file_extension.as_str()),
            (columns::CREATED_DATE, self.created_date.as_str()),
            (columns::TITLE, self.title.as_str()),
            ("ContentBodyId", self.content_body_id.as_str()),
            ("Id", self.id.as_str()),
            (columns::DOCUMENT_ID, self.content_document_id.as_str()),
            (columns::GENERATED_FILENAME, self.generated_filename.as_str()),
        ])
    }
}

/// Render a JSON scalar the way a CSV cell expects it.
fn json_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_agency_fields() {
        let agency = Agency::from_json(json!({
            "agencyId": "A123",
            "AgencyName": "Glen's House",
            "ZipCode": 48201,
            "Phone": null
        }));

        assert_eq!(agency.agency_id().as_deref(), Some("A123"));
        assert_eq!(agency.name(), "Glen's House");
        let row = agency.csv_row();
        assert_eq!(row.len(), AGENCY_COLUMNS.len());
        assert_eq!(row[1], "A123");
        assert_eq!(row[11], "");
        assert_eq!(row[12], "48201");
    }

    #[test]
    fn test_blank_agency_id_is_none() {
        let agency = Agency::from_json(json!({"agencyId": "  "}));
        assert!(agency.agency_id().is_none());
    }

    #[test]
    fn test_listing_to_record() {
        let listing = DocumentListing::from_json(
            "A1",
            "Agency",
            &json!({
                "FileExtension": "pdf",
                "CreatedDate": "2025-07-18T10:00:00.000Z",
                "Title": "Inspection",
                "ContentBodyId": "05Txx",
                "Id": "068xx",
                "ContentDocumentId": "069cs0000104BR0AAM"
            }),
        );
        let record = listing.to_record();

        assert_eq!(record.document_id.as_deref(), Some("069cs0000104BR0AAM"));
        assert_eq!(record.extra.get("Id").map(String::as_str), Some("068xx"));
        assert_eq!(record.generated_filename, None);
    }
}
