//! Reading and writing the tabular (CSV) rule file.
//!
//! Reading only extracts raw cells; semantic checks live in
//! [`crate::validation`].

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;
use crate::rules::{columns, RuleRecord};

const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

/// One data row of a rule file, cells trimmed. A `None` cell means the row
/// was too short to contain that column.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawRuleRow {
    /// 1-based line number in the source file (the header is line 1).
    pub line: usize,
    pub rule_id: Option<String>,
    pub rule_type: Option<String>,
    pub rule_value: Option<String>,
    pub rule_duration: Option<String>,
    pub rule_description: Option<String>,
    pub rule_measurement: Option<String>,
}

/// Column positions resolved from the header row.
struct ColumnIndex {
    rule_id: usize,
    rule_type: usize,
    rule_value: usize,
    rule_duration: usize,
    rule_description: usize,
    rule_measurement: usize,
}

impl ColumnIndex {
    fn from_headers(headers: &csv::StringRecord) -> Result<Self, ValidationError> {
        let find = |name: &str| {
            headers
                .iter()
                .position(|h| h.trim() == name)
                .ok_or_else(|| ValidationError::InvalidFile(format!("missing column {name}")))
        };
        Ok(Self {
            rule_id: find(columns::RULE_ID)?,
            rule_type: find(columns::RULE_TYPE)?,
            rule_value: find(columns::RULE_VALUE)?,
            rule_duration: find(columns::RULE_DURATION)?,
            rule_description: find(columns::RULE_DESCRIPTION)?,
            rule_measurement: find(columns::RULE_MEASUREMENT)?,
        })
    }
}

/// Split a rule file into raw rows, in file order.
pub fn read_rule_file(content: &[u8]) -> Result<Vec<RawRuleRow>, ValidationError> {
    let content = content.strip_prefix(UTF8_BOM).unwrap_or(content);
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(content);

    let headers = reader.headers().map_err(file_error)?.clone();
    let index = ColumnIndex::from_headers(&headers)?;

    let mut rows = Vec::new();
    for (position, record) in reader.records().enumerate() {
        let record = record.map_err(file_error)?;
        let cell = |i: usize| record.get(i).map(str::to_string);
        rows.push(RawRuleRow {
            line: record
                .position()
                .map_or(position + 2, |p| p.line() as usize),
            rule_id: cell(index.rule_id),
            rule_type: cell(index.rule_type),
            rule_value: cell(index.rule_value),
            rule_duration: cell(index.rule_duration),
            rule_description: cell(index.rule_description),
            rule_measurement: cell(index.rule_measurement),
        });
    }
    Ok(rows)
}

/// Serialize rule records back to the tabular form, header first.
pub fn write_rule_file(records: &[RuleRecord]) -> Result<Vec<u8>, csv::Error> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record(columns::ALL)?;
    for record in records {
        let duration = record.rule_duration.to_string();
        writer.write_record([
            record.rule_id.as_str(),
            record.rule_type.as_str(),
            record.rule_value.as_str(),
            duration.as_str(),
            record.rule_description.as_str(),
            record.rule_measurement.as_str(),
        ])?;
    }
    writer
        .into_inner()
        .map_err(|e| csv::Error::from(e.into_error()))
}

fn file_error(err: csv::Error) -> ValidationError {
    match err.kind() {
        csv::ErrorKind::Utf8 { .. } => {
            ValidationError::InvalidFile("file is not UTF-8 encoded".to_string())
        }
        _ => ValidationError::InvalidFile(err.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    const HEADER: &str = "RuleId,RuleType,RuleValue,RuleDuration,RuleDescription,RuleMeasurement\n";

    #[test]
    fn reads_rows_with_line_numbers() {
        let file = format!("{HEADER}R1,ReuseRule,v,3,d,YEAR\n R2 , AccessRule ,w,unlimited,,DAY\n");
        let rows = read_rule_file(file.as_bytes()).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].line, 2);
        assert_eq!(rows[0].rule_id.as_deref(), Some("R1"));
        assert_eq!(rows[1].line, 3);
        assert_eq!(rows[1].rule_id.as_deref(), Some("R2"));
        assert_eq!(rows[1].rule_type.as_deref(), Some("AccessRule"));
        assert_eq!(rows[1].rule_description.as_deref(), Some(""));
    }

    #[test]
    fn columns_may_appear_in_any_order() {
        let file = "RuleMeasurement,RuleDescription,RuleDuration,RuleValue,RuleType,RuleId\nYEAR,d,3,v,ReuseRule,R1\n";
        let rows = read_rule_file(file.as_bytes()).unwrap();
        assert_eq!(rows[0].rule_id.as_deref(), Some("R1"));
        assert_eq!(rows[0].rule_measurement.as_deref(), Some("YEAR"));
    }

    #[test]
    fn missing_column_is_structural_error() {
        let file = "RuleId,RuleType,RuleValue,RuleDuration,RuleMeasurement\nR1,ReuseRule,v,3,YEAR\n";
        let err = read_rule_file(file.as_bytes()).unwrap_err();
        assert_matches!(err, ValidationError::InvalidFile(msg) if msg.contains("RuleDescription"));
    }

    #[test]
    fn short_row_yields_missing_cells() {
        let file = format!("{HEADER}R1,ReuseRule\n");
        let rows = read_rule_file(file.as_bytes()).unwrap();
        assert_eq!(rows[0].rule_value, None);
        assert_eq!(rows[0].rule_measurement, None);
    }

    #[test]
    fn non_utf8_content_is_rejected() {
        let mut file = HEADER.as_bytes().to_vec();
        file.extend_from_slice(b"R1,ReuseRule,\xff\xfe,3,d,YEAR\n");
        let err = read_rule_file(&file).unwrap_err();
        assert_matches!(err, ValidationError::InvalidFile(msg) if msg.contains("UTF-8"));
    }

    #[test]
    fn bom_is_ignored() {
        let mut file = UTF8_BOM.to_vec();
        file.extend_from_slice(HEADER.as_bytes());
        file.extend_from_slice(b"R1,ReuseRule,v,3,d,YEAR\n");
        let rows = read_rule_file(&file).unwrap();
        assert_eq!(rows[0].rule_id.as_deref(), Some("R1"));
    }

    #[test]
    fn empty_body_yields_no_rows() {
        assert!(read_rule_file(HEADER.as_bytes()).unwrap().is_empty());
    }
}
