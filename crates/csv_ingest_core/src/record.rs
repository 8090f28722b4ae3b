//! Delimited-text rows to table items.
//!
//! Columns are positionally contracted: whatever the source header says,
//! column 0 becomes the integer `ID` and column 3 becomes the `TIMESTAMP`
//! epoch parsed from a `day/month/year` date. Every other column passes
//! through as text under its header name.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use serde::Serialize;

use crate::contract::{
    DATE_FORMAT, FIELD_DELIMITER, ID_COLUMN, ID_FIELD, QUOTE_CHAR, TIMESTAMP_COLUMN,
    TIMESTAMP_FIELD,
};
use crate::error::IngestError;

const REQUIRED_COLUMNS: usize = TIMESTAMP_COLUMN + 1;

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(untagged)]
pub enum ItemValue {
    Number(i64),
    Text(String),
}

impl ItemValue {
    pub fn as_number(&self) -> Option<i64> {
        match self {
            Self::Number(value) => Some(*value),
            Self::Text(_) => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Number(_) => None,
            Self::Text(value) => Some(value),
        }
    }
}

/// One table item keyed by the remapped header names.
pub type Item = BTreeMap<String, ItemValue>;

/// Source header with the contracted positions renamed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Header {
    fields: Vec<String>,
}

impl Header {
    pub fn remap(mut fields: Vec<String>, line: usize) -> Result<Self, IngestError> {
        if fields.len() < REQUIRED_COLUMNS {
            return Err(IngestError::malformed_row(
                line,
                format!(
                    "header has {} columns, expected at least {REQUIRED_COLUMNS}",
                    fields.len()
                ),
            ));
        }
        fields[ID_COLUMN] = ID_FIELD.to_string();
        fields[TIMESTAMP_COLUMN] = TIMESTAMP_FIELD.to_string();
        Ok(Self { fields })
    }

    pub fn fields(&self) -> &[String] {
        &self.fields
    }
}

/// Converts one data row into an item.
///
/// Cells beyond the header and header names beyond the row are dropped; a
/// repeated header name keeps the value of its last column.
pub fn coerce_row(header: &Header, cells: &[&str], line: usize) -> Result<Item, IngestError> {
    if cells.len() < REQUIRED_COLUMNS {
        return Err(IngestError::malformed_row(
            line,
            format!(
                "row has {} columns, expected at least {REQUIRED_COLUMNS}",
                cells.len()
            ),
        ));
    }

    let id = cells[ID_COLUMN].trim().parse::<i64>().map_err(|error| {
        IngestError::malformed_row(
            line,
            format!("{ID_FIELD} value {:?} is not an integer: {error}", cells[ID_COLUMN]),
        )
    })?;
    let timestamp = epoch_seconds_from_date(cells[TIMESTAMP_COLUMN])
        .map_err(|reason| IngestError::malformed_row(line, reason))?;

    let mut item = Item::new();
    for (position, (name, cell)) in header.fields().iter().zip(cells).enumerate() {
        let value = match position {
            ID_COLUMN => ItemValue::Number(id),
            TIMESTAMP_COLUMN => ItemValue::Number(timestamp),
            _ => ItemValue::Text((*cell).to_string()),
        };
        item.insert(name.clone(), value);
    }
    Ok(item)
}

/// Unix seconds at UTC midnight of a `DD/MM/YYYY` date.
///
/// The year must be written with exactly four digits; `%Y` alone would read
/// `01/02/20` as the year 20.
pub fn epoch_seconds_from_date(text: &str) -> Result<i64, String> {
    let year = text.rsplit('/').next().unwrap_or_default();
    if year.len() != 4 || !year.bytes().all(|byte| byte.is_ascii_digit()) {
        return Err(format!(
            "{TIMESTAMP_FIELD} value {text:?} does not match {DATE_FORMAT}: year must have 4 digits"
        ));
    }
    let date = NaiveDate::parse_from_str(text, DATE_FORMAT).map_err(|error| {
        format!("{TIMESTAMP_FIELD} value {text:?} does not match {DATE_FORMAT}: {error}")
    })?;
    date.and_hms_opt(0, 0, 0)
        .map(|midnight| midnight.and_utc().timestamp())
        .ok_or_else(|| format!("{TIMESTAMP_FIELD} value {text:?} has no midnight"))
}

/// Streams items out of a `;`-delimited, `"`-quoted document.
///
/// The first record is the header. Each subsequent record yields either an
/// item or the error that aborts the document. A blank line outside a quoted
/// field is a row without columns and aborts the document where it appears.
pub struct RowReader<'a> {
    header: Header,
    records: csv::StringRecordsIntoIter<&'a [u8]>,
    blank_line: Option<usize>,
    finished: bool,
}

impl<'a> RowReader<'a> {
    pub fn new(text: &'a str) -> Result<Self, IngestError> {
        let mut records = csv::ReaderBuilder::new()
            .delimiter(FIELD_DELIMITER)
            .quote(QUOTE_CHAR)
            .has_headers(false)
            .flexible(true)
            .from_reader(text.as_bytes())
            .into_records();

        let first = records
            .next()
            .ok_or_else(|| IngestError::malformed_row(1, "document has no header row"))?
            .map_err(csv_error)?;

        let blank = first_blank_line(text);
        if let Some(BlankLine {
            line,
            after_content: false,
        }) = &blank
        {
            return Err(blank_line_error(*line));
        }

        let line = record_line(&first);
        let header = Header::remap(first.iter().map(str::to_string).collect(), line)?;

        Ok(Self {
            header,
            records,
            blank_line: blank.map(|blank| blank.line),
            finished: false,
        })
    }

    pub fn header(&self) -> &Header {
        &self.header
    }
}

impl Iterator for RowReader<'_> {
    type Item = Result<Item, IngestError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }
        // The csv reader skips blank lines; stop at the first one instead.
        let record = match self.records.next() {
            Some(Ok(record)) => record,
            Some(Err(error)) => return Some(Err(csv_error(error))),
            None => {
                self.finished = true;
                return self.blank_line.map(|line| Err(blank_line_error(line)));
            }
        };
        let line = record_line(&record);
        if let Some(blank) = self.blank_line.filter(|blank| line >= *blank) {
            self.finished = true;
            return Some(Err(blank_line_error(blank)));
        }

        let cells: Vec<&str> = record.iter().collect();
        Some(coerce_row(&self.header, &cells, line))
    }
}

struct BlankLine {
    line: usize,
    after_content: bool,
}

/// First empty line that does not sit inside a quoted field.
fn first_blank_line(text: &str) -> Option<BlankLine> {
    let mut in_quotes = false;
    let mut after_content = false;
    for (index, line) in text.split_inclusive('\n').enumerate() {
        let body = line.trim_end_matches(|c: char| c == '\r' || c == '\n');
        if body.is_empty() && !in_quotes {
            return Some(BlankLine {
                line: index + 1,
                after_content,
            });
        }
        after_content = true;
        if body.bytes().filter(|byte| *byte == QUOTE_CHAR).count() % 2 == 1 {
            in_quotes = !in_quotes;
        }
    }
    None
}

fn blank_line_error(line: usize) -> IngestError {
    IngestError::malformed_row(line, "blank line has no columns")
}

fn record_line(record: &csv::StringRecord) -> usize {
    record
        .position()
        .map(|position| position.line() as usize)
        .unwrap_or(0)
}

fn csv_error(error: csv::Error) -> IngestError {
    let line = error
        .position()
        .map(|position| position.line() as usize)
        .unwrap_or(0);
    IngestError::malformed_row(line, error.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn read_all(text: &str) -> Result<Vec<Item>, IngestError> {
        RowReader::new(text)?.collect()
    }

    #[test]
    fn transforms_documented_example_row() {
        let items = read_all("id;name;x;date\n101;Name;X;01/02/2020\n").expect("rows should parse");

        assert_eq!(items.len(), 1);
        let item = &items[0];
        assert_eq!(item.len(), 4);
        assert_eq!(item["ID"], ItemValue::Number(101));
        assert_eq!(item["TIMESTAMP"], ItemValue::Number(1_580_515_200));
        assert_eq!(item["name"].as_text(), Some("Name"));
        assert_eq!(item["x"].as_text(), Some("X"));
    }

    #[test]
    fn header_positions_are_renamed_whatever_they_say() {
        let reader = RowReader::new("\"código\";nome;valor;\"data de venda\";loja\r\n")
            .expect("header should parse");

        assert_eq!(
            reader.header().fields(),
            &["ID", "nome", "valor", "TIMESTAMP", "loja"]
        );
    }

    #[test]
    fn quoted_cells_may_contain_delimiters() {
        let items = read_all("a;b;c;d\n7;\"Smith; John\";\"\";31/12/1999\n")
            .expect("rows should parse");

        assert_eq!(items[0]["b"].as_text(), Some("Smith; John"));
        assert_eq!(items[0]["c"].as_text(), Some(""));
        assert_eq!(items[0]["TIMESTAMP"].as_number(), Some(946_598_400));
    }

    #[test]
    fn integer_identifier_tolerates_surrounding_whitespace() {
        let items = read_all("a;b;c;d\n 42 ;b;c;01/01/1970\n").expect("rows should parse");

        assert_eq!(items[0]["ID"].as_number(), Some(42));
        assert_eq!(items[0]["TIMESTAMP"].as_number(), Some(0));
    }

    #[test]
    fn blank_line_between_rows_aborts_document() {
        let mut reader = RowReader::new("a;b;c;d\n1;b;c;01/02/2020\n\n2;b;c;01/02/2020\n")
            .expect("header should parse");

        assert!(reader.next().expect("first row").is_ok());
        let error = reader
            .next()
            .expect("blank line")
            .expect_err("blank line should be rejected");
        assert_eq!(error, IngestError::malformed_row(3, "blank line has no columns"));
        assert!(reader.next().is_none());
    }

    #[test]
    fn trailing_blank_line_aborts_document() {
        let error = read_all("a;b;c;d\r\n1;b;c;01/01/2000\r\n\r\n")
            .expect_err("blank line should be rejected");
        assert_eq!(error, IngestError::malformed_row(3, "blank line has no columns"));
    }

    #[test]
    fn blank_line_before_header_aborts_document() {
        let error = RowReader::new("\na;b;c;d\n1;b;c;01/01/2000\n")
            .err()
            .expect("leading blank line should fail");
        assert_eq!(error, IngestError::malformed_row(1, "blank line has no columns"));
    }

    #[test]
    fn quoted_line_breaks_are_not_blank_lines() {
        let items = read_all("a;b;c;d\n1;\"first\n\nthird\";c;01/01/2000\n2;b;c;01/01/2000")
            .expect("rows should parse");

        assert_eq!(items.len(), 2);
        assert_eq!(items[0]["b"].as_text(), Some("first\n\nthird"));
    }

    #[test]
    fn short_rows_zip_against_header_and_long_rows_drop_extra_cells() {
        let items = read_all("a;b;c;d;e\n1;b;c;01/01/2000\n2;b;c;01/01/2000;e;extra\n")
            .expect("rows should parse");

        assert!(!items[0].contains_key("e"));
        assert_eq!(items[1]["e"].as_text(), Some("e"));
        assert_eq!(items[1].len(), 5);
    }

    #[test]
    fn non_integer_identifier_is_malformed_row() {
        let mut reader = RowReader::new("a;b;c;d\n1;b;c;01/01/2000\nabc;b;c;01/01/2000\n")
            .expect("header should parse");

        assert!(reader.next().expect("first row").is_ok());
        let error = reader
            .next()
            .expect("second row")
            .expect_err("identifier should be rejected");
        match error {
            IngestError::MalformedRow { line, reason } => {
                assert_eq!(line, 3);
                assert!(reason.contains("not an integer"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn date_in_other_format_is_malformed_row() {
        let error = read_all("a;b;c;d\n1;b;c;2020-02-01\n").expect_err("date should be rejected");
        assert_eq!(error.kind(), "malformed_row");
        assert!(error.to_string().contains("%d/%m/%Y"));
    }

    #[test]
    fn two_digit_year_is_malformed_row() {
        let error = read_all("a;b;c;d\n1;b;c;01/02/20\n").expect_err("short year should be rejected");
        assert_eq!(error.kind(), "malformed_row");
        assert!(error.to_string().contains("4 digits"));
        assert!(epoch_seconds_from_date("01/02/20200").is_err());
        assert_eq!(epoch_seconds_from_date("01/02/2020"), Ok(1_580_515_200));
    }

    #[test]
    fn row_without_date_column_is_malformed_row() {
        let error = read_all("a;b;c;d\n1;b;c\n").expect_err("short row should be rejected");
        assert_eq!(error, IngestError::malformed_row(2, "row has 3 columns, expected at least 4"));
    }

    #[test]
    fn empty_document_has_no_header() {
        let error = RowReader::new("").err().expect("empty document should fail");
        assert_eq!(error, IngestError::malformed_row(1, "document has no header row"));
    }

    #[test]
    fn narrow_header_is_rejected() {
        let error = RowReader::new("a;b;c\n").err().expect("narrow header should fail");
        assert_eq!(error.kind(), "malformed_row");
    }

    #[test]
    fn items_serialize_with_native_json_types() {
        let items = read_all("id;name;x;date\n101;Name;X;01/02/2020\n").expect("rows should parse");
        let json = serde_json::to_value(&items[0]).expect("item should serialize");

        assert_eq!(
            json,
            serde_json::json!({"ID": 101, "TIMESTAMP": 1580515200, "name": "Name", "x": "X"})
        );
    }
}
