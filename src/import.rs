//! Student CSV import.
//!
//! Reads the student roster CSV into validated [`Student`] records. Required
//! columns are `student_id,name,degree_level,first_entry_date,graduation_date,status`;
//! `withdrawal_date` is optional. Column order does not matter.

use std::collections::HashMap;
use std::io::Read;

use chrono::NaiveDate;
use csv::{ReaderBuilder, StringRecord, Trim};

use crate::error::{EngineError, EngineResult};
use crate::models::{DegreeLevel, Student, StudentStatus};

/// Columns every import file must carry.
pub const REQUIRED_COLUMNS: [&str; 6] = [
    "student_id",
    "name",
    "degree_level",
    "first_entry_date",
    "graduation_date",
    "status",
];

/// Optional column holding the withdrawal date.
pub const WITHDRAWAL_COLUMN: &str = "withdrawal_date";

/// Reads and validates every student in a CSV document.
///
/// Blank rows are skipped. The first malformed row stops the import with an
/// `ImportError` naming the data row (1-based, header excluded); a row that
/// parses but breaks a student invariant yields `InvalidStudent`.
///
/// # Example
///
/// ```
/// use allowance_engine::import::read_students;
/// use allowance_engine::models::StudentStatus;
///
/// let csv = "student_id,name,degree_level,first_entry_date,graduation_date,status\n\
///            S001,Aisha,Bachelor,2024-09-10,,In-study\n";
/// let students = read_students(csv.as_bytes()).unwrap();
/// assert_eq!(students[0].status, StudentStatus::InStudy);
/// ```
pub fn read_students<R: Read>(reader: R) -> EngineResult<Vec<Student>> {
    let mut reader = ReaderBuilder::new()
        .has_headers(true)
        .trim(Trim::All)
        .from_reader(reader);

    let headers = reader.headers().map_err(|e| EngineError::ImportError {
        row: 0,
        message: format!("cannot read header: {}", e),
    })?;
    let columns: HashMap<String, usize> = headers
        .iter()
        .enumerate()
        .map(|(i, name)| (name.trim_start_matches('\u{feff}').to_string(), i))
        .collect();

    for required in REQUIRED_COLUMNS {
        if !columns.contains_key(required) {
            return Err(EngineError::ImportError {
                row: 0,
                message: format!("missing required column '{}'", required),
            });
        }
    }

    let mut students = Vec::new();
    let mut first_rows: HashMap<String, usize> = HashMap::new();
    for (index, result) in reader.records().enumerate() {
        let row = index + 1;
        let record = result.map_err(|e| EngineError::ImportError {
            row,
            message: e.to_string(),
        })?;
        if record.iter().all(str::is_empty) {
            continue;
        }

        let student = parse_row(&record, &columns, row)?;
        student.validate()?;
        if let Some(first_row) = first_rows.insert(student.student_id.clone(), row) {
            return Err(EngineError::ImportError {
                row,
                message: format!(
                    "student_id '{}' already appears in row {}",
                    student.student_id, first_row
                ),
            });
        }
        students.push(student);
    }

    Ok(students)
}

fn parse_row(record: &StringRecord, columns: &HashMap<String, usize>, row: usize) -> EngineResult<Student> {
    let field = |name: &str| column(record, columns, name);
    let import_error = |message: String| EngineError::ImportError { row, message };

    let degree_level: DegreeLevel = field("degree_level")
        .parse()
        .map_err(&import_error)?;
    let status: StudentStatus = field("status")
        .parse()
        .map_err(&import_error)?;

    let first_entry_date = parse_date(field("first_entry_date"))
        .map_err(&import_error)?
        .ok_or_else(|| import_error("first_entry_date is required".to_string()))?;

    Ok(Student {
        student_id: field("student_id").to_string(),
        name: field("name").to_string(),
        degree_level,
        first_entry_date,
        status,
        graduation_date: parse_date(field("graduation_date")).map_err(&import_error)?,
        withdrawal_date: parse_date(field(WITHDRAWAL_COLUMN)).map_err(&import_error)?,
    })
}

fn column<'r>(record: &'r StringRecord, columns: &HashMap<String, usize>, name: &str) -> &'r str {
    columns
        .get(name)
        .and_then(|&i| record.get(i))
        .unwrap_or("")
}

/// Parses `YYYY-MM-DD`, also accepting `/` or `.` as separators. Empty means absent.
fn parse_date(value: &str) -> Result<Option<NaiveDate>, String> {
    if value.is_empty() {
        return Ok(None);
    }
    let normalized = value.replace(['/', '.'], "-");
    NaiveDate::parse_from_str(&normalized, "%Y-%m-%d")
        .map(Some)
        .map_err(|e| format!("invalid date '{}': {}", value, e))
}
