use chrono::NaiveDate;
use rust_decimal::Decimal;
use sqlparser::ast::{
    self, Expr, FromTable, ObjectNamePart, SetExpr, Statement, TableFactor, TableObject, Value,
    ValueWithSpan,
};
use sqlparser::dialect::PostgreSqlDialect;
use sqlparser::parser::Parser;
use ulid::Ulid;

use crate::model::StatusTable;

/// One VALUES row of `INSERT INTO bookings`.
#[derive(Debug, PartialEq)]
pub struct BookingRow {
    pub id: Ulid,
    pub car_id: Ulid,
    pub user_name: String,
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub status: Option<u32>,
}

/// Parsed command from SQL input.
#[derive(Debug, PartialEq)]
pub enum Command {
    InsertCar {
        id: Ulid,
        brand: String,
        model: String,
        year: i32,
        price_per_day: Decimal,
        status: Option<u32>,
    },
    UpdateCar {
        id: Ulid,
        brand: Option<String>,
        model: Option<String>,
        year: Option<i32>,
        price_per_day: Option<Decimal>,
        status: Option<u32>,
        version: Option<u64>,
    },
    DeleteCar {
        id: Ulid,
    },
    InsertBooking {
        row: BookingRow,
    },
    BatchInsertBookings {
        rows: Vec<BookingRow>,
    },
    UpdateBooking {
        id: Ulid,
        car_id: Option<Ulid>,
        user_name: Option<String>,
        start: Option<NaiveDate>,
        end: Option<NaiveDate>,
        status: Option<u32>,
        version: Option<u64>,
    },
    DeleteBooking {
        id: Ulid,
    },
    InsertReview {
        id: Ulid,
        user_name: String,
        comment: String,
    },
    UpdateReview {
        id: Ulid,
        user_name: Option<String>,
        comment: Option<String>,
        version: Option<u64>,
    },
    DeleteReview {
        id: Ulid,
    },
    InsertStatusType {
        table: StatusTable,
        code: u32,
        name: String,
        display_name: String,
    },
    SelectCars {
        id: Option<Ulid>,
    },
    SelectBookings {
        id: Option<Ulid>,
        car_id: Option<Ulid>,
    },
    SelectReviews {
        id: Option<Ulid>,
    },
    SelectStatusTypes {
        table: StatusTable,
    },
    SelectAvailability {
        car_id: Ulid,
        start: NaiveDate,
        end: NaiveDate,
        min_days: Option<i64>,
    },
}

pub fn parse_sql(sql: &str) -> Result<Command, SqlError> {
    let dialect = PostgreSqlDialect {};
    let stmts = Parser::parse_sql(&dialect, sql).map_err(|e| SqlError::Parse(e.to_string()))?;
    if stmts.is_empty() {
        return Err(SqlError::Empty);
    }

    match &stmts[0] {
        Statement::Insert(insert) => parse_insert(insert),
        Statement::Update {
            table,
            assignments,
            selection,
            ..
        } => parse_update(table, assignments, selection),
        Statement::Delete(delete) => parse_delete(delete),
        Statement::Query(query) => parse_select(query),
        other => Err(SqlError::Unsupported(format!("{other}"))),
    }
}

fn parse_insert(insert: &ast::Insert) -> Result<Command, SqlError> {
    let table = insert_table_name(insert)?;

    match table.as_str() {
        "cars" => {
            let values = extract_insert_values(insert)?;
            if values.len() < 5 {
                return Err(SqlError::WrongArity("cars", 5, values.len()));
            }
            Ok(Command::InsertCar {
                id: parse_ulid(&values[0])?,
                brand: parse_string(&values[1])?,
                model: parse_string(&values[2])?,
                year: parse_i32(&values[3])?,
                price_per_day: parse_decimal(&values[4])?,
                status: if values.len() >= 6 {
                    parse_u32_or_null(&values[5])?
                } else {
                    None
                },
            })
        }
        "bookings" => {
            let all_rows = extract_all_insert_rows(insert)?;
            let mut rows = Vec::with_capacity(all_rows.len());
            for (i, row) in all_rows.iter().enumerate() {
                if row.len() < 5 {
                    return Err(SqlError::WrongArity("bookings", 5, row.len()));
                }
                let parsed = parse_booking_row(row)
                    .map_err(|e| SqlError::Parse(format!("row {i}: {e}")))?;
                rows.push(parsed);
            }
            if rows.len() == 1 {
                let row = rows.pop().ok_or_else(|| SqlError::Parse("empty VALUES".into()))?;
                Ok(Command::InsertBooking { row })
            } else {
                Ok(Command::BatchInsertBookings { rows })
            }
        }
        "reviews" => {
            let values = extract_insert_values(insert)?;
            if values.len() < 3 {
                return Err(SqlError::WrongArity("reviews", 3, values.len()));
            }
            Ok(Command::InsertReview {
                id: parse_ulid(&values[0])?,
                user_name: parse_string(&values[1])?,
                comment: parse_string(&values[2])?,
            })
        }
        "car_status_types" | "booking_status_types" => {
            let values = extract_insert_values(insert)?;
            if values.len() < 3 {
                return Err(SqlError::WrongArity("status types", 3, values.len()));
            }
            Ok(Command::InsertStatusType {
                table: status_table(&table),
                code: parse_u32(&values[0])?,
                name: parse_string(&values[1])?,
                display_name: parse_string(&values[2])?,
            })
        }
        _ => Err(SqlError::UnknownTable(table)),
    }
}

fn parse_booking_row(row: &[Expr]) -> Result<BookingRow, SqlError> {
    Ok(BookingRow {
        id: parse_ulid(&row[0])?,
        car_id: parse_ulid(&row[1])?,
        user_name: parse_string(&row[2])?,
        start: parse_date(&row[3])?,
        end: parse_date(&row[4])?,
        status: if row.len() >= 6 {
            parse_u32_or_null(&row[5])?
        } else {
            None
        },
    })
}

fn parse_update(
    table: &ast::TableWithJoins,
    assignments: &[ast::Assignment],
    selection: &Option<Expr>,
) -> Result<Command, SqlError> {
    let table = table_factor_name(&table.relation)?;
    let (id, version) = extract_where_id_version(selection)?;

    match table.as_str() {
        "cars" => {
            let mut brand = None;
            let mut model = None;
            let mut year = None;
            let mut price_per_day = None;
            let mut status = None;
            for assign in assignments {
                match assignment_column(assign)?.as_str() {
                    "brand" => brand = Some(parse_string(&assign.value)?),
                    "model" => model = Some(parse_string(&assign.value)?),
                    "year" => year = Some(parse_i32(&assign.value)?),
                    "price_per_day" => price_per_day = Some(parse_decimal(&assign.value)?),
                    "status_id" => status = Some(parse_u32(&assign.value)?),
                    other => return Err(SqlError::UnknownColumn(other.to_string())),
                }
            }
            Ok(Command::UpdateCar {
                id,
                brand,
                model,
                year,
                price_per_day,
                status,
                version,
            })
        }
        "bookings" => {
            let mut car_id = None;
            let mut user_name = None;
            let mut start = None;
            let mut end = None;
            let mut status = None;
            for assign in assignments {
                match assignment_column(assign)?.as_str() {
                    "car_id" => car_id = Some(parse_ulid(&assign.value)?),
                    "user_name" => user_name = Some(parse_string(&assign.value)?),
                    "start_date" => start = Some(parse_date(&assign.value)?),
                    "end_date" => end = Some(parse_date(&assign.value)?),
                    "status_id" => status = Some(parse_u32(&assign.value)?),
                    other => return Err(SqlError::UnknownColumn(other.to_string())),
                }
            }
            Ok(Command::UpdateBooking {
                id,
                car_id,
                user_name,
                start,
                end,
                status,
                version,
            })
        }
        "reviews" => {
            let mut user_name = None;
            let mut comment = None;
            for assign in assignments {
                match assignment_column(assign)?.as_str() {
                    "user_name" => user_name = Some(parse_string(&assign.value)?),
                    "comment" => comment = Some(parse_string(&assign.value)?),
                    other => return Err(SqlError::UnknownColumn(other.to_string())),
                }
            }
            Ok(Command::UpdateReview {
                id,
                user_name,
                comment,
                version,
            })
        }
        _ => Err(SqlError::UnknownTable(table)),
    }
}

fn parse_delete(delete: &ast::Delete) -> Result<Command, SqlError> {
    let table = delete_table_name(delete)?;
    let (id, _) = extract_where_id_version(&delete.selection)?;

    match table.as_str() {
        "cars" => Ok(Command::DeleteCar { id }),
        "bookings" => Ok(Command::DeleteBooking { id }),
        "reviews" => Ok(Command::DeleteReview { id }),
        _ => Err(SqlError::UnknownTable(table)),
    }
}

fn parse_select(query: &ast::Query) -> Result<Command, SqlError> {
    let select = match query.body.as_ref() {
        SetExpr::Select(s) => s,
        _ => return Err(SqlError::Unsupported("non-SELECT query".into())),
    };

    if select.from.is_empty() {
        return Err(SqlError::Parse("SELECT without FROM".into()));
    }
    let table = table_factor_name(&select.from[0].relation)?;

    match table.as_str() {
        "cars" => {
            let id = extract_optional_id(&select.selection, "id")?;
            Ok(Command::SelectCars { id })
        }
        "bookings" => {
            let id = extract_optional_id(&select.selection, "id")?;
            let car_id = extract_optional_id(&select.selection, "car_id")?;
            Ok(Command::SelectBookings { id, car_id })
        }
        "reviews" => {
            let id = extract_optional_id(&select.selection, "id")?;
            Ok(Command::SelectReviews { id })
        }
        "car_status_types" | "booking_status_types" => Ok(Command::SelectStatusTypes {
            table: status_table(&table),
        }),
        "availability" => {
            let (mut car_id, mut start, mut end, mut min_days) = (None, None, None, None);
            if let Some(selection) = &select.selection {
                extract_availability_filters(
                    selection,
                    &mut car_id,
                    &mut start,
                    &mut end,
                    &mut min_days,
                )?;
            }
            Ok(Command::SelectAvailability {
                car_id: car_id.ok_or(SqlError::MissingFilter("car_id"))?,
                start: start.ok_or(SqlError::MissingFilter("start_date"))?,
                end: end.ok_or(SqlError::MissingFilter("end_date"))?,
                min_days,
            })
        }
        _ => Err(SqlError::UnknownTable(table)),
    }
}

fn extract_availability_filters(
    expr: &Expr,
    car_id: &mut Option<Ulid>,
    start: &mut Option<NaiveDate>,
    end: &mut Option<NaiveDate>,
    min_days: &mut Option<i64>,
) -> Result<(), SqlError> {
    if let Expr::BinaryOp { left, op, right } = expr {
        match op {
            ast::BinaryOperator::And => {
                extract_availability_filters(left, car_id, start, end, min_days)?;
                extract_availability_filters(right, car_id, start, end, min_days)?;
            }
            ast::BinaryOperator::Eq => {
                let col = expr_column_name(left);
                if col.as_deref() == Some("car_id") {
                    *car_id = Some(parse_ulid(right)?);
                } else if col.as_deref() == Some("min_days") {
                    *min_days = Some(parse_i64(right)?);
                }
            }
            ast::BinaryOperator::GtEq => {
                if expr_column_name(left).as_deref() == Some("start_date") {
                    *start = Some(parse_date(right)?);
                }
            }
            ast::BinaryOperator::LtEq => {
                if expr_column_name(left).as_deref() == Some("end_date") {
                    *end = Some(parse_date(right)?);
                }
            }
            _ => {}
        }
    }
    Ok(())
}

// ── Helpers ───────────────────────────────────────────────────

fn status_table(name: &str) -> StatusTable {
    if name == "car_status_types" {
        StatusTable::Car
    } else {
        StatusTable::Booking
    }
}

fn object_name_last(name: &ast::ObjectName) -> Option<String> {
    name.0.last().and_then(|part| match part {
        ObjectNamePart::Identifier(ident) => Some(ident.value.to_lowercase()),
        _ => None,
    })
}

fn insert_table_name(insert: &ast::Insert) -> Result<String, SqlError> {
    match &insert.table {
        TableObject::TableName(name) => {
            object_name_last(name).ok_or_else(|| SqlError::Parse("empty table name".into()))
        }
        _ => Err(SqlError::Parse("unsupported table object in INSERT".into())),
    }
}

fn delete_table_name(delete: &ast::Delete) -> Result<String, SqlError> {
    let tables_with_joins = match &delete.from {
        FromTable::WithFromKeyword(t) | FromTable::WithoutKeyword(t) => t,
    };
    if let Some(first) = tables_with_joins.first() {
        table_factor_name(&first.relation)
    } else {
        Err(SqlError::Parse("DELETE without table".into()))
    }
}

fn table_factor_name(tf: &TableFactor) -> Result<String, SqlError> {
    match tf {
        TableFactor::Table { name, .. } => {
            object_name_last(name).ok_or_else(|| SqlError::Parse("empty table name".into()))
        }
        _ => Err(SqlError::Parse("complex table expression".into())),
    }
}

fn assignment_column(assign: &ast::Assignment) -> Result<String, SqlError> {
    match &assign.target {
        ast::AssignmentTarget::ColumnName(name) => {
            object_name_last(name).ok_or_else(|| SqlError::Parse("empty column name".into()))
        }
        _ => Err(SqlError::Parse("unsupported assignment target".into())),
    }
}

fn extract_insert_values(insert: &ast::Insert) -> Result<Vec<Expr>, SqlError> {
    let body = insert
        .source
        .as_ref()
        .ok_or(SqlError::Parse("no VALUES".into()))?;
    match body.body.as_ref() {
        SetExpr::Values(values) => {
            if values.rows.is_empty() {
                return Err(SqlError::Parse("empty VALUES".into()));
            }
            Ok(values.rows[0].clone())
        }
        _ => Err(SqlError::Parse("expected VALUES".into())),
    }
}

fn extract_all_insert_rows(insert: &ast::Insert) -> Result<Vec<Vec<Expr>>, SqlError> {
    let body = insert
        .source
        .as_ref()
        .ok_or(SqlError::Parse("no VALUES".into()))?;
    match body.body.as_ref() {
        SetExpr::Values(values) => {
            if values.rows.is_empty() {
                return Err(SqlError::Parse("empty VALUES".into()));
            }
            Ok(values.rows.clone())
        }
        _ => Err(SqlError::Parse("expected VALUES".into())),
    }
}

/// Extract `id = '<ulid>'` (required) and `version = n` (optional) from a
/// WHERE conjunction.
fn extract_where_id_version(
    selection: &Option<Expr>,
) -> Result<(Ulid, Option<u64>), SqlError> {
    let sel = selection.as_ref().ok_or(SqlError::MissingFilter("id"))?;
    let mut id = None;
    let mut version = None;
    collect_id_version(sel, &mut id, &mut version)?;
    Ok((id.ok_or(SqlError::MissingFilter("id"))?, version))
}

fn collect_id_version(
    expr: &Expr,
    id: &mut Option<Ulid>,
    version: &mut Option<u64>,
) -> Result<(), SqlError> {
    match expr {
        Expr::BinaryOp {
            left,
            op: ast::BinaryOperator::And,
            right,
        } => {
            collect_id_version(left, id, version)?;
            collect_id_version(right, id, version)?;
        }
        Expr::BinaryOp {
            left,
            op: ast::BinaryOperator::Eq,
            right,
        } => match expr_column_name(left).as_deref() {
            Some("id") => *id = Some(parse_ulid(right)?),
            Some("version") => *version = Some(parse_u64(right)?),
            _ => {}
        },
        _ => {}
    }
    Ok(())
}

fn extract_optional_id(selection: &Option<Expr>, column: &str) -> Result<Option<Ulid>, SqlError> {
    let Some(sel) = selection else {
        return Ok(None);
    };
    match sel {
        Expr::BinaryOp {
            left,
            op: ast::BinaryOperator::Eq,
            right,
        } => {
            if expr_column_name(left).as_deref() == Some(column) {
                Ok(Some(parse_ulid(right)?))
            } else {
                Ok(None)
            }
        }
        _ => Ok(None),
    }
}

fn expr_column_name(expr: &Expr) -> Option<String> {
    match expr {
        Expr::Identifier(ident) => Some(ident.value.to_lowercase()),
        Expr::CompoundIdentifier(parts) => parts.last().map(|i| i.value.to_lowercase()),
        _ => None,
    }
}

fn extract_value(expr: &Expr) -> Option<&Value> {
    match expr {
        Expr::Value(ValueWithSpan { value, .. }) => Some(value),
        _ => None,
    }
}

fn parse_ulid(expr: &Expr) -> Result<Ulid, SqlError> {
    if let Some(value) = extract_value(expr) {
        match value {
            Value::SingleQuotedString(s) | Value::Number(s, _) => {
                Ulid::from_string(s).map_err(|e| SqlError::Parse(format!("bad ULID: {e}")))
            }
            _ => Err(SqlError::Parse(format!("expected string, got {value:?}"))),
        }
    } else {
        Err(SqlError::Parse(format!("expected value, got {expr:?}")))
    }
}

fn parse_string(expr: &Expr) -> Result<String, SqlError> {
    if let Some(value) = extract_value(expr) {
        match value {
            Value::SingleQuotedString(s) => Ok(s.clone()),
            _ => Err(SqlError::Parse(format!("expected string, got {value:?}"))),
        }
    } else {
        Err(SqlError::Parse(format!("expected value, got {expr:?}")))
    }
}

fn parse_date(expr: &Expr) -> Result<NaiveDate, SqlError> {
    let s = parse_string(expr)?;
    s.parse()
        .map_err(|e| SqlError::Parse(format!("bad date '{s}': {e}")))
}

fn parse_decimal(expr: &Expr) -> Result<Decimal, SqlError> {
    if let Some(value) = extract_value(expr) {
        match value {
            Value::Number(s, _) | Value::SingleQuotedString(s) => s
                .parse()
                .map_err(|e| SqlError::Parse(format!("bad decimal: {e}"))),
            _ => Err(SqlError::Parse(format!("expected number, got {value:?}"))),
        }
    } else {
        Err(SqlError::Parse(format!("expected value, got {expr:?}")))
    }
}

fn parse_i64(expr: &Expr) -> Result<i64, SqlError> {
    if let Some(value) = extract_value(expr) {
        match value {
            Value::Number(s, _) => s
                .parse()
                .map_err(|e| SqlError::Parse(format!("bad i64: {e}"))),
            Value::SingleQuotedString(s) => s
                .parse()
                .map_err(|e| SqlError::Parse(format!("bad i64: {e}"))),
            _ => Err(SqlError::Parse(format!("expected number, got {value:?}"))),
        }
    } else if let Expr::UnaryOp {
        op: ast::UnaryOperator::Minus,
        expr,
    } = expr
    {
        Ok(-parse_i64(expr)?)
    } else {
        Err(SqlError::Parse(format!("expected value, got {expr:?}")))
    }
}

fn parse_i32(expr: &Expr) -> Result<i32, SqlError> {
    let v = parse_i64(expr)?;
    i32::try_from(v).map_err(|_| SqlError::Parse(format!("{v} out of i32 range")))
}

fn parse_u32(expr: &Expr) -> Result<u32, SqlError> {
    let v = parse_i64(expr)?;
    u32::try_from(v).map_err(|_| SqlError::Parse(format!("{v} out of u32 range")))
}

fn parse_u64(expr: &Expr) -> Result<u64, SqlError> {
    let v = parse_i64(expr)?;
    u64::try_from(v).map_err(|_| SqlError::Parse(format!("{v} out of u64 range")))
}

fn parse_u32_or_null(expr: &Expr) -> Result<Option<u32>, SqlError> {
    if let Some(Value::Null) = extract_value(expr) {
        Ok(None)
    } else {
        Ok(Some(parse_u32(expr)?))
    }
}

// ── Errors ────────────────────────────────────────────────────

#[derive(Debug)]
pub enum SqlError {
    Parse(String),
    Empty,
    Unsupported(String),
    UnknownTable(String),
    UnknownColumn(String),
    WrongArity(&'static str, usize, usize),
    MissingFilter(&'static str),
}

impl std::fmt::Display for SqlError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SqlError::Parse(s) => write!(f, "parse error: {s}"),
            SqlError::Empty => write!(f, "empty query"),
            SqlError::Unsupported(s) => write!(f, "unsupported: {s}"),
            SqlError::UnknownTable(t) => write!(f, "unknown table: {t}"),
            SqlError::UnknownColumn(c) => write!(f, "unknown column: {c}"),
            SqlError::WrongArity(t, expected, got) => {
                write!(f, "{t}: expected {expected} values, got {got}")
            }
            SqlError::MissingFilter(col) => write!(f, "missing filter: {col}"),
        }
    }
}

impl std::error::Error for SqlError {}

#[cfg(test)]
mod tests {
    use super::*;

    const U1: &str = "01ARZ3NDEKTSV4RRFFQ69G5FAV";
    const U2: &str = "01BX5ZZKBKACTAV9WEVGEMMVRZ";

    #[test]
    fn parse_insert_car() {
        let sql = format!(
            "INSERT INTO cars (id, brand, model, year, price_per_day) VALUES ('{U1}', 'Toyota', 'Corolla', 2020, 39.99)"
        );
        let cmd = parse_sql(&sql).unwrap();
        match cmd {
            Command::InsertCar {
                id,
                brand,
                model,
                year,
                price_per_day,
                status,
            } => {
                assert_eq!(id.to_string(), U1);
                assert_eq!(brand, "Toyota");
                assert_eq!(model, "Corolla");
                assert_eq!(year, 2020);
                assert_eq!(price_per_day.to_string(), "39.99");
                assert_eq!(status, None);
            }
            _ => panic!("expected InsertCar, got {cmd:?}"),
        }
    }

    #[test]
    fn parse_insert_car_with_status() {
        let sql = format!(
            "INSERT INTO cars (id, brand, model, year, price_per_day, status_id) VALUES ('{U1}', 'VW', 'Golf', 2022, 55, 3)"
        );
        let cmd = parse_sql(&sql).unwrap();
        match cmd {
            Command::InsertCar { status, .. } => assert_eq!(status, Some(3)),
            _ => panic!("expected InsertCar, got {cmd:?}"),
        }
    }

    #[test]
    fn parse_insert_car_with_null_status() {
        let sql = format!(
            "INSERT INTO cars (id, brand, model, year, price_per_day, status_id) VALUES ('{U1}', 'VW', 'Golf', 2022, 55, NULL)"
        );
        let cmd = parse_sql(&sql).unwrap();
        match cmd {
            Command::InsertCar { status, .. } => assert_eq!(status, None),
            _ => panic!("expected InsertCar, got {cmd:?}"),
        }
    }

    #[test]
    fn parse_insert_car_too_few_values() {
        let sql = format!("INSERT INTO cars (id, brand) VALUES ('{U1}', 'Toyota')");
        assert!(matches!(
            parse_sql(&sql),
            Err(SqlError::WrongArity("cars", 5, 2))
        ));
    }

    #[test]
    fn parse_insert_booking() {
        let sql = format!(
            "INSERT INTO bookings (id, car_id, user_name, start_date, end_date, status_id) VALUES ('{U1}', '{U2}', 'ivan', '2025-01-10', '2025-01-15', 1)"
        );
        let cmd = parse_sql(&sql).unwrap();
        match cmd {
            Command::InsertBooking { row } => {
                assert_eq!(row.id.to_string(), U1);
                assert_eq!(row.car_id.to_string(), U2);
                assert_eq!(row.user_name, "ivan");
                assert_eq!(row.start.to_string(), "2025-01-10");
                assert_eq!(row.end.to_string(), "2025-01-15");
                assert_eq!(row.status, Some(1));
            }
            _ => panic!("expected InsertBooking, got {cmd:?}"),
        }
    }

    #[test]
    fn parse_insert_booking_without_status() {
        let sql = format!(
            "INSERT INTO bookings (id, car_id, user_name, start_date, end_date) VALUES ('{U1}', '{U2}', 'ivan', '2025-01-10', '2025-01-15')"
        );
        let cmd = parse_sql(&sql).unwrap();
        match cmd {
            Command::InsertBooking { row } => assert_eq!(row.status, None),
            _ => panic!("expected InsertBooking, got {cmd:?}"),
        }
    }

    #[test]
    fn parse_batch_insert_bookings() {
        let sql = format!(
            "INSERT INTO bookings (id, car_id, user_name, start_date, end_date) VALUES \
             ('{U1}', '{U2}', 'ivan', '2025-01-10', '2025-01-15'), \
             ('{U2}', '{U2}', 'olena', '2025-02-10', '2025-02-15')"
        );
        let cmd = parse_sql(&sql).unwrap();
        match cmd {
            Command::BatchInsertBookings { rows } => {
                assert_eq!(rows.len(), 2);
                assert_eq!(rows[0].user_name, "ivan");
                assert_eq!(rows[1].start.to_string(), "2025-02-10");
            }
            _ => panic!("expected BatchInsertBookings, got {cmd:?}"),
        }
    }

    #[test]
    fn parse_single_insert_booking_not_batch() {
        // A single-row INSERT should still produce InsertBooking, not BatchInsertBookings
        let sql = format!(
            "INSERT INTO bookings (id, car_id, user_name, start_date, end_date) VALUES ('{U1}', '{U2}', 'ivan', '2025-01-10', '2025-01-15')"
        );
        let cmd = parse_sql(&sql).unwrap();
        assert!(matches!(cmd, Command::InsertBooking { .. }));
    }

    #[test]
    fn parse_insert_bad_date() {
        let sql = format!(
            "INSERT INTO bookings (id, car_id, user_name, start_date, end_date) VALUES ('{U1}', '{U2}', 'ivan', 'not-a-date', '2025-01-15')"
        );
        assert!(matches!(parse_sql(&sql), Err(SqlError::Parse(_))));
    }

    #[test]
    fn parse_update_booking() {
        let sql = format!(
            "UPDATE bookings SET start_date = '2025-03-01', end_date = '2025-03-08', status_id = 1 WHERE id = '{U1}'"
        );
        let cmd = parse_sql(&sql).unwrap();
        match cmd {
            Command::UpdateBooking {
                id,
                car_id,
                user_name,
                start,
                end,
                status,
                version,
            } => {
                assert_eq!(id.to_string(), U1);
                assert_eq!(car_id, None);
                assert_eq!(user_name, None);
                assert_eq!(start.unwrap().to_string(), "2025-03-01");
                assert_eq!(end.unwrap().to_string(), "2025-03-08");
                assert_eq!(status, Some(1));
                assert_eq!(version, None);
            }
            _ => panic!("expected UpdateBooking, got {cmd:?}"),
        }
    }

    #[test]
    fn parse_update_with_version_token() {
        let sql = format!("UPDATE cars SET brand = 'Seat' WHERE id = '{U1}' AND version = 4");
        let cmd = parse_sql(&sql).unwrap();
        match cmd {
            Command::UpdateCar { brand, version, .. } => {
                assert_eq!(brand.as_deref(), Some("Seat"));
                assert_eq!(version, Some(4));
            }
            _ => panic!("expected UpdateCar, got {cmd:?}"),
        }
    }

    #[test]
    fn parse_update_unknown_column() {
        let sql = format!("UPDATE cars SET colour = 'red' WHERE id = '{U1}'");
        assert!(matches!(parse_sql(&sql), Err(SqlError::UnknownColumn(_))));
    }

    #[test]
    fn parse_update_without_id() {
        let sql = "UPDATE cars SET brand = 'Seat' WHERE version = 4";
        assert!(matches!(parse_sql(sql), Err(SqlError::MissingFilter("id"))));
    }

    #[test]
    fn parse_delete_booking() {
        let sql = format!("DELETE FROM bookings WHERE id = '{U1}'");
        let cmd = parse_sql(&sql).unwrap();
        match cmd {
            Command::DeleteBooking { id } => assert_eq!(id.to_string(), U1),
            _ => panic!("expected DeleteBooking, got {cmd:?}"),
        }
    }

    #[test]
    fn parse_delete_without_filter() {
        let sql = "DELETE FROM cars";
        assert!(matches!(parse_sql(sql), Err(SqlError::MissingFilter("id"))));
    }

    #[test]
    fn parse_insert_review() {
        let sql = format!(
            "INSERT INTO reviews (id, user_name, comment) VALUES ('{U1}', 'olena', 'Great service')"
        );
        let cmd = parse_sql(&sql).unwrap();
        match cmd {
            Command::InsertReview {
                user_name, comment, ..
            } => {
                assert_eq!(user_name, "olena");
                assert_eq!(comment, "Great service");
            }
            _ => panic!("expected InsertReview, got {cmd:?}"),
        }
    }

    #[test]
    fn parse_insert_status_type() {
        let sql = "INSERT INTO booking_status_types (id, name, display_name) VALUES (5, 'no_show', 'No show')";
        let cmd = parse_sql(sql).unwrap();
        match cmd {
            Command::InsertStatusType {
                table,
                code,
                name,
                display_name,
            } => {
                assert_eq!(table, StatusTable::Booking);
                assert_eq!(code, 5);
                assert_eq!(name, "no_show");
                assert_eq!(display_name, "No show");
            }
            _ => panic!("expected InsertStatusType, got {cmd:?}"),
        }
    }

    #[test]
    fn parse_select_cars() {
        let cmd = parse_sql("SELECT * FROM cars").unwrap();
        assert_eq!(cmd, Command::SelectCars { id: None });

        let sql = format!("SELECT * FROM cars WHERE id = '{U1}'");
        let cmd = parse_sql(&sql).unwrap();
        match cmd {
            Command::SelectCars { id } => assert_eq!(id.unwrap().to_string(), U1),
            _ => panic!("expected SelectCars, got {cmd:?}"),
        }
    }

    #[test]
    fn parse_select_bookings_by_car() {
        let sql = format!("SELECT * FROM bookings WHERE car_id = '{U2}'");
        let cmd = parse_sql(&sql).unwrap();
        match cmd {
            Command::SelectBookings { id, car_id } => {
                assert_eq!(id, None);
                assert_eq!(car_id.unwrap().to_string(), U2);
            }
            _ => panic!("expected SelectBookings, got {cmd:?}"),
        }
    }

    #[test]
    fn parse_select_status_types() {
        let cmd = parse_sql("SELECT * FROM car_status_types").unwrap();
        assert_eq!(
            cmd,
            Command::SelectStatusTypes {
                table: StatusTable::Car
            }
        );
    }

    #[test]
    fn parse_select_availability() {
        let sql = format!(
            "SELECT * FROM availability WHERE car_id = '{U1}' AND start_date >= '2025-01-01' AND end_date <= '2025-02-01'"
        );
        let cmd = parse_sql(&sql).unwrap();
        match cmd {
            Command::SelectAvailability {
                car_id,
                start,
                end,
                min_days,
            } => {
                assert_eq!(car_id.to_string(), U1);
                assert_eq!(start.to_string(), "2025-01-01");
                assert_eq!(end.to_string(), "2025-02-01");
                assert_eq!(min_days, None);
            }
            _ => panic!("expected SelectAvailability, got {cmd:?}"),
        }
    }

    #[test]
    fn parse_select_availability_with_min_days() {
        let sql = format!(
            "SELECT * FROM availability WHERE car_id = '{U1}' AND start_date >= '2025-01-01' AND end_date <= '2025-02-01' AND min_days = 3"
        );
        let cmd = parse_sql(&sql).unwrap();
        match cmd {
            Command::SelectAvailability { min_days, .. } => assert_eq!(min_days, Some(3)),
            _ => panic!("expected SelectAvailability, got {cmd:?}"),
        }
    }

    #[test]
    fn parse_select_availability_missing_filter() {
        let sql = format!("SELECT * FROM availability WHERE car_id = '{U1}'");
        assert!(matches!(parse_sql(&sql), Err(SqlError::MissingFilter(_))));
    }

    #[test]
    fn parse_unknown_table_errors() {
        let sql = format!("INSERT INTO motorcycles (id) VALUES ('{U1}')");
        assert!(matches!(parse_sql(&sql), Err(SqlError::UnknownTable(_))));
    }

    #[test]
    fn parse_empty_errors() {
        assert!(matches!(parse_sql(""), Err(SqlError::Empty)));
    }
}
