use std::fmt::Debug;
use std::io;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use futures::stream;
use futures::Sink;
use pgwire::api::auth::cleartext::CleartextPasswordAuthStartupHandler;
use pgwire::api::auth::{DefaultServerParameterProvider, StartupHandler};
use pgwire::api::copy::CopyHandler;
use pgwire::api::portal::{Format, Portal};
use pgwire::api::query::{ExtendedQueryHandler, SimpleQueryHandler};
use pgwire::api::results::{
    DataRowEncoder, DescribePortalResponse, DescribeStatementResponse, FieldFormat, FieldInfo,
    QueryResponse, Response, Tag,
};
use pgwire::api::stmt::{QueryParser, StoredStatement};
use pgwire::api::store::PortalStore;
use pgwire::api::{ClientInfo, ClientPortalStore, NoopHandler, PgWireServerHandlers, Type};
use pgwire::error::{ErrorInfo, PgWireError, PgWireResult};
use pgwire::messages::PgWireBackendMessage;
use pgwire::tokio::TlsAcceptor;
use tokio::net::TcpStream;

use crate::auth::RentdAuthSource;
use crate::engine::{BookingPatch, CarPatch, Engine, NewBooking, NewCar, NewReview, ReviewPatch};
use crate::model::*;
use crate::observability;
use crate::sql::{self, BookingRow, Command};
use crate::tenant::TenantManager;

pub struct RentdHandler {
    tenant_manager: Arc<TenantManager>,
    query_parser: Arc<RentdQueryParser>,
}

impl RentdHandler {
    pub fn new(tenant_manager: Arc<TenantManager>) -> Self {
        Self {
            tenant_manager,
            query_parser: Arc::new(RentdQueryParser),
        }
    }

    fn resolve_engine<C: ClientInfo>(&self, client: &C) -> PgWireResult<Arc<Engine>> {
        let db = client
            .metadata()
            .get("database")
            .cloned()
            .unwrap_or_else(|| "default".to_string());
        self.tenant_manager.get_or_create(&db).map_err(|e| {
            PgWireError::UserError(Box::new(ErrorInfo::new(
                "ERROR".into(),
                "08006".into(),
                format!("tenant error: {e}"),
            )))
        })
    }

    async fn run_command(&self, engine: &Engine, cmd: Command) -> PgWireResult<Vec<Response>> {
        let label = observability::command_label(&cmd);
        let start = Instant::now();
        let result = self.execute_command(engine, cmd).await;
        metrics::histogram!(observability::QUERY_DURATION_SECONDS, "command" => label)
            .record(start.elapsed().as_secs_f64());
        let status = if result.is_ok() { "ok" } else { "error" };
        metrics::counter!(observability::QUERIES_TOTAL, "command" => label, "status" => status)
            .increment(1);
        result
    }

    async fn execute_command(&self, engine: &Engine, cmd: Command) -> PgWireResult<Vec<Response>> {
        match cmd {
            Command::InsertCar {
                id,
                brand,
                model,
                year,
                price_per_day,
                status,
            } => {
                engine
                    .create_car(NewCar {
                        id,
                        brand,
                        model,
                        year,
                        price_per_day,
                        status,
                    })
                    .await
                    .map_err(engine_err)?;
                Ok(vec![Response::Execution(Tag::new("INSERT").with_rows(1))])
            }
            Command::UpdateCar {
                id,
                brand,
                model,
                year,
                price_per_day,
                status,
                version,
            } => {
                engine
                    .update_car(
                        id,
                        CarPatch {
                            brand,
                            model,
                            year,
                            price_per_day,
                            status,
                            expected_version: version,
                        },
                    )
                    .await
                    .map_err(engine_err)?;
                Ok(vec![Response::Execution(Tag::new("UPDATE").with_rows(1))])
            }
            Command::DeleteCar { id } => {
                engine.delete_car(id).await.map_err(engine_err)?;
                Ok(vec![Response::Execution(Tag::new("DELETE").with_rows(1))])
            }
            Command::InsertBooking { row } => {
                engine
                    .create_booking(new_booking(row))
                    .await
                    .map_err(engine_err)?;
                Ok(vec![Response::Execution(Tag::new("INSERT").with_rows(1))])
            }
            Command::BatchInsertBookings { rows } => {
                let count = rows.len();
                let batch: Vec<NewBooking> = rows.into_iter().map(new_booking).collect();
                engine.create_bookings(batch).await.map_err(engine_err)?;
                Ok(vec![Response::Execution(
                    Tag::new("INSERT").with_rows(count),
                )])
            }
            Command::UpdateBooking {
                id,
                car_id,
                user_name,
                start,
                end,
                status,
                version,
            } => {
                engine
                    .update_booking(
                        id,
                        BookingPatch {
                            car_id,
                            user_name,
                            start,
                            end,
                            status,
                            expected_version: version,
                        },
                    )
                    .await
                    .map_err(engine_err)?;
                Ok(vec![Response::Execution(Tag::new("UPDATE").with_rows(1))])
            }
            Command::DeleteBooking { id } => {
                engine.delete_booking(id).await.map_err(engine_err)?;
                Ok(vec![Response::Execution(Tag::new("DELETE").with_rows(1))])
            }
            Command::InsertReview {
                id,
                user_name,
                comment,
            } => {
                engine
                    .create_review(NewReview {
                        id,
                        user_name,
                        comment,
                    })
                    .await
                    .map_err(engine_err)?;
                Ok(vec![Response::Execution(Tag::new("INSERT").with_rows(1))])
            }
            Command::UpdateReview {
                id,
                user_name,
                comment,
                version,
            } => {
                engine
                    .update_review(
                        id,
                        ReviewPatch {
                            user_name,
                            comment,
                            expected_version: version,
                        },
                    )
                    .await
                    .map_err(engine_err)?;
                Ok(vec![Response::Execution(Tag::new("UPDATE").with_rows(1))])
            }
            Command::DeleteReview { id } => {
                engine.delete_review(id).await.map_err(engine_err)?;
                Ok(vec![Response::Execution(Tag::new("DELETE").with_rows(1))])
            }
            Command::InsertStatusType {
                table,
                code,
                name,
                display_name,
            } => {
                engine
                    .add_status_type(
                        table,
                        StatusType {
                            code,
                            name,
                            display_name,
                        },
                    )
                    .await
                    .map_err(engine_err)?;
                Ok(vec![Response::Execution(Tag::new("INSERT").with_rows(1))])
            }
            Command::SelectCars { id } => {
                let cars = match id {
                    Some(id) => engine.get_car(id).await.into_iter().collect(),
                    None => engine.list_cars().await,
                };
                Ok(vec![encode_cars(&cars)?])
            }
            Command::SelectBookings { id, car_id } => {
                let bookings = match id {
                    Some(id) => engine.get_booking(id).await.into_iter().collect(),
                    None => engine.list_bookings(car_id).await,
                };
                Ok(vec![encode_bookings(&bookings)?])
            }
            Command::SelectReviews { id } => {
                let reviews = match id {
                    Some(id) => engine.get_review(id).into_iter().collect(),
                    None => engine.list_reviews(),
                };
                Ok(vec![encode_reviews(&reviews)?])
            }
            Command::SelectStatusTypes { table } => {
                let types = engine.list_status_types(table);
                Ok(vec![encode_status_types(&types)?])
            }
            Command::SelectAvailability {
                car_id,
                start,
                end,
                min_days,
            } => {
                let ranges = engine
                    .availability(car_id, start, end, min_days)
                    .await
                    .map_err(engine_err)?;
                Ok(vec![encode_availability(car_id, &ranges)?])
            }
        }
    }
}

// ── Result schemas ───────────────────────────────────────────────

fn text_field(name: &str, ty: Type) -> FieldInfo {
    FieldInfo::new(name.into(), None, None, ty, FieldFormat::Text)
}

fn cars_schema() -> Vec<FieldInfo> {
    vec![
        text_field("id", Type::VARCHAR),
        text_field("brand", Type::VARCHAR),
        text_field("model", Type::VARCHAR),
        text_field("year", Type::INT4),
        text_field("price_per_day", Type::VARCHAR),
        text_field("status_id", Type::INT4),
        text_field("version", Type::INT8),
    ]
}

fn bookings_schema() -> Vec<FieldInfo> {
    vec![
        text_field("id", Type::VARCHAR),
        text_field("car_id", Type::VARCHAR),
        text_field("user_name", Type::VARCHAR),
        text_field("start_date", Type::VARCHAR),
        text_field("end_date", Type::VARCHAR),
        text_field("status_id", Type::INT4),
        text_field("version", Type::INT8),
    ]
}

fn reviews_schema() -> Vec<FieldInfo> {
    vec![
        text_field("id", Type::VARCHAR),
        text_field("user_name", Type::VARCHAR),
        text_field("comment", Type::VARCHAR),
        text_field("date", Type::VARCHAR),
        text_field("version", Type::INT8),
    ]
}

fn status_types_schema() -> Vec<FieldInfo> {
    vec![
        text_field("id", Type::INT4),
        text_field("name", Type::VARCHAR),
        text_field("display_name", Type::VARCHAR),
    ]
}

fn availability_schema() -> Vec<FieldInfo> {
    vec![
        text_field("car_id", Type::VARCHAR),
        text_field("start_date", Type::VARCHAR),
        text_field("end_date", Type::VARCHAR),
    ]
}

fn schema_for(cmd: &Command) -> Vec<FieldInfo> {
    match cmd {
        Command::SelectCars { .. } => cars_schema(),
        Command::SelectBookings { .. } => bookings_schema(),
        Command::SelectReviews { .. } => reviews_schema(),
        Command::SelectStatusTypes { .. } => status_types_schema(),
        Command::SelectAvailability { .. } => availability_schema(),
        _ => vec![],
    }
}

// ── Row encoding ─────────────────────────────────────────────────

fn encode_cars(cars: &[Car]) -> PgWireResult<Response> {
    let schema = Arc::new(cars_schema());
    let rows: Vec<PgWireResult<_>> = cars
        .iter()
        .map(|car| {
            let mut encoder = DataRowEncoder::new(schema.clone());
            encoder.encode_field(&car.id.to_string())?;
            encoder.encode_field(&car.brand)?;
            encoder.encode_field(&car.model)?;
            encoder.encode_field(&car.year)?;
            encoder.encode_field(&car.price_per_day.to_string())?;
            encoder.encode_field(&(car.status as i32))?;
            encoder.encode_field(&(car.version as i64))?;
            Ok(encoder.take_row())
        })
        .collect();
    Ok(Response::Query(QueryResponse::new(
        schema,
        stream::iter(rows),
    )))
}

fn encode_bookings(bookings: &[Booking]) -> PgWireResult<Response> {
    let schema = Arc::new(bookings_schema());
    let rows: Vec<PgWireResult<_>> = bookings
        .iter()
        .map(|b| {
            let mut encoder = DataRowEncoder::new(schema.clone());
            encoder.encode_field(&b.id.to_string())?;
            encoder.encode_field(&b.car_id.to_string())?;
            encoder.encode_field(&b.user_name)?;
            encoder.encode_field(&b.range.start.to_string())?;
            encoder.encode_field(&b.range.end.to_string())?;
            encoder.encode_field(&(b.status as i32))?;
            encoder.encode_field(&(b.version as i64))?;
            Ok(encoder.take_row())
        })
        .collect();
    Ok(Response::Query(QueryResponse::new(
        schema,
        stream::iter(rows),
    )))
}

fn encode_reviews(reviews: &[Review]) -> PgWireResult<Response> {
    let schema = Arc::new(reviews_schema());
    let rows: Vec<PgWireResult<_>> = reviews
        .iter()
        .map(|r| {
            let mut encoder = DataRowEncoder::new(schema.clone());
            encoder.encode_field(&r.id.to_string())?;
            encoder.encode_field(&r.user_name)?;
            encoder.encode_field(&r.comment)?;
            encoder.encode_field(&r.date.to_rfc3339())?;
            encoder.encode_field(&(r.version as i64))?;
            Ok(encoder.take_row())
        })
        .collect();
    Ok(Response::Query(QueryResponse::new(
        schema,
        stream::iter(rows),
    )))
}

fn encode_status_types(types: &[StatusType]) -> PgWireResult<Response> {
    let schema = Arc::new(status_types_schema());
    let rows: Vec<PgWireResult<_>> = types
        .iter()
        .map(|t| {
            let mut encoder = DataRowEncoder::new(schema.clone());
            encoder.encode_field(&(t.code as i32))?;
            encoder.encode_field(&t.name)?;
            encoder.encode_field(&t.display_name)?;
            Ok(encoder.take_row())
        })
        .collect();
    Ok(Response::Query(QueryResponse::new(
        schema,
        stream::iter(rows),
    )))
}

fn encode_availability(car_id: ulid::Ulid, ranges: &[DateRange]) -> PgWireResult<Response> {
    let schema = Arc::new(availability_schema());
    let cid = car_id.to_string();
    let rows: Vec<PgWireResult<_>> = ranges
        .iter()
        .map(|r| {
            let mut encoder = DataRowEncoder::new(schema.clone());
            encoder.encode_field(&cid)?;
            encoder.encode_field(&r.start.to_string())?;
            encoder.encode_field(&r.end.to_string())?;
            Ok(encoder.take_row())
        })
        .collect();
    Ok(Response::Query(QueryResponse::new(
        schema,
        stream::iter(rows),
    )))
}

fn new_booking(row: BookingRow) -> NewBooking {
    NewBooking {
        id: row.id,
        car_id: row.car_id,
        user_name: row.user_name,
        start: row.start,
        end: row.end,
        status: row.status,
    }
}

#[async_trait]
impl SimpleQueryHandler for RentdHandler {
    async fn do_query<C>(&self, client: &mut C, query: &str) -> PgWireResult<Vec<Response>>
    where
        C: ClientInfo + ClientPortalStore + Sink<PgWireBackendMessage> + Unpin + Send + Sync,
        C::Error: Debug,
        PgWireError: From<C::Error>,
    {
        let engine = self.resolve_engine(client)?;
        let cmd = sql::parse_sql(query).map_err(sql_err)?;
        self.run_command(&engine, cmd).await
    }
}

// ── Extended Query Protocol ──────────────────────────────────────

#[derive(Debug)]
pub struct RentdQueryParser;

#[async_trait]
impl QueryParser for RentdQueryParser {
    type Statement = String;

    async fn parse_sql<C>(
        &self,
        _client: &C,
        sql: &str,
        _types: &[Option<Type>],
    ) -> PgWireResult<String>
    where
        C: ClientInfo + Unpin + Send + Sync,
    {
        Ok(sql.to_string())
    }

    fn get_parameter_types(&self, stmt: &String) -> PgWireResult<Vec<Type>> {
        Ok(vec![Type::VARCHAR; count_params(stmt)])
    }

    fn get_result_schema(
        &self,
        stmt: &String,
        _column_format: Option<&Format>,
    ) -> PgWireResult<Vec<FieldInfo>> {
        Ok(statement_schema(stmt))
    }
}

/// Result schema for a statement, empty for mutations or unparsable input.
fn statement_schema(stmt: &str) -> Vec<FieldInfo> {
    match sql::parse_sql(stmt) {
        Ok(cmd) => schema_for(&cmd),
        Err(_) => vec![],
    }
}

#[async_trait]
impl ExtendedQueryHandler for RentdHandler {
    type Statement = String;
    type QueryParser = RentdQueryParser;

    fn query_parser(&self) -> Arc<Self::QueryParser> {
        self.query_parser.clone()
    }

    async fn do_query<C>(
        &self,
        client: &mut C,
        portal: &Portal<Self::Statement>,
        _max_rows: usize,
    ) -> PgWireResult<Response>
    where
        C: ClientInfo + ClientPortalStore + Sink<PgWireBackendMessage> + Unpin + Send + Sync,
        C::PortalStore: PortalStore<Statement = Self::Statement>,
        C::Error: Debug,
        PgWireError: From<C::Error>,
    {
        let engine = self.resolve_engine(client)?;
        let sql_text = substitute_params(portal);
        let cmd = sql::parse_sql(&sql_text).map_err(sql_err)?;
        let mut responses = self.run_command(&engine, cmd).await?;
        Ok(responses.remove(0))
    }

    async fn do_describe_statement<C>(
        &self,
        _client: &mut C,
        target: &StoredStatement<Self::Statement>,
    ) -> PgWireResult<DescribeStatementResponse>
    where
        C: ClientInfo + ClientPortalStore + Sink<PgWireBackendMessage> + Unpin + Send + Sync,
        C::PortalStore: PortalStore<Statement = Self::Statement>,
        C::Error: Debug,
        PgWireError: From<C::Error>,
    {
        let param_types = vec![Type::VARCHAR; count_params(&target.statement)];
        Ok(DescribeStatementResponse::new(
            param_types,
            statement_schema(&target.statement),
        ))
    }

    async fn do_describe_portal<C>(
        &self,
        _client: &mut C,
        target: &Portal<Self::Statement>,
    ) -> PgWireResult<DescribePortalResponse>
    where
        C: ClientInfo + ClientPortalStore + Sink<PgWireBackendMessage> + Unpin + Send + Sync,
        C::PortalStore: PortalStore<Statement = Self::Statement>,
        C::Error: Debug,
        PgWireError: From<C::Error>,
    {
        Ok(DescribePortalResponse::new(statement_schema(
            &target.statement.statement,
        )))
    }
}

/// Count the highest $N parameter placeholder in the SQL string.
fn count_params(sql: &str) -> usize {
    let mut max = 0usize;
    let bytes = sql.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'$' {
            i += 1;
            let start = i;
            while i < bytes.len() && bytes[i].is_ascii_digit() {
                i += 1;
            }
            if i > start
                && let Ok(n) = sql[start..i].parse::<usize>()
                && n > max
            {
                max = n;
            }
        } else {
            i += 1;
        }
    }
    max
}

/// Substitute $1, $2, ... placeholders with bound parameter values (text format).
fn substitute_params(portal: &Portal<String>) -> String {
    let sql = portal.statement.statement.to_string();
    let params = &portal.parameters;
    let mut result = sql;

    for (i, param) in params.iter().enumerate().rev() {
        let placeholder = format!("${}", i + 1);
        let value = match param {
            Some(bytes) => {
                let text = String::from_utf8_lossy(bytes);
                format!("'{}'", text.replace('\'', "''"))
            }
            None => "NULL".to_string(),
        };
        result = result.replace(&placeholder, &value);
    }

    result
}

// ── Factory ──────────────────────────────────────────────────────

pub struct RentdFactory {
    handler: Arc<RentdHandler>,
    auth_handler:
        Arc<CleartextPasswordAuthStartupHandler<RentdAuthSource, DefaultServerParameterProvider>>,
    noop: Arc<NoopHandler>,
}

impl RentdFactory {
    pub fn new(tenant_manager: Arc<TenantManager>, password: String) -> Self {
        let auth_source = RentdAuthSource::new(password);
        let param_provider = DefaultServerParameterProvider::default();
        Self {
            handler: Arc::new(RentdHandler::new(tenant_manager)),
            auth_handler: Arc::new(CleartextPasswordAuthStartupHandler::new(
                auth_source,
                param_provider,
            )),
            noop: Arc::new(NoopHandler),
        }
    }
}

impl PgWireServerHandlers for RentdFactory {
    fn simple_query_handler(&self) -> Arc<impl SimpleQueryHandler> {
        self.handler.clone()
    }

    fn extended_query_handler(&self) -> Arc<impl ExtendedQueryHandler> {
        self.handler.clone()
    }

    fn startup_handler(&self) -> Arc<impl StartupHandler> {
        self.auth_handler.clone()
    }

    fn copy_handler(&self) -> Arc<impl CopyHandler> {
        self.noop.clone()
    }
}

/// Serve one client connection to completion.
pub async fn process_connection(
    socket: TcpStream,
    tenant_manager: Arc<TenantManager>,
    password: String,
    tls: Option<TlsAcceptor>,
) -> io::Result<()> {
    let factory = Arc::new(RentdFactory::new(tenant_manager, password));
    pgwire::tokio::process_socket(socket, tls, factory).await
}

fn engine_err(e: crate::engine::EngineError) -> PgWireError {
    PgWireError::UserError(Box::new(ErrorInfo::new(
        "ERROR".into(),
        "P0001".into(),
        e.to_string(),
    )))
}

fn sql_err(e: crate::sql::SqlError) -> PgWireError {
    PgWireError::UserError(Box::new(ErrorInfo::new(
        "ERROR".into(),
        "42601".into(),
        e.to_string(),
    )))
}
