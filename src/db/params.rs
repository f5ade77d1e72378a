//! Parameter binding utilities for PostgreSQL statements.
//!
//! This module binds `SqlParam` values onto sqlx query objects. Values reach
//! the server as bind parameters; nothing is spliced into statement text.

use crate::models::SqlParam;
use sqlx::encode::IsNull;
use sqlx::error::BoxDynError;
use sqlx::postgres::types::Oid;
use sqlx::postgres::{PgArgumentBuffer, PgArguments, PgTypeInfo};
use sqlx::types::Json;
use sqlx::{Encode, Postgres, Type};

pub(crate) type PgQuery<'q> = sqlx::query::Query<'q, Postgres, PgArguments>;

/// A NULL whose type the server infers from context.
///
/// A typed `None::<String>` would be sent as TEXT and rejected by uuid,
/// timestamptz, integer or jsonb targets. OID 0 leaves the type unspecified.
#[derive(Debug, Clone, Copy)]
pub(crate) struct UntypedNull;

impl Type<Postgres> for UntypedNull {
    fn type_info() -> PgTypeInfo {
        PgTypeInfo::with_oid(Oid(0))
    }
}

impl Encode<'_, Postgres> for UntypedNull {
    fn encode_by_ref(&self, _buf: &mut PgArgumentBuffer) -> Result<IsNull, BoxDynError> {
        Ok(IsNull::Yes)
    }
}

/// Bind a parameter to a PostgreSQL query.
pub(crate) fn bind_postgres_param<'q>(query: PgQuery<'q>, param: &'q SqlParam) -> PgQuery<'q> {
    match param {
        SqlParam::Null => query.bind(UntypedNull),
        SqlParam::Bool(v) => query.bind(*v),
        SqlParam::Int(v) => query.bind(*v),
        SqlParam::Float(v) => query.bind(*v),
        SqlParam::Text(v) => query.bind(v.as_str()),
        SqlParam::Uuid(v) => query.bind(*v),
        SqlParam::Timestamp(v) => query.bind(*v),
        SqlParam::Json(v) => query.bind(Json(v)),
        SqlParam::TextArray(v) => query.bind(v.as_slice()),
    }
}

/// Build a query for `sql` with every parameter bound in order.
pub(crate) fn bind_all<'q>(sql: &'q str, params: &'q [SqlParam]) -> PgQuery<'q> {
    params
        .iter()
        .fold(sqlx::query(sql), |query, param| {
            bind_postgres_param(query, param)
        })
}
