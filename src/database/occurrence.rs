use diesel::dsl::max;
use diesel::prelude::*;

use super::schema::occurrences;
use crate::database::{Conn, Error};

#[derive(Debug, Insertable)]
#[table_name = "occurrences"]
pub(crate) struct Occurrence {
    pub(crate) id: i64,
    pub(crate) template_id: i32,
    pub(crate) timestamp: i64,
    pub(crate) priority: i32,
}

pub(crate) fn add_occurrence(conn: &Conn, occurrence: &Occurrence) -> Result<usize, Error> {
    diesel::insert_into(occurrences::table)
        .values(occurrence)
        .execute(conn)
        .map_err(Into::into)
}

/// `(id, timestamp)` of the most recent occurrence of a template.
pub(crate) fn latest_occurrence(conn: &Conn, template_id: i32) -> Result<Option<(i64, i64)>, Error> {
    use occurrences::dsl;
    dsl::occurrences
        .filter(dsl::template_id.eq(template_id))
        .order((dsl::timestamp.desc(), dsl::id.desc()))
        .select((dsl::id, dsl::timestamp))
        .first(conn)
        .optional()
        .map_err(Into::into)
}

pub(crate) fn last_timestamp(conn: &Conn) -> Result<Option<i64>, Error> {
    use occurrences::dsl;
    dsl::occurrences
        .select(max(dsl::timestamp))
        .first(conn)
        .map_err(Into::into)
}

pub(crate) fn occurrence_count(conn: &Conn) -> Result<i64, Error> {
    occurrences::table.count().get_result(conn).map_err(Into::into)
}
