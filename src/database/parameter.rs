use diesel::prelude::*;
use std::convert::TryFrom;

use super::schema::parameters;
use crate::database::{Conn, Error};

#[derive(Debug, Insertable)]
#[table_name = "parameters"]
struct Parameter<'a> {
    occurrence_id: i64,
    position: i32,
    value: &'a str,
}

/// Stores the values extracted from one occurrence, keeping their order.
pub(crate) fn add_parameters(
    conn: &Conn,
    occurrence_id: i64,
    values: &[String],
) -> Result<usize, Error> {
    let rows = values
        .iter()
        .enumerate()
        .map(|(i, value)| {
            let position = i32::try_from(i)
                .map_err(|_| Error::Inconsistent(format!("too many parameters: {}", values.len())))?;
            Ok(Parameter {
                occurrence_id,
                position,
                value,
            })
        })
        .collect::<Result<Vec<_>, Error>>()?;
    let mut inserted = 0;
    for row in &rows {
        inserted += diesel::insert_into(parameters::table)
            .values(row)
            .execute(conn)?;
    }
    Ok(inserted)
}

pub(crate) fn parameters_of(conn: &Conn, occurrence_id: i64) -> Result<Vec<String>, Error> {
    use parameters::dsl;
    dsl::parameters
        .filter(dsl::occurrence_id.eq(occurrence_id))
        .order(dsl::position.asc())
        .select(dsl::value)
        .load(conn)
        .map_err(Into::into)
}
