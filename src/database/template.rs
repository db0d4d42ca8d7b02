use diesel::prelude::*;

use super::schema::templates;
use crate::database::{Conn, Error};

#[derive(Debug, Insertable)]
#[table_name = "templates"]
struct NewTemplate<'a> {
    text: &'a str,
    vector_index: i64,
    first_seen: i64,
    last_seen: i64,
    count: i64,
}

#[derive(Clone, Debug, Queryable)]
pub(crate) struct TemplateRow {
    pub(crate) id: i32,
    pub(crate) text: String,
    pub(crate) vector_index: i64,
    pub(crate) first_seen: i64,
    pub(crate) last_seen: i64,
    pub(crate) count: i64,
}

/// Inserts a template seen once at `seen` and returns its id.
pub(crate) fn add_template(
    conn: &Conn,
    text: &str,
    vector_index: i64,
    seen: i64,
) -> Result<i32, Error> {
    diesel::insert_into(templates::table)
        .values(&NewTemplate {
            text,
            vector_index,
            first_seen: seen,
            last_seen: seen,
            count: 1,
        })
        .execute(conn)?;
    templates::table
        .filter(templates::text.eq(text))
        .select(templates::id)
        .first(conn)
        .map_err(Into::into)
}

/// Records one more occurrence of a template.
pub(crate) fn touch_template(conn: &Conn, id: i32, seen: i64) -> Result<usize, Error> {
    diesel::update(templates::table.find(id))
        .set((
            templates::last_seen.eq(seen),
            templates::count.eq(templates::count + 1),
        ))
        .execute(conn)
        .map_err(Into::into)
}

/// `(text, id, vector_index)` of every template, for the writer's cache.
pub(crate) fn template_keys(conn: &Conn) -> Result<Vec<(String, i32, i64)>, Error> {
    templates::table
        .select((templates::text, templates::id, templates::vector_index))
        .load(conn)
        .map_err(Into::into)
}

pub(crate) fn template_at(
    conn: &Conn,
    vector_index: i64,
) -> Result<Option<TemplateRow>, Error> {
    templates::table
        .filter(templates::vector_index.eq(vector_index))
        .first::<TemplateRow>(conn)
        .optional()
        .map_err(Into::into)
}

pub(crate) fn find_template(conn: &Conn, text: &str) -> Result<Option<TemplateRow>, Error> {
    templates::table
        .filter(templates::text.eq(text))
        .first::<TemplateRow>(conn)
        .optional()
        .map_err(Into::into)
}

pub(crate) fn template_count(conn: &Conn) -> Result<i64, Error> {
    templates::table.count().get_result(conn).map_err(Into::into)
}

