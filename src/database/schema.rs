table! {
    occurrences (id) {
        id -> BigInt,
        template_id -> Integer,
        timestamp -> BigInt,
        priority -> Integer,
    }
}

table! {
    parameters (occurrence_id, position) {
        occurrence_id -> BigInt,
        position -> Integer,
        value -> Text,
    }
}

table! {
    templates (id) {
        id -> Integer,
        text -> Text,
        vector_index -> BigInt,
        first_seen -> BigInt,
        last_seen -> BigInt,
        count -> BigInt,
    }
}

joinable!(occurrences -> templates (template_id));
joinable!(parameters -> occurrences (occurrence_id));

allow_tables_to_appear_in_same_query!(occurrences, parameters, templates,);
