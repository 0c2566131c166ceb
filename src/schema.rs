// Kept in sync by hand with the CREATE TABLE statements in
// repository/diesel_context.rs.

diesel::table! {
    documents (id) {
        id -> Text,
        owner_id -> Text,
        name -> Text,
        format_version -> Text,
        current_page -> Integer,
        page_count -> Integer,
        status -> Text,
        total_chunks -> Nullable<Integer>,
        chunk_index -> Nullable<Integer>,
        chunk_size -> Nullable<Integer>,
        revision -> BigInt,
        created_at -> Text,
        updated_at -> Text,
    }
}

diesel::table! {
    document_entries (id) {
        id -> Integer,
        document_id -> Text,
        layer -> Text,
        page_index -> Integer,
        image -> Text,
    }
}

diesel::table! {
    ingest_chunks (id) {
        id -> Integer,
        document_id -> Text,
        chunk_index -> Integer,
        received_at -> Text,
    }
}

diesel::table! {
    quotes (id) {
        id -> Text,
        owner_id -> Text,
        kind -> Text,
        number -> Text,
        client_name -> Text,
        client_email -> Text,
        status -> Text,
        created_at -> Text,
        updated_at -> Text,
    }
}

diesel::joinable!(document_entries -> documents (document_id));
diesel::joinable!(ingest_chunks -> documents (document_id));

diesel::allow_tables_to_appear_in_same_query!(documents, document_entries, ingest_chunks, quotes,);
