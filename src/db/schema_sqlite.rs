// SQLite schema definitions

diesel::table! {
    kv_entries (namespace, entry_key) {
        namespace -> Text,
        entry_key -> Text,
        entry_value -> Text,
        expires_at -> BigInt,
    }
}
