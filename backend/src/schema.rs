// keep in sync with SCHEMA_SQL in db.rs

diesel::table! {
    devices (id) {
        id -> Integer,
        name -> Text,
        mac_address -> Text,
        api_key -> Text,
        friendly_id -> Text,
        refresh_interval -> Integer,
        user_id -> Nullable<Text>,
        created_at -> BigInt,
        updated_at -> BigInt,
    }
}

diesel::table! {
    device_logs (id) {
        id -> Integer,
        device_id -> Integer,
        log_data -> Text,
        created_at -> BigInt,
    }
}

diesel::table! {
    system_logs (id) {
        id -> Integer,
        level -> Text,
        message -> Text,
        source -> Nullable<Text>,
        metadata -> Nullable<Text>,
        created_at -> BigInt,
    }
}

diesel::joinable!(device_logs -> devices (device_id));

diesel::allow_tables_to_appear_in_same_query!(devices, device_logs, system_logs,);
