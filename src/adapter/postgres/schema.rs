diesel::table! {
    audit_trade (id) {
        id -> Int8,
        received_at -> Timestamptz,
        portfolio_id -> Text,
        trade_id -> Text,
        symbol -> Nullable<Text>,
        side -> Nullable<Text>,
        price_per_stock -> Nullable<Float8>,
        quantity -> Nullable<Int8>,
        event_timestamp -> Nullable<Timestamptz>,
        raw_payload -> Bytea,
        valid -> Bool,
    }
}

diesel::table! {
    outbox_entry (id) {
        id -> Int8,
        created_at -> Timestamptz,
        portfolio_id -> Text,
        trade_id -> Text,
        payload -> Bytea,
        status -> Text,
        sent_at -> Nullable<Timestamptz>,
    }
}

diesel::table! {
    quarantine_entry (id) {
        id -> Int8,
        failed_at -> Timestamptz,
        raw_message -> Bytea,
        error_detail -> Text,
    }
}

diesel::allow_tables_to_appear_in_same_query!(audit_trade, outbox_entry, quarantine_entry);
