//! Diesel schema for task queue persistence.

diesel::table! {
    /// Task records with their lifecycle status and liveness timestamp.
    tasks (id) {
        /// Task identifier.
        id -> Uuid,
        /// Opaque task specification.
        spec -> Jsonb,
        /// Lifecycle status.
        #[max_length = 50]
        status -> Varchar,
        /// Latest heartbeat, set on claim and renewal.
        last_heartbeat_at -> Nullable<Timestamptz>,
        /// Creation timestamp.
        created_at -> Timestamptz,
        /// Creator identity.
        #[max_length = 255]
        created_by -> Nullable<Varchar>,
        /// One-time secrets, cleared on claim.
        secrets -> Nullable<Jsonb>,
    }
}

diesel::table! {
    /// Append-only task event log.
    task_events (id) {
        /// Store-wide sequence number.
        id -> Int8,
        /// Owning task.
        task_id -> Uuid,
        /// Structured payload.
        body -> Jsonb,
        /// Event kind.
        #[max_length = 50]
        event_type -> Varchar,
        /// Insertion timestamp.
        created_at -> Timestamptz,
    }
}

diesel::joinable!(task_events -> tasks (task_id));
diesel::allow_tables_to_appear_in_same_query!(tasks, task_events);
