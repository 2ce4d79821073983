//! Diesel schema for stream persistence.

diesel::table! {
    /// Relay streams.
    streams (id) {
        /// Stream identifier.
        id -> Uuid,
        /// Owning user.
        owner_id -> Uuid,
        /// Display title.
        #[max_length = 255]
        title -> Varchar,
        /// Lifecycle status.
        #[max_length = 50]
        status -> Varchar,
        /// Bound agent.
        assigned_agent_id -> Nullable<Uuid>,
        /// Ordered source files as JSONB.
        video_files -> Jsonb,
        /// Main ingest URL.
        primary_target -> Text,
        /// Extra ingest URLs as JSONB.
        push_targets -> Jsonb,
        /// Loop flag.
        loop_playback -> Bool,
        /// Automatic restart flag.
        schedule_enabled -> Bool,
        /// Soft-archive flag.
        archived -> Bool,
        /// Last start.
        last_started_at -> Nullable<Timestamptz>,
        /// Last stop.
        last_stopped_at -> Nullable<Timestamptz>,
        /// Liveness timestamp.
        last_status_at -> Timestamptz,
        /// Status change timestamp.
        status_changed_at -> Timestamptz,
        /// Latest error message.
        error_message -> Nullable<Text>,
        /// Latest progress payload.
        progress -> Nullable<Jsonb>,
        /// Crash timestamps inside the window as JSONB.
        recent_crashes -> Jsonb,
        /// Optimistic concurrency revision.
        revision -> Int8,
        /// Creation timestamp.
        created_at -> Timestamptz,
        /// Last change timestamp.
        updated_at -> Timestamptz,
    }
}

diesel::table! {
    /// Streams waiting for capacity, in arrival order.
    stream_queue (stream_id) {
        /// Queued stream.
        stream_id -> Uuid,
        /// Arrival timestamp.
        enqueued_at -> Timestamptz,
        /// Monotonic arrival order.
        position -> Int8,
    }
}
