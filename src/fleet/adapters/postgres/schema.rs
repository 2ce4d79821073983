//! Diesel schema for agent persistence.

diesel::table! {
    /// Fleet agents.
    agents (id) {
        /// Agent identifier.
        id -> Uuid,
        /// Unique agent name.
        #[max_length = 100]
        name -> Varchar,
        /// Network address.
        #[max_length = 255]
        address -> Varchar,
        /// Declared capacity.
        max_streams -> Int4,
        /// Counted load.
        current_streams -> Int4,
        /// Lifecycle status.
        #[max_length = 50]
        status -> Varchar,
        /// Liveness timestamp.
        last_heartbeat_at -> Nullable<Timestamptz>,
        /// Status change timestamp.
        status_changed_at -> Timestamptz,
        /// Capability tags as JSONB.
        capabilities -> Jsonb,
        /// Deployed software version.
        #[max_length = 100]
        software_version -> Nullable<Varchar>,
        /// Creation timestamp.
        created_at -> Timestamptz,
        /// Last change timestamp.
        updated_at -> Timestamptz,
    }
}
