use uuid::Uuid;

/// Primary key of an identity row. The remote platform's own numeric id is
/// stored separately as `remote_id`; everything internal references this one.
pub type IdentityId = i64;

/// Platform-native id of a destination (group chat). Signed — the platform
/// uses negative ids for some chat kinds.
pub type DestinationId = i64;

/// Generate a new opaque task id: 32 lowercase hex characters.
///
/// Matches the shape owners see in their task lists; collision-free by
/// construction (UUIDv4 entropy).
pub fn new_task_id() -> String {
    Uuid::new_v4().simple().to_string()
}

/// Current time as the RFC 3339 string stored in every timestamp column.
pub fn now_rfc3339() -> String {
    chrono::Utc::now().to_rfc3339()
}
