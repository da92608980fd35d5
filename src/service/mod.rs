pub mod attendance_rules;
pub mod billing;
pub mod geofence;
pub mod leave_rules;
pub mod policy_cache;
