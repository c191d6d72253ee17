pub mod control_plane;
pub mod notify;
pub mod object_store;
