pub mod aerospike_cluster;
pub mod namespace_backup;
pub mod namespace_restore;
pub mod shared;
