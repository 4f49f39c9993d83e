mod test_cluster;

pub use test_cluster::{cursor_name, TestCluster, ROUNDS_TO_SETTLE};
