pub mod check;
pub mod test_gate;
pub mod topology;

// SEPARATE TARGET DIR: `sudo cargo test` LEAVES ROOT-OWNED ARTIFACTS BEHIND
pub const TARGET_DIR: &str = "/tmp/vmbench-build";
