pub mod harness;

pub use harness::TestMailbox;
pub use mailfs_mount::testing::*;
