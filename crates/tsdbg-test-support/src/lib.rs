pub mod fs;
pub mod vm;

pub use fs::{bundle_map_json, create_file, position_map_json};
pub use vm::{FakeConnector, FakeVm, VmCall};
