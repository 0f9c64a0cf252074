mod base;
mod faults;

pub use base::TestBase;
pub use faults::FlakyStorage;
