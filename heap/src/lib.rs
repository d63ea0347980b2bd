mod system;
mod heap;

pub use system::{MappedRegion, OS_PAGE_SIZE};
pub use heap::*;
