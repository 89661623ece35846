pub mod memory;

pub use memory::ResultCache;
