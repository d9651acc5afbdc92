//! 项目索引：IndexProvider 抽象、内存实现与文件系统实现

pub mod fs;
pub mod memory;
pub mod traits;

pub use fs::FsIndexProvider;
pub use memory::InMemoryIndex;
pub use traits::{IndexProvider, IndexedFile, ProjectIndex};
