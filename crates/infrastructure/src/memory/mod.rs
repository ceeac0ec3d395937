//! 内存实现
//!
//! 面向嵌入式单进程部署和测试：不依赖外部Redis/PostgreSQL，
//! 语义上对齐真实后端（组定位流尾、挂起跟踪、空闲认领、盖章规则）。

pub mod repository;
pub mod stream;

pub use repository::InMemoryOperationRepository;
pub use stream::InMemoryStreamDispatcher;
