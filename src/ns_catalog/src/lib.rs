// ns_catalog 在 INode 后端之上提供带权限检查的命名空间：路径解析、符号链接、ACL、副本与池
// StackInstance 把 PluginManager 中注册的各个组件装配成一个完整的会话

#[macro_use]
extern crate log;

mod catalog;
mod config;
mod plugin_manager;
mod pool_drivers;
mod stack;
mod transaction;

pub use catalog::*;
pub use config::*;
pub use plugin_manager::*;
pub use pool_drivers::*;
pub use stack::*;
pub use transaction::*;

#[cfg(test)]
mod catalog_tests;
