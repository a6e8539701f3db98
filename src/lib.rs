pub mod field;
pub mod block;
pub mod amount;
pub mod time;
pub mod wallet;
pub mod store;
pub mod select;
pub mod batch;
pub mod sign;
pub mod import;
pub mod randomx;
pub mod node;
