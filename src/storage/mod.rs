mod memory;
mod rocksdb;

pub use memory::MemoryStore;
pub use rocksdb::RocksDbStore;
