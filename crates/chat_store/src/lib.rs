mod error;
mod paths;
mod store;

pub use error::ChatStoreError;
pub use paths::{
    json_key, sanitize_name, validate_key, InstallLayout, CHAT_STORE_DIR, DATA_STORE_DIR,
    PROVIDER_STORE_DIR,
};
pub use store::{DirectoryStore, KeyValueStore, MemoryStore};
