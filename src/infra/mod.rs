pub mod fs_store;
pub mod http_client;
pub mod memory_store;
pub mod secret_store;
pub mod supabase_store;

pub use fs_store::FsObjectStore;
pub use http_client::ReqwestHttp;
pub use memory_store::InMemoryObjectStore;
pub use secret_store::{EnvSecretStore, FileSecretStore};
pub use supabase_store::{SupabaseObjectStore, SupabaseSettings};
