mod address;
mod backend;
mod handle;
pub mod provider;

pub use address::AddressResult;
pub use backend::Backend;
pub use backend::BackendImpl;
pub use backend::Dispatch;
pub use backend::PollHandle;
pub use backend::RawHandle;
pub use backend::SharedContext;
pub use handle::ResolverHandle;
