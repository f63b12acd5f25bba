mod global;
mod resolver;
mod target;

pub use global::GlobalArgs;
pub use resolver::ResolverArgs;
pub use target::HostPort;
