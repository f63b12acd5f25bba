mod custom;
mod event_loop;
mod threaded;

use std::net::IpAddr;

pub use self::custom::CustomBackend;
pub use self::event_loop::EventLoop;
pub use self::event_loop::EventLoopBackend;
pub use self::threaded::ThreadedBackend;

/// Parses numeric hosts, including bracketed IPv6.
fn ip_literal(hostname: &str) -> Option<IpAddr> {
    let trimmed = hostname
        .strip_prefix('[')
        .and_then(|h| h.strip_suffix(']'))
        .unwrap_or(hostname);
    trimmed.parse().ok()
}
