//! Long running services of the daemon.

mod discovery;
mod persist;
mod poller;
mod server;
mod sink;

pub use self::discovery::*;
pub use self::persist::*;
pub use self::poller::*;
pub use self::server::*;
pub use self::sink::*;
