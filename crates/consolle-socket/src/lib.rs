//! Socket Server (spec.md section 4.7): owns the listening Unix-domain
//! socket, frames one JSON request/response per connection, and defers
//! all dispatch work to a [`consolle_broker::RequestBroker`].

mod server;
mod socket;

pub use server::{SocketServer, install_shutdown_signals};
pub use socket::{bind_listener, cleanup_socket_file, connect};
