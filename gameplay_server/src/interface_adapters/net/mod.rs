// Network adapter modules split by external client sockets vs internal HTTP routes.

pub mod client;
pub mod internal;

pub use client::ws_handler;
pub use internal::{
    add_bot_handler, create_instance_handler, kill_bots_handler, list_instances_handler,
    remove_instance_handler,
};
