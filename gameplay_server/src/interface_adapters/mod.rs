// Interface adapters: wire protocol, notification dispatch and network handling.

pub mod dispatch;
pub mod http;
pub mod net;
pub mod protocol;
pub mod state;
